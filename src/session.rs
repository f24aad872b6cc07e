use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::config::SessionConfig;
use crate::driver::{Driver, DriverConnection};
use crate::error::{DriverError, QueryStage, SqlSessionError};
use crate::liveness::{Liveness, LivenessState, ProbeOutcome};
use crate::results::{QueryOutcome, ResultSet, Row};
use crate::types::{Escapable, InsertId, Param, RowValues};

/// One owned database connection plus its liveness bookkeeping.
///
/// Every query-class operation first calls [`ping`](Self::ping), which trusts the
/// connection while it was used within the idle budget, probes it once the budget
/// has elapsed, and reconnects if the probe fails. The session is not synchronized:
/// all operations take `&mut self`, and sharing it across threads needs an external
/// lock.
///
/// Dropping the session closes the connection.
pub struct DatabaseSession<D: Driver> {
    driver: D,
    config: SessionConfig,
    handle: Option<D::Connection>,
    liveness: Liveness,
    closed: bool,
    in_transaction: bool,
    last_affected: u64,
}

impl<D: Driver> DatabaseSession<D> {
    /// Validate `config` and open the initial connection.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails and `ConnectionError` if the
    /// initial connect, charset negotiation or idle-threshold introspection fails.
    pub fn connect(driver: D, config: SessionConfig) -> Result<Self, SqlSessionError> {
        config.validate()?;
        let mut session = Self {
            driver,
            config,
            handle: None,
            liveness: Liveness::disconnected(),
            closed: false,
            in_transaction: false,
            last_affected: 0,
        };
        session.reconnect()?;
        info!(
            host = %session.config.host,
            database = %session.config.database,
            idle_budget = ?session.idle_budget(),
            "session opened"
        );
        Ok(session)
    }

    /// Release the current handle (if any) and open a fresh one.
    ///
    /// On failure the session is left without a handle; the next query-class call
    /// tries to connect again.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` if connecting, charset negotiation or idle-threshold
    /// introspection fails or a transaction is open, and `SessionClosed` after
    /// [`close`](Self::close).
    pub fn reconnect(&mut self) -> Result<(), SqlSessionError> {
        self.ensure_open()?;
        self.ensure_no_transaction("reconnect")?;
        self.release_handle();
        self.liveness = Liveness::disconnected();

        let started = Instant::now();
        let mut conn = self.driver.connect(&self.config).map_err(|e| {
            error!(code = ?e.code, error = %e, "connect failed");
            SqlSessionError::connection("connect", e)
        })?;

        if let Err(e) = conn.set_charset(&self.config.charset) {
            error!(
                charset = %self.config.charset,
                code = ?e.code,
                error = %e,
                "charset negotiation failed"
            );
            discard(conn);
            return Err(SqlSessionError::connection("set charset", e));
        }

        let server_timeout = match conn.server_idle_timeout() {
            Ok(timeout) => timeout,
            Err(e) => {
                error!(code = ?e.code, error = %e, "idle threshold introspection failed");
                discard(conn);
                return Err(SqlSessionError::connection("read idle timeout", e));
            }
        };
        let budget = self.config.idle_policy.budget_for(server_timeout);

        self.handle = Some(conn);
        self.liveness = Liveness::connected(Instant::now(), budget);
        debug!(
            server_timeout = ?server_timeout,
            idle_budget = ?budget,
            elapsed = ?started.elapsed(),
            "connected"
        );
        Ok(())
    }

    /// Make sure the connection is usable, probing or reconnecting as needed.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` if a reconnect is needed and fails, or if the
    /// connection dies inside [`transaction`](Self::transaction).
    pub fn ping(&mut self) -> Result<(), SqlSessionError> {
        self.ensure_open()?;
        let now = Instant::now();
        match self.liveness.state_at(now) {
            LivenessState::Fresh => {
                self.liveness.touch(now);
                Ok(())
            }
            LivenessState::Disconnected => {
                self.ensure_no_transaction("ping")?;
                debug!("no connection held, reconnecting");
                self.reconnect()
            }
            LivenessState::Stale => match self.probe() {
                ProbeOutcome::Live => {
                    trace!("probe ok");
                    self.liveness.touch(Instant::now());
                    Ok(())
                }
                ProbeOutcome::Dead(e) if self.in_transaction => {
                    error!(error = %e, "connection lost inside transaction");
                    self.release_handle();
                    self.liveness = Liveness::disconnected();
                    Err(SqlSessionError::connection("probe in transaction", e))
                }
                ProbeOutcome::Dead(e) => {
                    warn!(code = ?e.code, error = %e, "probe failed, reconnecting");
                    self.reconnect()
                }
            },
        }
    }

    fn probe(&mut self) -> ProbeOutcome {
        match self.handle.as_mut() {
            Some(conn) => match conn.probe() {
                Ok(()) => ProbeOutcome::Live,
                Err(e) => ProbeOutcome::Dead(e),
            },
            None => ProbeOutcome::Dead(DriverError::new("no connection")),
        }
    }

    /// Run one statement.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the driver rejects the statement, or a connection
    /// error from [`ping`](Self::ping).
    pub fn query(&mut self, sql: &str) -> Result<QueryOutcome, SqlSessionError> {
        self.ping()?;
        let started = Instant::now();
        let outcome = self.conn()?.execute(sql).map_err(|e| {
            error!(sql, code = ?e.code, error = %e, "query failed");
            SqlSessionError::query(QueryStage::Query, sql, e)
        })?;
        self.record(&outcome);
        trace!(sql, elapsed = ?started.elapsed(), "query ok");
        Ok(outcome)
    }

    /// Every row, in order. A statement without a result set yields no rows.
    ///
    /// # Errors
    ///
    /// Same as [`query`](Self::query).
    pub fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>, SqlSessionError> {
        Ok(self
            .query(sql)?
            .into_result_set()
            .map(ResultSet::into_rows)
            .unwrap_or_default())
    }

    /// First row, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Same as [`query`](Self::query).
    pub fn fetch_row(&mut self, sql: &str) -> Result<Option<Row>, SqlSessionError> {
        Ok(self
            .query(sql)?
            .into_result_set()
            .and_then(|rs| rs.into_rows().into_iter().next()))
    }

    /// First column of the first row.
    ///
    /// `None` when the statement produced no result set or no rows.
    ///
    /// # Errors
    ///
    /// Same as [`query`](Self::query).
    pub fn fetch_one(&mut self, sql: &str) -> Result<Option<RowValues>, SqlSessionError> {
        Ok(self.fetch_row(sql)?.and_then(Row::into_first_value))
    }

    /// First column of every row, in order.
    ///
    /// # Errors
    ///
    /// Same as [`query`](Self::query).
    pub fn fetch_column(&mut self, sql: &str) -> Result<Vec<RowValues>, SqlSessionError> {
        let rows = self.fetch_all(sql)?;
        let mut column = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(value) = row.into_first_value() {
                column.push(value);
            }
        }
        Ok(column)
    }

    /// Run a batch of statements, returning one result set per statement that
    /// produced one. Statements without a result set contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` (stage `Multi`) if issuing the batch, draining a result
    /// or advancing to the next statement fails.
    pub fn execute_multi(&mut self, sql: &str) -> Result<Vec<ResultSet>, SqlSessionError> {
        self.ping()?;
        let conn = self.conn()?;
        let multi_err = |e: DriverError| {
            error!(sql, code = ?e.code, error = %e, "multi-statement batch failed");
            SqlSessionError::query(QueryStage::Multi, sql, e)
        };

        let mut results = Vec::new();
        let mut cursor = conn.execute_multi(sql).map_err(multi_err)?;
        loop {
            if let Some(rs) = cursor.take_result().map_err(multi_err)? {
                results.push(rs);
            }
            if !cursor.has_more().map_err(multi_err)? {
                break;
            }
            cursor.advance().map_err(multi_err)?;
        }
        debug!(sql, result_sets = results.len(), "multi-statement batch ok");
        Ok(results)
    }

    /// Run an insert and return the identifier the server generated.
    ///
    /// # Errors
    ///
    /// Same as [`query`](Self::query).
    pub fn insert(&mut self, sql: &str) -> Result<InsertId, SqlSessionError> {
        self.query(sql)?;
        let id = self.conn()?.last_insert_id();
        debug!(%id, "insert ok");
        Ok(id)
    }

    /// Escape every string in `value`, keeping its shape. `Null` is returned as is
    /// without touching the driver.
    ///
    /// This is for building ad hoc SQL fragments; prefer
    /// [`prepare_and_execute`](Self::prepare_and_execute) for values.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` (stage `Escape`) if the driver fails on any leaf, or
    /// `SessionClosed`.
    pub fn escape(&self, value: &Escapable) -> Result<Escapable, SqlSessionError> {
        if let Escapable::Null = value {
            return Ok(Escapable::Null);
        }
        self.ensure_open()?;
        let conn = self.handle.as_ref().ok_or_else(|| {
            SqlSessionError::connection("escape", DriverError::new("no connection"))
        })?;
        escape_value(conn, value).map_err(|e| {
            error!(code = ?e.code, error = %e, "escape failed");
            SqlSessionError::query(QueryStage::Escape, "", e)
        })
    }

    /// Escape a single string.
    ///
    /// # Errors
    ///
    /// Same as [`escape`](Self::escape).
    pub fn escape_str(&self, value: &str) -> Result<String, SqlSessionError> {
        match self.escape(&Escapable::Text(value.to_owned()))? {
            Escapable::Text(escaped) => Ok(escaped),
            other => Err(SqlSessionError::query(
                QueryStage::Escape,
                "",
                DriverError::new(format!("escaping a string produced {other:?}")),
            )),
        }
    }

    /// Prepare `sql`, bind `params` and execute it.
    ///
    /// Each parameter's variant picks its bind type (see [`Param::bind_type`]). The
    /// statement is released before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` with stage `Prepare`, `Bind` or `Execute`, or a
    /// connection error from [`ping`](Self::ping).
    pub fn prepare_and_execute(
        &mut self,
        sql: &str,
        params: &[Param],
    ) -> Result<QueryOutcome, SqlSessionError> {
        self.ping()?;
        let conn = self.conn()?;
        let fail = |stage: QueryStage| {
            move |e: DriverError| {
                error!(sql, %stage, code = ?e.code, error = %e, "prepared statement failed");
                SqlSessionError::query_with_params(stage, sql, params, e)
            }
        };

        let mut stmt = conn.prepare(sql).map_err(fail(QueryStage::Prepare))?;
        if !params.is_empty() {
            let bindings: Vec<_> = params.iter().map(|p| (p.bind_type(), p)).collect();
            trace!(
                sql,
                types = %bindings.iter().map(|(t, _)| t.code()).collect::<String>(),
                "binding parameters"
            );
            stmt.bind(&bindings).map_err(fail(QueryStage::Bind))?;
        }
        let result = stmt.execute().map_err(fail(QueryStage::Execute));
        drop(stmt);

        let outcome = result?;
        self.record(&outcome);
        Ok(outcome)
    }

    /// Run `work` inside a transaction.
    ///
    /// Commits if `work` succeeds. Otherwise rolls back and returns
    /// `TransactionError` with the original error as its source; a rollback failure
    /// is logged and attached as `rollback_error`.
    ///
    /// # Errors
    ///
    /// `TransactionError` as above, `QueryError` (stage `Begin`) if the transaction
    /// cannot start or one is already open, or a connection error from
    /// [`ping`](Self::ping).
    pub fn transaction<T, E, F>(&mut self, work: F) -> Result<T, SqlSessionError>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if self.in_transaction {
            return Err(SqlSessionError::query(
                QueryStage::Begin,
                "BEGIN",
                DriverError::new("transaction already in progress"),
            ));
        }
        self.ping()?;
        self.conn()?.begin().map_err(|e| {
            error!(code = ?e.code, error = %e, "begin failed");
            SqlSessionError::query(QueryStage::Begin, "BEGIN", e)
        })?;
        self.in_transaction = true;
        debug!("transaction started");

        let value = match work(self) {
            Ok(value) => value,
            Err(cause) => return Err(self.abort_transaction(cause.into())),
        };

        let commit = self.conn().and_then(|conn| {
            conn.commit()
                .map_err(|e| SqlSessionError::query(QueryStage::Commit, "COMMIT", e))
        });
        match commit {
            Ok(()) => {
                self.in_transaction = false;
                self.liveness.touch(Instant::now());
                debug!("transaction committed");
                Ok(value)
            }
            Err(e) => {
                error!(error = %e, "commit failed");
                Err(self.abort_transaction(Box::new(e)))
            }
        }
    }

    fn abort_transaction(
        &mut self,
        cause: Box<dyn std::error::Error + Send + Sync>,
    ) -> SqlSessionError {
        warn!(error = %cause, "rolling back transaction");
        let rollback_error = match self.handle.as_mut() {
            Some(conn) => conn.rollback().err(),
            None => Some(DriverError::new("connection lost before rollback")),
        };
        if let Some(e) = &rollback_error {
            error!(code = ?e.code, error = %e, "rollback failed");
        }
        self.in_transaction = false;
        SqlSessionError::TransactionError {
            source: cause,
            rollback_error,
        }
    }

    /// Release the connection. Safe to call more than once; errors from the
    /// release are logged and swallowed.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.release_handle();
        self.liveness = Liveness::disconnected();
        self.closed = true;
        debug!("session closed");
    }

    /// Replace the settings and reconnect with them.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` is invalid (the old settings stay),
    /// `ConnectionError` inside a transaction, or the errors of
    /// [`reconnect`](Self::reconnect).
    pub fn reconfigure(&mut self, config: SessionConfig) -> Result<(), SqlSessionError> {
        self.ensure_open()?;
        self.ensure_no_transaction("reconfigure")?;
        config.validate()?;
        self.config = config;
        self.reconnect()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// How long the connection is trusted without a probe.
    #[must_use]
    pub fn idle_budget(&self) -> Duration {
        self.liveness.idle_budget()
    }

    /// Time since the last confirmed activity, if connected.
    #[must_use]
    pub fn idle_for(&self) -> Option<Duration> {
        self.liveness.last_activity().map(|t| t.elapsed())
    }

    /// What the next query-class call would do about liveness.
    #[must_use]
    pub fn liveness_state(&self) -> LivenessState {
        self.liveness.state_at(Instant::now())
    }

    /// Rows affected by the last statement without a result set.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        self.last_affected
    }

    fn ensure_open(&self) -> Result<(), SqlSessionError> {
        if self.closed {
            Err(SqlSessionError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Fails while a transaction is open: its statements must stay on one connection.
    fn ensure_no_transaction(&self, op: &'static str) -> Result<(), SqlSessionError> {
        if self.in_transaction {
            error!(op, "connection unavailable inside transaction");
            Err(SqlSessionError::connection(
                op,
                DriverError::new("connection lost inside transaction"),
            ))
        } else {
            Ok(())
        }
    }

    fn conn(&mut self) -> Result<&mut D::Connection, SqlSessionError> {
        self.handle
            .as_mut()
            .ok_or_else(|| SqlSessionError::connection("query", DriverError::new("no connection")))
    }

    fn record(&mut self, outcome: &QueryOutcome) {
        if let QueryOutcome::NoRows { affected_rows } = outcome {
            self.last_affected = *affected_rows;
        }
    }

    fn release_handle(&mut self) {
        if let Some(conn) = self.handle.take() {
            discard(conn);
        }
    }
}

impl<D: Driver> Drop for DatabaseSession<D> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<D: Driver> std::fmt::Debug for DatabaseSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSession")
            .field("config", &self.config)
            .field("connected", &self.handle.is_some())
            .field("closed", &self.closed)
            .field("in_transaction", &self.in_transaction)
            .field("idle_budget", &self.liveness.idle_budget())
            .finish_non_exhaustive()
    }
}

/// Close a connection, logging instead of returning any error.
fn discard<C: DriverConnection>(conn: C) {
    if let Err(e) = conn.close() {
        warn!(code = ?e.code, error = %e, "error while releasing connection");
    }
}

fn escape_value<C: DriverConnection>(
    conn: &C,
    value: &Escapable,
) -> Result<Escapable, DriverError> {
    match value {
        Escapable::Null => Ok(Escapable::Null),
        Escapable::Text(s) => conn.escape(s).map(Escapable::Text),
        Escapable::List(items) => items
            .iter()
            .map(|item| escape_value(conn, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Escapable::List),
    }
}
