//! A driver double that runs statements on SQLite while behaving like a networked
//! server: it reports an idle-disconnect threshold, can drop every open connection,
//! escapes with backslashes, and counts every primitive the session calls.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::SessionConfig;
use crate::driver::{Driver, DriverConnection, MultiResults, PreparedStatement};
use crate::error::DriverError;
use crate::results::{QueryOutcome, ResultSet};
use crate::sqlite::{SqliteDriver, SqliteHandle};
use crate::types::{BindType, InsertId, Param};

/// Code reported for operations on a dropped connection ("server has gone away").
pub const GONE_AWAY: i32 = 2006;

/// Code reported when a connect attempt is refused.
pub const CONNECT_REFUSED: i32 = 2003;

/// Calls observed by a [`MockDriver`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockStats {
    pub connects: usize,
    pub closes: usize,
    pub probes: usize,
    pub charset_calls: usize,
    pub introspections: usize,
    pub executes: usize,
    pub multi_advances: usize,
    pub prepares: usize,
    pub escapes: usize,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    /// Bind types of every `bind` call, in order.
    pub bind_types: Vec<Vec<BindType>>,
}

#[derive(Debug)]
struct MockState {
    stats: MockStats,
    generation: u64,
    killed_through: u64,
    server_idle_timeout: Option<Duration>,
    fail_connect: bool,
    fail_charset: bool,
    fail_close: bool,
    fail_rollback: bool,
}

/// Shared handle to the mock server. Clones observe and steer the same state.
#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
    inner: SqliteDriver,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// A mock server reporting an eight hour idle threshold.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                stats: MockStats::default(),
                generation: 0,
                killed_through: 0,
                server_idle_timeout: Some(Duration::from_secs(28_800)),
                fail_connect: false,
                fail_charset: false,
                fail_close: false,
                fail_rollback: false,
            })),
            inner: SqliteDriver::new(),
        }
    }

    /// Threshold reported by idle-timeout introspection (`None`: not reported).
    #[must_use]
    pub fn with_server_idle_timeout(self, timeout: Option<Duration>) -> Self {
        self.lock().server_idle_timeout = timeout;
        self
    }

    /// Drop every connection opened so far; they fail from now on.
    pub fn kill_connections(&self) {
        let mut state = self.lock();
        state.killed_through = state.generation;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    pub fn set_fail_charset(&self, fail: bool) {
        self.lock().fail_charset = fail;
    }

    /// Make `close` report an error (the connection is still released).
    pub fn set_fail_close(&self, fail: bool) {
        self.lock().fail_close = fail;
    }

    /// Make `rollback` report an error (the rollback still happens).
    pub fn set_fail_rollback(&self, fail: bool) {
        self.lock().fail_rollback = fail;
    }

    #[must_use]
    pub fn stats(&self) -> MockStats {
        self.lock().stats.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn gone_away() -> DriverError {
    DriverError::with_code("server has gone away", GONE_AWAY)
}

impl Driver for MockDriver {
    type Connection = MockConnection;

    fn connect(&self, config: &SessionConfig) -> Result<MockConnection, DriverError> {
        let generation = {
            let mut state = self.lock();
            state.stats.connects += 1;
            if state.fail_connect {
                return Err(DriverError::with_code(
                    format!("can't connect to server on '{}'", config.host),
                    CONNECT_REFUSED,
                ));
            }
            state.generation += 1;
            state.generation
        };
        let inner = self.inner.connect(config)?;
        Ok(MockConnection {
            inner,
            generation,
            state: Arc::clone(&self.state),
        })
    }
}

/// Connection handed out by [`MockDriver`].
#[derive(Debug)]
pub struct MockConnection {
    inner: SqliteHandle,
    generation: u64,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    /// Count a call and fail it if this connection was dropped.
    fn live(&self, count: impl FnOnce(&mut MockStats)) -> Result<(), DriverError> {
        self.with_state(|state| {
            count(&mut state.stats);
            if self.generation <= state.killed_through {
                Err(gone_away())
            } else {
                Ok(())
            }
        })
    }
}

impl DriverConnection for MockConnection {
    fn set_charset(&mut self, charset: &str) -> Result<(), DriverError> {
        self.live(|s| s.charset_calls += 1)?;
        if self.with_state(|state| state.fail_charset) {
            return Err(DriverError::with_code(
                format!("unknown character set: '{charset}'"),
                1115,
            ));
        }
        self.inner.set_charset("utf8")
    }

    fn server_idle_timeout(&mut self) -> Result<Option<Duration>, DriverError> {
        self.live(|s| s.introspections += 1)?;
        Ok(self.with_state(|state| state.server_idle_timeout))
    }

    fn probe(&mut self) -> Result<(), DriverError> {
        self.live(|s| s.probes += 1)?;
        self.inner.probe()
    }

    fn execute(&mut self, sql: &str) -> Result<QueryOutcome, DriverError> {
        self.live(|s| s.executes += 1)?;
        self.inner.execute(sql)
    }

    fn execute_multi<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> Result<Box<dyn MultiResults + 'a>, DriverError> {
        self.live(|s| s.executes += 1)?;
        let state = Arc::clone(&self.state);
        let inner = self.inner.execute_multi(sql)?;
        Ok(Box::new(MockMulti { inner, state }))
    }

    fn prepare<'a>(
        &'a mut self,
        sql: &str,
    ) -> Result<Box<dyn PreparedStatement + 'a>, DriverError> {
        self.live(|s| s.prepares += 1)?;
        let state = Arc::clone(&self.state);
        let inner = self.inner.prepare(sql)?;
        Ok(Box::new(MockPrepared { inner, state }))
    }

    fn escape(&self, value: &str) -> Result<String, DriverError> {
        self.with_state(|state| state.stats.escapes += 1);
        let mut out = String::with_capacity(value.len() + 2);
        for c in value.chars() {
            match c {
                '\0' => out.push_str("\\0"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '"' => out.push_str("\\\""),
                '\x1a' => out.push_str("\\Z"),
                other => out.push(other),
            }
        }
        Ok(out)
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.live(|s| s.begins += 1)?;
        self.inner.begin()
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.live(|s| s.commits += 1)?;
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.live(|s| s.rollbacks += 1)?;
        self.inner.rollback()?;
        if self.with_state(|state| state.fail_rollback) {
            return Err(DriverError::with_code("rollback interrupted", 1180));
        }
        Ok(())
    }

    fn last_insert_id(&self) -> InsertId {
        self.inner.last_insert_id()
    }

    fn close(self) -> Result<(), DriverError> {
        let fail = self.with_state(|state| {
            state.stats.closes += 1;
            state.fail_close
        });
        self.inner.close()?;
        if fail {
            Err(DriverError::new("error while closing connection"))
        } else {
            Ok(())
        }
    }
}

struct MockMulti<'a> {
    inner: Box<dyn MultiResults + 'a>,
    state: Arc<Mutex<MockState>>,
}

impl MultiResults for MockMulti<'_> {
    fn take_result(&mut self) -> Result<Option<ResultSet>, DriverError> {
        self.inner.take_result()
    }

    fn has_more(&mut self) -> Result<bool, DriverError> {
        self.inner.has_more()
    }

    fn advance(&mut self) -> Result<(), DriverError> {
        lock(&self.state).stats.multi_advances += 1;
        self.inner.advance()
    }
}

struct MockPrepared<'a> {
    inner: Box<dyn PreparedStatement + 'a>,
    state: Arc<Mutex<MockState>>,
}

impl PreparedStatement for MockPrepared<'_> {
    fn bind(&mut self, bindings: &[(BindType, &Param)]) -> Result<(), DriverError> {
        lock(&self.state)
            .stats
            .bind_types
            .push(bindings.iter().map(|(t, _)| *t).collect());
        self.inner.bind(bindings)
    }

    fn execute(&mut self) -> Result<QueryOutcome, DriverError> {
        self.inner.execute()
    }
}
