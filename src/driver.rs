//! Driver capability consumed by [`crate::DatabaseSession`].
//!
//! A driver opens connections; a connection provides the raw primitives the session
//! composes (statements, batches, prepared statements, escaping, transactions).
//! Every primitive reports failures as [`DriverError`], which the session translates
//! into its own error taxonomy. Implementations: [`crate::sqlite::SqliteDriver`] and,
//! with the `test-utils` feature, [`crate::test_utils::MockDriver`].

use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::DriverError;
use crate::results::{QueryOutcome, ResultSet};
use crate::types::{BindType, InsertId, Param};

/// Opens connections.
pub trait Driver {
    type Connection: DriverConnection;

    /// Open a new connection with `config`.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the transport cannot be established.
    fn connect(&self, config: &SessionConfig) -> Result<Self::Connection, DriverError>;
}

/// Primitives of one open connection.
pub trait DriverConnection {
    /// Negotiate the character set used for the rest of the connection.
    fn set_charset(&mut self, charset: &str) -> Result<(), DriverError>;

    /// Server's idle-disconnect threshold, if the server has one.
    fn server_idle_timeout(&mut self) -> Result<Option<Duration>, DriverError>;

    /// Minimal round trip used only to detect a dead transport.
    fn probe(&mut self) -> Result<(), DriverError>;

    /// Execute one statement and materialize its result set, if it has one.
    fn execute(&mut self, sql: &str) -> Result<QueryOutcome, DriverError>;

    /// Issue a batch of statements and return a cursor over their results.
    fn execute_multi<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> Result<Box<dyn MultiResults + 'a>, DriverError>;

    /// Prepare a statement. It is released when the returned box is dropped.
    fn prepare<'a>(
        &'a mut self,
        sql: &str,
    ) -> Result<Box<dyn PreparedStatement + 'a>, DriverError>;

    /// Escape `value` for inclusion inside a quoted SQL string literal.
    fn escape(&self, value: &str) -> Result<String, DriverError>;

    fn begin(&mut self) -> Result<(), DriverError>;

    fn commit(&mut self) -> Result<(), DriverError>;

    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Identifier generated by the most recent insert on this connection.
    fn last_insert_id(&self) -> InsertId;

    /// Release the connection.
    fn close(self) -> Result<(), DriverError>
    where
        Self: Sized;
}

/// Cursor over the results of a multi-statement batch.
///
/// The cursor starts on the first statement. Callers drain with
/// [`take_result`](MultiResults::take_result) and only call
/// [`advance`](MultiResults::advance) after [`has_more`](MultiResults::has_more)
/// returned `true`.
pub trait MultiResults {
    /// Result of the current statement; `None` if it produced no result set.
    fn take_result(&mut self) -> Result<Option<ResultSet>, DriverError>;

    fn has_more(&mut self) -> Result<bool, DriverError>;

    /// Move to the next statement.
    fn advance(&mut self) -> Result<(), DriverError>;
}

/// A prepared statement.
pub trait PreparedStatement {
    /// Bind every parameter with its wire type, in order.
    fn bind(&mut self, bindings: &[(BindType, &Param)]) -> Result<(), DriverError>;

    fn execute(&mut self) -> Result<QueryOutcome, DriverError>;
}
