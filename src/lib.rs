//! Single-connection database sessions with cached liveness and transparent
//! reconnect.
//!
//! A [`DatabaseSession`] owns one connection obtained from a [`driver::Driver`]. Before
//! every query-class call it decides whether the connection can be trusted without a
//! round trip (it was used within the idle budget), probes it otherwise, and
//! reconnects if the probe fails. Query helpers (`fetch_all`, `fetch_one`,
//! `execute_multi`, `prepare_and_execute`, `transaction`, ...) share one error
//! taxonomy, [`SqlSessionError`].
//!
//! ```rust,no_run
//! use sql_session::prelude::*;
//!
//! # fn main() -> Result<(), SqlSessionError> {
//! let mut session = SessionConfig::builder("localhost", "app", "", "app.db")
//!     .connect(SqliteDriver::new())?;
//! let one = session.fetch_one("SELECT 1")?;
//! assert_eq!(one, Some(RowValues::Int(1)));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod liveness;
pub mod prelude;
pub mod results;
pub mod session;
pub mod types;
pub mod validate;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use config::{ConfigResolver, KeySpec, ResolvedSettings, SessionConfig, SessionConfigBuilder};
pub use error::{DriverError, QueryStage, SqlSessionError};
pub use liveness::{IdleBudget, IdlePolicy, LivenessState};
pub use results::{QueryOutcome, ResultSet, Row};
pub use session::DatabaseSession;
pub use types::{BindType, Escapable, InsertId, Param, RowValues};
