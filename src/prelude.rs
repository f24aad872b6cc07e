//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::{ConfigResolver, SessionConfig};
pub use crate::driver::{Driver, DriverConnection};
pub use crate::error::{QueryStage, SqlSessionError};
pub use crate::liveness::IdlePolicy;
pub use crate::results::{QueryOutcome, ResultSet, Row};
pub use crate::session::DatabaseSession;
pub use crate::types::{Escapable, InsertId, Param, RowValues};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteDriver;
