use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::config::SessionConfig;
use crate::driver::Driver;
use crate::error::DriverError;

use super::connection::SqliteHandle;

/// Opens rusqlite connections.
///
/// `SessionConfig::database` is the database file path (or `:memory:`); host, user and
/// password are accepted but have no meaning for an embedded database.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver {
    pub busy_timeout: Option<Duration>,
    pub wal: bool,
}

impl SqliteDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Switch file-backed databases to WAL journaling on connect.
    #[must_use]
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }
}

impl Driver for SqliteDriver {
    type Connection = SqliteHandle;

    fn connect(&self, config: &SessionConfig) -> Result<SqliteHandle, DriverError> {
        debug!(path = %config.database, "opening sqlite database");
        let conn = Connection::open(&config.database)?;
        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        if self.wal {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        Ok(SqliteHandle::new(conn))
    }
}
