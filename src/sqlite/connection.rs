use std::fmt;
use std::time::Duration;

use rusqlite::Connection;

use crate::driver::{DriverConnection, MultiResults, PreparedStatement};
use crate::error::DriverError;
use crate::results::QueryOutcome;
use crate::types::InsertId;

use super::multi::SqliteMulti;
use super::prepared::SqlitePrepared;
use super::query::{build_result_set, changed_rows};

/// `SQLITE_MISUSE`, reported for values SQLite cannot take.
const SQLITE_MISUSE: i32 = 21;

/// One open rusqlite connection.
pub struct SqliteHandle {
    conn: Connection,
}

impl SqliteHandle {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl fmt::Debug for SqliteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteHandle")
            .field("path", &self.conn.path())
            .finish()
    }
}

/// Map a configured charset name onto an SQLite text encoding.
fn sqlite_encoding(charset: &str) -> Option<&'static str> {
    match charset.to_ascii_lowercase().replace('-', "").as_str() {
        "utf8" | "utf8mb4" | "utf8mb3" => Some("UTF-8"),
        "utf16" => Some("UTF-16"),
        "utf16le" => Some("UTF-16le"),
        "utf16be" => Some("UTF-16be"),
        _ => None,
    }
}

impl DriverConnection for SqliteHandle {
    fn set_charset(&mut self, charset: &str) -> Result<(), DriverError> {
        let wanted = sqlite_encoding(charset).ok_or_else(|| {
            DriverError::with_code(format!("unsupported charset `{charset}`"), SQLITE_MISUSE)
        })?;
        // Only takes effect before the database file has content; read back to verify.
        self.conn
            .execute_batch(&format!("PRAGMA encoding = '{wanted}';"))?;
        let actual: String = self
            .conn
            .query_row("PRAGMA encoding", [], |row| row.get(0))?;
        // "UTF-16" resolves to the native byte order.
        let matches = actual.eq_ignore_ascii_case(wanted)
            || (wanted == "UTF-16" && actual.starts_with("UTF-16"));
        if matches {
            Ok(())
        } else {
            Err(DriverError::new(format!(
                "database encoding is {actual}, cannot switch to {wanted}"
            )))
        }
    }

    fn server_idle_timeout(&mut self) -> Result<Option<Duration>, DriverError> {
        // Embedded: nothing on the other side disconnects idle clients.
        Ok(None)
    }

    fn probe(&mut self) -> Result<(), DriverError> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn execute(&mut self, sql: &str) -> Result<QueryOutcome, DriverError> {
        let mut stmt = self.conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            let affected = stmt.raw_execute()?;
            Ok(QueryOutcome::NoRows {
                affected_rows: changed_rows(sql, affected),
            })
        } else {
            Ok(QueryOutcome::Rows(build_result_set(&mut stmt)?))
        }
    }

    fn execute_multi<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> Result<Box<dyn MultiResults + 'a>, DriverError> {
        Ok(Box::new(SqliteMulti::start(&self.conn, sql)?))
    }

    fn prepare<'a>(
        &'a mut self,
        sql: &str,
    ) -> Result<Box<dyn PreparedStatement + 'a>, DriverError> {
        let stmt = self.conn.prepare(sql)?;
        Ok(Box::new(SqlitePrepared::new(stmt, sql)))
    }

    fn escape(&self, value: &str) -> Result<String, DriverError> {
        if value.contains('\0') {
            return Err(DriverError::with_code(
                "string contains a NUL byte",
                SQLITE_MISUSE,
            ));
        }
        Ok(value.replace('\'', "''"))
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        Ok(self.conn.execute_batch("BEGIN")?)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        Ok(self.conn.execute_batch("COMMIT")?)
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        Ok(self.conn.execute_batch("ROLLBACK")?)
    }

    fn last_insert_id(&self) -> InsertId {
        let id = self.conn.last_insert_rowid();
        u64::try_from(id).map_or_else(|_| InsertId::Text(id.to_string()), InsertId::Int)
    }

    fn close(self) -> Result<(), DriverError> {
        self.conn.close().map_err(|(_, e)| DriverError::from(e))
    }
}
