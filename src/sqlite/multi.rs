use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::{Batch, Connection, Statement};

use crate::driver::MultiResults;
use crate::error::DriverError;
use crate::results::ResultSet;

use super::query::build_result_set;

/// Walks a batch one statement at a time.
///
/// A statement is only prepared after the one before it ran, so later statements may
/// depend on schema created earlier in the same batch.
pub struct SqliteMulti<'a> {
    batch: Batch<'a, 'a>,
    current: Option<Statement<'a>>,
    pending: Option<Statement<'a>>,
}

impl<'a> SqliteMulti<'a> {
    pub(crate) fn start(conn: &'a Connection, sql: &'a str) -> Result<Self, DriverError> {
        let mut batch = Batch::new(conn, sql);
        let current = batch.next()?;
        Ok(Self {
            batch,
            current,
            pending: None,
        })
    }
}

impl MultiResults for SqliteMulti<'_> {
    fn take_result(&mut self) -> Result<Option<ResultSet>, DriverError> {
        let Some(mut stmt) = self.current.take() else {
            return Ok(None);
        };
        if stmt.column_count() == 0 {
            stmt.raw_execute()?;
            Ok(None)
        } else {
            Ok(Some(build_result_set(&mut stmt)?))
        }
    }

    fn has_more(&mut self) -> Result<bool, DriverError> {
        if self.pending.is_none() {
            self.pending = self.batch.next()?;
        }
        Ok(self.pending.is_some())
    }

    fn advance(&mut self) -> Result<(), DriverError> {
        if self.pending.is_none() {
            self.pending = self.batch.next()?;
        }
        match self.pending.take() {
            Some(stmt) => {
                self.current = Some(stmt);
                Ok(())
            }
            None => Err(DriverError::new("no more results in batch")),
        }
    }
}
