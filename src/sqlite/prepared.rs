use rusqlite::Statement;

use crate::driver::PreparedStatement;
use crate::error::DriverError;
use crate::results::QueryOutcome;
use crate::types::{BindType, Param};

use super::params::bound_value;
use super::query::{build_result_set, changed_rows};

/// `SQLITE_RANGE`, reported for a wrong number of parameters.
const SQLITE_RANGE: i32 = 25;

/// A prepared rusqlite statement. Finalized on drop.
pub struct SqlitePrepared<'conn> {
    stmt: Statement<'conn>,
    sql: String,
}

impl<'conn> SqlitePrepared<'conn> {
    pub(crate) fn new(stmt: Statement<'conn>, sql: &str) -> Self {
        Self {
            stmt,
            sql: sql.to_owned(),
        }
    }
}

impl PreparedStatement for SqlitePrepared<'_> {
    fn bind(&mut self, bindings: &[(BindType, &Param)]) -> Result<(), DriverError> {
        let expected = self.stmt.parameter_count();
        if bindings.len() != expected {
            return Err(DriverError::with_code(
                format!(
                    "statement expects {expected} parameters, {} supplied",
                    bindings.len()
                ),
                SQLITE_RANGE,
            ));
        }
        for (i, (bind_type, param)) in bindings.iter().enumerate() {
            let value = bound_value(*bind_type, param)?;
            self.stmt.raw_bind_parameter(i + 1, value)?;
        }
        Ok(())
    }

    fn execute(&mut self) -> Result<QueryOutcome, DriverError> {
        if self.stmt.column_count() == 0 {
            let affected = self.stmt.raw_execute()?;
            Ok(QueryOutcome::NoRows {
                affected_rows: changed_rows(&self.sql, affected),
            })
        } else {
            Ok(QueryOutcome::Rows(build_result_set(&mut self.stmt)?))
        }
    }
}
