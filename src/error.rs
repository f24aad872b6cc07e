use std::fmt;

use thiserror::Error;

use crate::types::Param;

/// Error reported by a driver primitive: diagnostic text plus the native code, if any.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
    pub code: Option<i32>,
}

impl DriverError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(ffi_err, _)
            | rusqlite::Error::SqlInputError { error: ffi_err, .. } => {
                DriverError::with_code(err.to_string(), ffi_err.extended_code)
            }
            _ => DriverError::new(err.to_string()),
        }
    }
}

/// Which step of statement handling failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    /// Single statement issued through `query`.
    Query,
    /// Issuing or advancing a multi-statement batch.
    Multi,
    Prepare,
    Bind,
    Execute,
    Escape,
    Begin,
    Commit,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryStage::Query => "query",
            QueryStage::Multi => "multi-statement batch",
            QueryStage::Prepare => "prepare",
            QueryStage::Bind => "bind",
            QueryStage::Execute => "execute",
            QueryStage::Escape => "escape",
            QueryStage::Begin => "begin transaction",
            QueryStage::Commit => "commit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SqlSessionError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error ({op}): {source}")]
    ConnectionError {
        op: &'static str,
        #[source]
        source: DriverError,
    },

    #[error("Query error ({stage}): {source}; sql: {sql}")]
    QueryError {
        stage: QueryStage,
        sql: String,
        params: Vec<Param>,
        #[source]
        source: DriverError,
    },

    #[error("Transaction rolled back: {source}")]
    TransactionError {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
        /// Set when the rollback itself also failed.
        rollback_error: Option<DriverError>,
    },

    #[error("Session is closed")]
    SessionClosed,
}

impl SqlSessionError {
    pub(crate) fn connection(op: &'static str, source: DriverError) -> Self {
        SqlSessionError::ConnectionError { op, source }
    }

    pub(crate) fn query(stage: QueryStage, sql: &str, source: DriverError) -> Self {
        SqlSessionError::QueryError {
            stage,
            sql: sql.to_owned(),
            params: Vec::new(),
            source,
        }
    }

    pub(crate) fn query_with_params(
        stage: QueryStage,
        sql: &str,
        params: &[Param],
        source: DriverError,
    ) -> Self {
        SqlSessionError::QueryError {
            stage,
            sql: sql.to_owned(),
            params: params.to_vec(),
            source,
        }
    }

    /// Native driver code carried by connection and query errors.
    #[must_use]
    pub fn driver_code(&self) -> Option<i32> {
        match self {
            SqlSessionError::ConnectionError { source, .. }
            | SqlSessionError::QueryError { source, .. } => source.code,
            _ => None,
        }
    }

    /// Stage of a `QueryError`, if this is one.
    #[must_use]
    pub fn query_stage(&self) -> Option<QueryStage> {
        if let SqlSessionError::QueryError { stage, .. } = self {
            Some(*stage)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn query_error_display_names_stage_and_sql() {
        let err = SqlSessionError::query(
            QueryStage::Bind,
            "INSERT INTO t VALUES (?)",
            DriverError::with_code("wrong number of parameters", 25),
        );
        let text = err.to_string();
        assert!(text.contains("bind"));
        assert!(text.contains("INSERT INTO t VALUES (?)"));
        assert!(text.contains("wrong number of parameters"));
        assert_eq!(err.driver_code(), Some(25));
        assert_eq!(err.query_stage(), Some(QueryStage::Bind));
    }

    #[test]
    fn transaction_error_keeps_cause() {
        let inner = SqlSessionError::ConfigError("boom".into());
        let err = SqlSessionError::TransactionError {
            source: Box::new(inner),
            rollback_error: None,
        };
        let cause = err.source().expect("cause attached");
        let inner = cause
            .downcast_ref::<SqlSessionError>()
            .expect("original error type");
        assert!(matches!(inner, SqlSessionError::ConfigError(msg) if msg == "boom"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_failure_keeps_extended_code() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn.execute_batch("SELEC 1").unwrap_err();
        let driver: DriverError = err.into();
        assert!(driver.code.is_some());
        assert!(driver.message.contains("syntax error"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn prepare_syntax_error_keeps_code() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn.prepare("SELECT FROM WHERE").unwrap_err();
        let driver = DriverError::from(err);
        // SQLITE_ERROR
        assert_eq!(driver.code, Some(1));
    }
}
