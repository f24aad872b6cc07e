use rusqlite::types::Value;

use crate::error::DriverError;
use crate::types::{BindType, Param};

/// `SQLITE_MISMATCH`, reported when a value does not fit its bind type.
const SQLITE_MISMATCH: i32 = 20;

/// Convert a parameter into the SQLite value bound for `bind_type`.
///
/// A string-typed `Null` becomes SQL NULL.
///
/// # Errors
///
/// Returns `DriverError` if `param` cannot be bound as `bind_type`.
pub fn bound_value(bind_type: BindType, param: &Param) -> Result<Value, DriverError> {
    match (bind_type, param) {
        (BindType::Integer, Param::Int(i)) => Ok(Value::Integer(*i)),
        (BindType::Double, Param::Float(f)) => Ok(Value::Real(*f)),
        (BindType::String, Param::Null) => Ok(Value::Null),
        (BindType::String, Param::Text(s)) => Ok(Value::Text(s.clone())),
        (BindType::Blob, Param::Bytes(b)) => Ok(Value::Blob(b.clone())),
        (ty, p) => Err(DriverError::with_code(
            format!("cannot bind {p:?} as {ty:?}"),
            SQLITE_MISMATCH,
        )),
    }
}
