use std::fmt;

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// Values read back from a result row.
///
/// ```rust
/// use sql_session::types::RowValues;
///
/// let v = RowValues::Int(1);
/// assert_eq!(v.as_int(), Some(&1));
/// assert!(RowValues::Null.is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// NULL value
    Null,
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self.as_int() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        let s = self.as_text()?;
        // Try "YYYY-MM-DD HH:MM:SS"
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Some(dt);
        }
        // Try "YYYY-MM-DD HH:MM:SS.SSS"
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok()
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Render the value as a plain string for comparisons against literals.
    ///
    /// Returns `None` for NULL and for blobs that are not valid UTF-8.
    #[must_use]
    pub fn to_plain_string(&self) -> Option<String> {
        match self {
            RowValues::Int(i) => Some(i.to_string()),
            RowValues::Float(f) => Some(f.to_string()),
            RowValues::Text(s) => Some(s.clone()),
            RowValues::Null => None,
            RowValues::Blob(b) => String::from_utf8(b.clone()).ok(),
        }
    }
}

impl From<&RowValues> for JsonValue {
    fn from(value: &RowValues) -> Self {
        match value {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Text(s) => JsonValue::from(s.as_str()),
            RowValues::Null => JsonValue::Null,
            RowValues::Blob(b) => JsonValue::from(b.clone()),
        }
    }
}

/// A prepared-statement parameter.
///
/// The variant decides the wire bind type, see [`Param::bind_type`].
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Int(i64),
    Float(f64),
    Null,
    Bytes(Vec<u8>),
    Text(String),
}

impl Param {
    /// Bind type for this parameter.
    ///
    /// `Null` binds as a string-typed null; drivers coerce it to SQL NULL.
    #[must_use]
    pub fn bind_type(&self) -> BindType {
        match self {
            Param::Int(_) => BindType::Integer,
            Param::Float(_) => BindType::Double,
            Param::Null | Param::Text(_) => BindType::String,
            Param::Bytes(_) => BindType::Blob,
        }
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Int(i64::from(value))
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Param::Float(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_owned())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl From<Vec<u8>> for Param {
    fn from(value: Vec<u8>) -> Self {
        Param::Bytes(value)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Param::Null, Into::into)
    }
}

/// Wire-level bind types, with the conventional one-letter codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindType {
    Integer,
    Double,
    String,
    Blob,
}

impl BindType {
    #[must_use]
    pub fn code(self) -> char {
        match self {
            BindType::Integer => 'i',
            BindType::Double => 'd',
            BindType::String => 's',
            BindType::Blob => 'b',
        }
    }
}

/// Server-assigned identifier of the most recent insert.
///
/// Very large auto-increment domains are reported as text so nothing is truncated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InsertId {
    Int(u64),
    Text(String),
}

impl fmt::Display for InsertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertId::Int(id) => write!(f, "{id}"),
            InsertId::Text(id) => f.write_str(id),
        }
    }
}

/// Input to [`crate::DatabaseSession::escape`]: a string, a null, or a nested list of
/// those. Escaping returns the same shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escapable {
    Null,
    Text(String),
    List(Vec<Escapable>),
}

impl Escapable {
    /// Borrow the text of a scalar value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Escapable::Text(s) = self {
            Some(s)
        } else {
            None
        }
    }
}

impl From<&str> for Escapable {
    fn from(value: &str) -> Self {
        Escapable::Text(value.to_owned())
    }
}

impl From<String> for Escapable {
    fn from(value: String) -> Self {
        Escapable::Text(value)
    }
}

impl<T: Into<Escapable>> From<Vec<T>> for Escapable {
    fn from(value: Vec<T>) -> Self {
        Escapable::List(value.into_iter().map(Into::into).collect())
    }
}
