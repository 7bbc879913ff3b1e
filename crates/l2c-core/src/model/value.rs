//! Bind values for prepared inserts.
//!
//! A [`Value`] is what a column contributes to a bound statement after its
//! rendered text has been coerced. Besides the CQL scalar types it carries two
//! markers: `Null` writes an explicit null, `Unset` leaves the column unwritten.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// CQL bind value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    /// Explicit CQL null
    Null,
    /// Unset bind marker; the column is not written
    Unset,
    /// text / varchar / ascii
    Text(String),
    /// boolean
    Boolean(bool),
    /// tinyint
    TinyInt(i8),
    /// smallint
    SmallInt(i16),
    /// int
    Int(i32),
    /// bigint
    BigInt(i64),
    /// float
    Float(f32),
    /// double
    Double(f64),
    /// decimal
    Decimal(Decimal),
    /// timestamp
    Timestamp(DateTime<Utc>),
    /// uuid
    Uuid(Uuid),
}

impl Value {
    /// CQL type name of the value.
    pub fn cql_type(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Unset => "unset",
            Self::Text(_) => "text",
            Self::Boolean(_) => "boolean",
            Self::TinyInt(_) => "tinyint",
            Self::SmallInt(_) => "smallint",
            Self::Int(_) => "int",
            Self::BigInt(_) => "bigint",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Decimal(_) => "decimal",
            Self::Timestamp(_) => "timestamp",
            Self::Uuid(_) => "uuid",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Unset => write!(f, "<unset>"),
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::TinyInt(n) => write!(f, "{}", n),
            Self::SmallInt(n) => write!(f, "{}", n),
            Self::Int(n) => write!(f, "{}", n),
            Self::BigInt(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
            Self::Double(n) => write!(f, "{}", n),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::Timestamp(ts) => write!(f, "'{}'", ts.to_rfc3339()),
            Self::Uuid(u) => write!(f, "{}", u),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::BigInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cql_type_names() {
        assert_eq!(Value::Null.cql_type(), "null");
        assert_eq!(Value::Unset.cql_type(), "unset");
        assert_eq!(Value::from(42).cql_type(), "int");
        assert_eq!(Value::from(Uuid::nil()).cql_type(), "uuid");
    }

    #[test]
    fn test_display_quotes_text() {
        assert_eq!(Value::from("it's").to_string(), "'it''s'");
        assert_eq!(Value::Null.to_string(), "null");
    }
}
