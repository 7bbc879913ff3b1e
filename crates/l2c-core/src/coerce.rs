//! Conversion of rendered column text into bind values.
//!
//! Coercion never fails. A value that cannot be converted degrades to a
//! marker so one bad field does not cost the whole log record:
//!
//! | declared type          | on success      | on failure    |
//! |------------------------|-----------------|---------------|
//! | `Typed(kind)`          | typed value     | `Value::Null` |
//! | `RawString(Guid)`      | `Value::Uuid`   | nil UUID      |
//! | `RawString(None)`      | `Value::Unset`  | -             |

use crate::model::{DeclaredType, RawHint, ScalarKind, Value};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

const NAIVE_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Outcome of coercing one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    /// Value to bind
    pub value: Value,
    /// True when the value is a fallback rather than a conversion of the input
    pub fell_back: bool,
}

impl Coerced {
    fn converted(value: Value) -> Self {
        Self {
            value,
            fell_back: false,
        }
    }

    fn fallback(value: Value) -> Self {
        Self {
            value,
            fell_back: true,
        }
    }
}

/// Coerce rendered text according to the declared column type.
pub fn coerce(rendered: &str, declared: DeclaredType) -> Coerced {
    match declared {
        DeclaredType::Typed(kind) => match convert(rendered, kind) {
            Some(value) => Coerced::converted(value),
            None => Coerced::fallback(Value::Null),
        },
        DeclaredType::RawString(RawHint::Guid) => match Uuid::parse_str(rendered.trim()) {
            Ok(uuid) => Coerced::converted(Value::Uuid(uuid)),
            Err(_) => Coerced::fallback(Value::Uuid(Uuid::nil())),
        },
        DeclaredType::RawString(RawHint::None) => Coerced::converted(Value::Unset),
    }
}

/// Convert text to a scalar kind, `None` when it does not parse.
pub fn convert(rendered: &str, kind: ScalarKind) -> Option<Value> {
    let trimmed = rendered.trim();
    match kind {
        ScalarKind::Text => Some(Value::Text(rendered.to_string())),
        ScalarKind::Char => {
            let mut chars = rendered.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Value::Text(c.to_string())),
                _ => None,
            }
        }
        ScalarKind::Boolean => {
            if trimmed.eq_ignore_ascii_case("true") {
                Some(Value::Boolean(true))
            } else if trimmed.eq_ignore_ascii_case("false") {
                Some(Value::Boolean(false))
            } else {
                None
            }
        }
        ScalarKind::TinyInt => trimmed.parse().ok().map(Value::TinyInt),
        ScalarKind::SmallInt => trimmed.parse().ok().map(Value::SmallInt),
        ScalarKind::Int => trimmed.parse().ok().map(Value::Int),
        ScalarKind::BigInt => trimmed.parse().ok().map(Value::BigInt),
        ScalarKind::Float => trimmed.parse().ok().map(Value::Float),
        ScalarKind::Double => trimmed.parse().ok().map(Value::Double),
        ScalarKind::Decimal => Decimal::from_str(trimmed).ok().map(Value::Decimal),
        ScalarKind::Timestamp => parse_timestamp(trimmed).map(Value::Timestamp),
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn typed(kind: ScalarKind) -> DeclaredType {
        DeclaredType::Typed(kind)
    }

    #[test]
    fn test_int_conversion() {
        let c = coerce(" 42 ", typed(ScalarKind::Int));
        assert_eq!(c.value, Value::Int(42));
        assert!(!c.fell_back);
    }

    #[test]
    fn test_unparseable_int_binds_null() {
        let c = coerce("not-a-number", typed(ScalarKind::Int));
        assert_eq!(c.value, Value::Null);
        assert!(c.fell_back);
    }

    #[test]
    fn test_out_of_range_binds_null() {
        assert_eq!(coerce("300", typed(ScalarKind::TinyInt)).value, Value::Null);
        assert_eq!(
            coerce("9223372036854775807", typed(ScalarKind::BigInt)).value,
            Value::BigInt(i64::MAX)
        );
    }

    #[test]
    fn test_text_is_verbatim() {
        assert_eq!(
            coerce("  padded ", typed(ScalarKind::Text)).value,
            Value::Text("  padded ".into())
        );
        assert_eq!(
            coerce("", typed(ScalarKind::Text)).value,
            Value::Text(String::new())
        );
    }

    #[test]
    fn test_char() {
        assert_eq!(
            coerce("x", typed(ScalarKind::Char)).value,
            Value::Text("x".into())
        );
        assert_eq!(coerce("xy", typed(ScalarKind::Char)).value, Value::Null);
    }

    #[test]
    fn test_boolean() {
        assert_eq!(
            coerce("True", typed(ScalarKind::Boolean)).value,
            Value::Boolean(true)
        );
        assert_eq!(coerce("yes", typed(ScalarKind::Boolean)).value, Value::Null);
    }

    #[test]
    fn test_decimal_and_double() {
        assert_eq!(
            coerce("12.50", typed(ScalarKind::Decimal)).value,
            Value::Decimal(Decimal::new(1250, 2))
        );
        assert_eq!(
            coerce("2.5", typed(ScalarKind::Double)).value,
            Value::Double(2.5)
        );
    }

    #[test]
    fn test_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 31, 13, 45, 10).unwrap();
        assert_eq!(
            coerce("2024-01-31T13:45:10Z", typed(ScalarKind::Timestamp)).value,
            Value::Timestamp(expected)
        );
        assert_eq!(
            coerce("2024-01-31T15:45:10+02:00", typed(ScalarKind::Timestamp)).value,
            Value::Timestamp(expected)
        );
        assert_eq!(
            coerce("2024-01-31 13:45:10.000", typed(ScalarKind::Timestamp)).value,
            Value::Timestamp(expected)
        );
        assert_eq!(
            coerce("yesterday", typed(ScalarKind::Timestamp)).value,
            Value::Null
        );
    }

    #[test]
    fn test_guid_parses() {
        let c = coerce(
            "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            DeclaredType::RawString(RawHint::Guid),
        );
        assert_eq!(
            c.value,
            Value::Uuid(Uuid::parse_str("3fa85f64-5717-4562-b3fc-2c963f66afa6").unwrap())
        );
        assert!(!c.fell_back);
    }

    #[test]
    fn test_guid_failure_binds_nil() {
        let c = coerce("not-a-guid", DeclaredType::RawString(RawHint::Guid));
        assert_eq!(c.value, Value::Uuid(Uuid::nil()));
        assert!(c.fell_back);
    }

    #[test]
    fn test_untyped_binds_unset() {
        let c = coerce("anything", DeclaredType::RawString(RawHint::None));
        assert_eq!(c.value, Value::Unset);
        assert!(!c.fell_back);
    }
}
