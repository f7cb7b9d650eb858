// ============================================================================
// Value Coercion
// ============================================================================
//
// Turns the raw string typed into an inline editor into a `Value` matching a
// field's declared `FieldType`. Rules are checked in a fixed order:
// optional wrapper, UUID, enumeration, temporal, then primitives.
//
// ============================================================================

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;
use uuid::Uuid;

use crate::core::{FieldType, Value};
use crate::model::FieldValue;

#[derive(Error, Debug, Clone)]
pub enum CoerceError {
    #[error("'{raw}' is not a valid UUID: {source}")]
    InvalidUuid {
        raw: String,
        #[source]
        source: uuid::Error,
    },

    #[error("'{raw}' is not a variant of {enum_name}")]
    UnknownVariant { raw: String, enum_name: String },

    #[error("'{raw}' is not a recognized date and time")]
    InvalidDateTime { raw: String },

    #[error("'{raw}' is not a recognized date")]
    InvalidDate { raw: String },

    #[error("Cannot convert '{raw}' to {target}: {reason}")]
    Conversion {
        raw: String,
        target: FieldType,
        reason: String,
    },

    #[error("Value {value} does not fit in {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("Expected {expected}, got {found}")]
    TypeMismatch {
        expected: FieldType,
        found: &'static str,
    },

    #[error("Unknown field '{0}'")]
    UnknownField(String),
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Coerce `raw` into a value of the declared `target` type.
pub fn coerce(raw: &str, target: &FieldType) -> Result<Value, CoerceError> {
    match target {
        FieldType::Optional(inner) => {
            if raw.trim().is_empty() {
                Ok(Value::Null)
            } else {
                coerce(raw, inner)
            }
        }
        FieldType::Uuid => Uuid::parse_str(raw.trim())
            .map(Value::Uuid)
            .map_err(|source| CoerceError::InvalidUuid {
                raw: raw.to_string(),
                source,
            }),
        FieldType::Enum(decl) => {
            let name = raw.trim();
            if decl.contains(name) {
                Ok(Value::Enum(name.to_string()))
            } else {
                Err(CoerceError::UnknownVariant {
                    raw: raw.to_string(),
                    enum_name: decl.name.clone(),
                })
            }
        }
        FieldType::DateTime => parse_datetime(raw)
            .map(Value::DateTime)
            .ok_or_else(|| CoerceError::InvalidDateTime {
                raw: raw.to_string(),
            }),
        FieldType::Date => parse_date(raw)
            .map(Value::Date)
            .ok_or_else(|| CoerceError::InvalidDate {
                raw: raw.to_string(),
            }),
        primitive => coerce_primitive(raw, primitive),
    }
}

/// Typed entry point: coerce against `T`'s declared type and convert back.
pub fn coerce_as<T: FieldValue>(raw: &str) -> Result<T, CoerceError> {
    T::from_value(coerce(raw, &T::field_type())?)
}

fn coerce_primitive(raw: &str, target: &FieldType) -> Result<Value, CoerceError> {
    let failed = |reason: String| CoerceError::Conversion {
        raw: raw.to_string(),
        target: target.clone(),
        reason,
    };

    match target {
        FieldType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|err| failed(err.to_string())),
        FieldType::Float => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|err| failed(err.to_string())),
        FieldType::Boolean => {
            let trimmed = raw.trim();
            if trimmed.eq_ignore_ascii_case("true") {
                Ok(Value::Boolean(true))
            } else if trimmed.eq_ignore_ascii_case("false") {
                Ok(Value::Boolean(false))
            } else {
                Err(failed("expected 'true' or 'false'".into()))
            }
        }
        FieldType::Text => Ok(Value::Text(raw.to_string())),
        other => Err(failed(format!("no primitive conversion for {}", other))),
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| parse_date_only(trimmed).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    parse_date_only(raw.trim()).or_else(|| parse_datetime(raw).map(|dt| dt.date()))
}

fn parse_date_only(trimmed: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EnumType;

    fn status() -> FieldType {
        FieldType::Enum(EnumType::new("Status", ["Active", "Inactive"]))
    }

    #[test]
    fn test_optional_blank_is_null() {
        let target = FieldType::optional(FieldType::Integer);
        assert_eq!(coerce("", &target).unwrap(), Value::Null);
        assert_eq!(coerce("   ", &target).unwrap(), Value::Null);
        assert_eq!(coerce("12", &target).unwrap(), Value::Integer(12));
    }

    #[test]
    fn test_uuid_forms() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            coerce("67e5504410b1426f9247bb680e5fe0c8", &FieldType::Uuid).unwrap(),
            Value::Uuid(id)
        );
        assert_eq!(
            coerce("{67e55044-10b1-426f-9247-bb680e5fe0c8}", &FieldType::Uuid).unwrap(),
            Value::Uuid(id)
        );
        assert!(matches!(
            coerce("not-a-guid", &FieldType::Uuid),
            Err(CoerceError::InvalidUuid { .. })
        ));
    }

    #[test]
    fn test_enum_is_case_sensitive() {
        assert_eq!(
            coerce("Inactive", &status()).unwrap(),
            Value::Enum("Inactive".into())
        );
        assert!(matches!(
            coerce("inactive", &status()),
            Err(CoerceError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn test_datetime_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        for raw in [
            "2024-01-05T10:30:00",
            "2024-01-05 10:30",
            "01/05/2024 10:30:00",
            "2024-01-05T12:30:00+02:00",
        ] {
            assert_eq!(
                coerce(raw, &FieldType::DateTime).unwrap(),
                Value::DateTime(expected),
                "format {raw}"
            );
        }

        let midnight = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            coerce("2024-01-05", &FieldType::DateTime).unwrap(),
            Value::DateTime(midnight)
        );
        assert!(coerce("yesterday", &FieldType::DateTime).is_err());
    }

    #[test]
    fn test_date_truncates_time() {
        let expected = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert_eq!(
            coerce("2023-12-31 23:59:59", &FieldType::Date).unwrap(),
            Value::Date(expected)
        );
        assert_eq!(
            coerce("12/31/2023", &FieldType::Date).unwrap(),
            Value::Date(expected)
        );
    }

    #[test]
    fn test_primitives() {
        assert_eq!(coerce(" -42 ", &FieldType::Integer).unwrap(), Value::Integer(-42));
        assert_eq!(coerce("2.5", &FieldType::Float).unwrap(), Value::Float(2.5));
        assert_eq!(coerce("TRUE", &FieldType::Boolean).unwrap(), Value::Boolean(true));
        assert_eq!(
            coerce("  padded ", &FieldType::Text).unwrap(),
            Value::Text("  padded ".into())
        );

        let err = coerce("12abc", &FieldType::Integer).unwrap_err();
        assert!(err.to_string().contains("INTEGER"));
        assert!(coerce("yes", &FieldType::Boolean).is_err());
    }

    #[test]
    fn test_coerce_as_typed() {
        assert_eq!(coerce_as::<i32>("17").unwrap(), 17);
        assert_eq!(coerce_as::<Option<bool>>("").unwrap(), None);
        assert!(matches!(
            coerce_as::<u8>("300"),
            Err(CoerceError::OutOfRange { .. })
        ));
    }
}
