use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::core::{RecordType, Value};
use crate::model::Record;

/// One rule a field failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Structured rejection raised by the store when a persisted image breaks
/// its record type's rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{record_type} '{id}' rejected: {}", render(.violations))]
pub struct ValidationErrors {
    pub record_type: RecordType,
    pub id: String,
    pub violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn for_field(&self, field: &str) -> impl Iterator<Item = &FieldViolation> {
        self.violations.iter().filter(move |v| v.field == field)
    }
}

fn render(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

type Check = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Constraint on a single field, checked against the full record image a
/// persist would produce.
#[derive(Clone)]
pub struct ValidationRule {
    field: String,
    check: Check,
}

impl ValidationRule {
    /// Custom rule: return `Some(message)` to reject the value.
    pub fn new<F>(field: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            field: field.into(),
            check: Arc::new(check),
        }
    }

    pub fn not_null(field: impl Into<String>) -> Self {
        Self::new(field, |value| {
            value.is_null().then(|| "cannot be NULL".to_string())
        })
    }

    pub fn max_len(field: impl Into<String>, max: usize) -> Self {
        Self::new(field, move |value| match value.as_str() {
            Some(s) if s.chars().count() > max => {
                Some(format!("must be at most {} characters", max))
            }
            _ => None,
        })
    }

    pub fn range(field: impl Into<String>, min: f64, max: f64) -> Self {
        Self::new(field, move |value| match value.as_f64() {
            Some(n) if n < min || n > max => Some(format!("must be between {} and {}", min, max)),
            _ => None,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn check(&self, record: &dyn Record) -> Option<FieldViolation> {
        let value = record.get_field(&self.field).unwrap_or(Value::Null);
        (self.check)(&value).map(|message| FieldViolation {
            field: self.field.clone(),
            message,
        })
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

pub fn validate(record: &dyn Record, rules: &[ValidationRule]) -> Vec<FieldViolation> {
    rules.iter().filter_map(|rule| rule.check(record)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules() {
        let not_null = ValidationRule::not_null("email");
        assert_eq!((not_null.check)(&Value::Null).as_deref(), Some("cannot be NULL"));
        assert!((not_null.check)(&Value::Text(String::new())).is_none());

        let short = ValidationRule::max_len("name", 3);
        assert!((short.check)(&"abcd".into()).is_some());
        assert!((short.check)(&"abc".into()).is_none());

        let bounded = ValidationRule::range("score", 0.0, 10.0);
        assert!((bounded.check)(&Value::Integer(11)).is_some());
        assert!((bounded.check)(&Value::Float(9.5)).is_none());
        assert!((bounded.check)(&Value::Null).is_none());
    }

    #[test]
    fn test_validation_errors_display() {
        let err = ValidationErrors {
            record_type: RecordType::named("account"),
            id: "7".into(),
            violations: vec![
                FieldViolation {
                    field: "status".into(),
                    message: "cannot be NULL".into(),
                },
                FieldViolation {
                    field: "name".into(),
                    message: "must be at most 3 characters".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "account '7' rejected: status: cannot be NULL; name: must be at most 3 characters"
        );
        assert_eq!(err.for_field("status").count(), 1);
    }
}
