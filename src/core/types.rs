use std::fmt;

use serde::{Deserialize, Serialize};

use super::Value;

/// Declared type of an editable field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    Uuid,
    DateTime,
    Date,
    Enum(EnumType),
    /// Nullable wrapper; blank input coerces to `Value::Null`.
    Optional(Box<FieldType>),
}

impl FieldType {
    pub fn optional(inner: FieldType) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }

    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Optional(_), Value::Null) => true,
            (Self::Optional(inner), other) => inner.is_compatible(other),
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Uuid, Value::Uuid(_)) => true,
            (Self::DateTime, Value::DateTime(_)) => true,
            (Self::Date, Value::Date(_)) => true,
            (Self::Enum(decl), Value::Enum(name)) => decl.contains(name),
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Uuid => write!(f, "UUID"),
            Self::DateTime => write!(f, "DATETIME"),
            Self::Date => write!(f, "DATE"),
            Self::Enum(decl) => write!(f, "ENUM {}", decl.name),
            Self::Optional(inner) => write!(f, "{}?", inner),
        }
    }
}

/// Enumeration declaration: the type name and its variant names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumType {
    pub fn new<V>(name: impl Into<String>, variants: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }
}

/// Runtime descriptor naming which kind of record a command targets.
///
/// Commands carry this as plain data; the store resolves it to concrete
/// records once, at the lookup boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordType(String);

impl RecordType {
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn of<R: crate::model::InlineRecord>() -> Self {
        Self(R::RECORD_TYPE.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordType {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_compatibility() {
        assert!(FieldType::Integer.is_compatible(&Value::Integer(42)));
        assert!(!FieldType::Integer.is_compatible(&Value::Null));
        assert!(FieldType::optional(FieldType::Integer).is_compatible(&Value::Null));
        assert!(!FieldType::Text.is_compatible(&Value::Integer(1)));
    }

    #[test]
    fn test_enum_compatibility() {
        let status = FieldType::Enum(EnumType::new("Status", ["Active", "Inactive"]));
        assert!(status.is_compatible(&Value::Enum("Active".into())));
        assert!(!status.is_compatible(&Value::Enum("active".into())));
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldType::optional(FieldType::Uuid).to_string(), "UUID?");
        assert_eq!(RecordType::named("account").to_string(), "account");
    }
}
