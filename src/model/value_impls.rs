use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::FieldValue;
use crate::coerce::CoerceError;
use crate::core::{FieldType, Value};

fn mismatch(expected: FieldType, found: &Value) -> CoerceError {
    CoerceError::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

macro_rules! integer_field_value {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                fn field_type() -> FieldType {
                    FieldType::Integer
                }

                fn to_value(&self) -> Value {
                    Value::Integer(*self as i64)
                }

                fn from_value(value: Value) -> Result<Self, CoerceError> {
                    match value {
                        Value::Integer(i) => <$ty>::try_from(i).map_err(|_| CoerceError::OutOfRange {
                            value: i.to_string(),
                            target: stringify!($ty),
                        }),
                        other => Err(mismatch(FieldType::Integer, &other)),
                    }
                }
            }
        )*
    };
}

// u64 is left out: values above i64::MAX have no lossless `Value`.
integer_field_value!(i8, i16, i32, i64, u8, u16, u32);

impl FieldValue for f64 {
    fn field_type() -> FieldType {
        FieldType::Float
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoerceError> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            other => Err(mismatch(FieldType::Float, &other)),
        }
    }
}

impl FieldValue for f32 {
    fn field_type() -> FieldType {
        FieldType::Float
    }

    /// Widens through the shortest f32 text so `0.1f32` reads as `0.1`.
    fn to_value(&self) -> Value {
        Value::Float(self.to_string().parse().unwrap_or(f64::from(*self)))
    }

    fn from_value(value: Value) -> Result<Self, CoerceError> {
        let wide = f64::from_value(value)?;
        if wide.is_finite() && (wide < f32::MIN as f64 || wide > f32::MAX as f64) {
            return Err(CoerceError::OutOfRange {
                value: wide.to_string(),
                target: "f32",
            });
        }
        Ok(wide as f32)
    }
}

impl FieldValue for bool {
    fn field_type() -> FieldType {
        FieldType::Boolean
    }

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoerceError> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(mismatch(FieldType::Boolean, &other)),
        }
    }
}

impl FieldValue for String {
    fn field_type() -> FieldType {
        FieldType::Text
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, CoerceError> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch(FieldType::Text, &other)),
        }
    }
}

impl FieldValue for Uuid {
    fn field_type() -> FieldType {
        FieldType::Uuid
    }

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoerceError> {
        match value {
            Value::Uuid(u) => Ok(u),
            other => Err(mismatch(FieldType::Uuid, &other)),
        }
    }
}

impl FieldValue for NaiveDateTime {
    fn field_type() -> FieldType {
        FieldType::DateTime
    }

    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoerceError> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => Err(mismatch(FieldType::DateTime, &other)),
        }
    }
}

impl FieldValue for NaiveDate {
    fn field_type() -> FieldType {
        FieldType::Date
    }

    fn to_value(&self) -> Value {
        Value::Date(*self)
    }

    fn from_value(value: Value) -> Result<Self, CoerceError> {
        match value {
            Value::Date(d) => Ok(d),
            other => Err(mismatch(FieldType::Date, &other)),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn field_type() -> FieldType {
        FieldType::optional(T::field_type())
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, CoerceError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
