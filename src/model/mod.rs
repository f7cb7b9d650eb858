//! Record-side contracts: typed field values, the compile-time field table,
//! the type-erased record view and the version capability.

mod record;
mod value_impls;

pub use record::{FieldAccessor, InlineRecord, Record, Versioned};

use crate::coerce::CoerceError;
use crate::core::{FieldType, Value};

/// A Rust type that can back an editable field.
///
/// `field_type` drives coercion of raw input; `to_value`/`from_value` move
/// between the concrete type and the dynamic [`Value`].
pub trait FieldValue: Sized {
    fn field_type() -> FieldType;
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self, CoerceError>;
}

/// A field's value before and after an edit.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedValue {
    pub from: Value,
    pub to: Value,
}

impl UpdatedValue {
    pub fn new(from: Value, to: Value) -> Self {
        Self { from, to }
    }

    /// True when both sides stringify identically.
    pub fn is_noop(&self) -> bool {
        self.from.same_canonical(&self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_detection() {
        let same = UpdatedValue::new(Value::Text("Active".into()), Value::Text("Active".into()));
        assert!(same.is_noop());

        let changed = UpdatedValue::new(Value::Text("Active".into()), Value::Text("Inactive".into()));
        assert!(!changed.is_noop());

        let cleared = UpdatedValue::new(Value::Integer(3), Value::Null);
        assert!(!cleared.is_noop());
    }
}
