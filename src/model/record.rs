use std::any::Any;
use std::fmt;

use crate::coerce::CoerceError;
use crate::core::{FieldType, RecordType, Value};

/// Optimistic version counter carried by a record.
pub trait Versioned {
    fn version(&self) -> i64;

    /// Fails when `version` does not fit the backing field.
    fn set_version(&mut self, version: i64) -> Result<(), CoerceError>;
}

/// Getter/setter pair for one named field of `R`.
///
/// Tables of accessors are built at compile time, either by
/// `#[derive(InlineRecord)]` or by hand.
pub struct FieldAccessor<R: 'static> {
    name: &'static str,
    field_type: fn() -> FieldType,
    get: fn(&R) -> Value,
    set: fn(&mut R, Value) -> Result<(), CoerceError>,
}

impl<R: 'static> FieldAccessor<R> {
    pub const fn new(
        name: &'static str,
        field_type: fn() -> FieldType,
        get: fn(&R) -> Value,
        set: fn(&mut R, Value) -> Result<(), CoerceError>,
    ) -> Self {
        Self {
            name,
            field_type,
            get,
            set,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn field_type(&self) -> FieldType {
        (self.field_type)()
    }

    pub fn get(&self, record: &R) -> Value {
        (self.get)(record)
    }

    pub fn set(&self, record: &mut R, value: Value) -> Result<(), CoerceError> {
        (self.set)(record, value)
    }
}

impl<R: 'static> fmt::Debug for FieldAccessor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("name", &self.name)
            .field("field_type", &self.field_type())
            .finish()
    }
}

/// A concrete record type with a compile-time field table.
pub trait InlineRecord: Clone + fmt::Debug + Send + Sync + 'static {
    /// Name commands use to address this record kind.
    const RECORD_TYPE: &'static str;

    /// Editable fields, in declaration order.
    fn fields() -> &'static [FieldAccessor<Self>];

    fn accessor(name: &str) -> Option<&'static FieldAccessor<Self>> {
        Self::fields().iter().find(|accessor| accessor.name() == name)
    }

    fn as_versioned(&self) -> Option<&dyn Versioned> {
        None
    }

    fn as_versioned_mut(&mut self) -> Option<&mut dyn Versioned> {
        None
    }
}

/// Type-erased view of a stored record.
///
/// This is the shape the storage collaborator hands back from a lookup;
/// every [`InlineRecord`] gets it for free.
pub trait Record: fmt::Debug + Send + Sync + 'static {
    fn record_type(&self) -> RecordType;
    fn field_names(&self) -> Vec<&'static str>;
    fn field_type(&self, field: &str) -> Option<FieldType>;
    fn get_field(&self, field: &str) -> Option<Value>;
    fn set_field(&mut self, field: &str, value: Value) -> Result<(), CoerceError>;
    fn versioned(&self) -> Option<&dyn Versioned>;
    fn versioned_mut(&mut self) -> Option<&mut dyn Versioned>;
    fn clone_record(&self) -> Box<dyn Record>;
    fn as_any(&self) -> &dyn Any;
}

impl<R: InlineRecord> Record for R {
    fn record_type(&self) -> RecordType {
        RecordType::of::<R>()
    }

    fn field_names(&self) -> Vec<&'static str> {
        R::fields().iter().map(FieldAccessor::name).collect()
    }

    fn field_type(&self, field: &str) -> Option<FieldType> {
        R::accessor(field).map(FieldAccessor::field_type)
    }

    fn get_field(&self, field: &str) -> Option<Value> {
        R::accessor(field).map(|accessor| accessor.get(self))
    }

    fn set_field(&mut self, field: &str, value: Value) -> Result<(), CoerceError> {
        let accessor =
            R::accessor(field).ok_or_else(|| CoerceError::UnknownField(field.to_string()))?;
        accessor.set(self, value)
    }

    fn versioned(&self) -> Option<&dyn Versioned> {
        self.as_versioned()
    }

    fn versioned_mut(&mut self) -> Option<&mut dyn Versioned> {
        self.as_versioned_mut()
    }

    fn clone_record(&self) -> Box<dyn Record> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Clone for Box<dyn Record> {
    fn clone(&self) -> Self {
        self.clone_record()
    }
}

impl dyn Record {
    pub fn downcast_ref<R: InlineRecord>(&self) -> Option<&R> {
        self.as_any().downcast_ref::<R>()
    }

    pub fn version(&self) -> Option<i64> {
        self.versioned().map(Versioned::version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;

    // Hand-registered table, the same shape the derive produces.
    #[derive(Debug, Clone, PartialEq)]
    struct Ticket {
        title: String,
        priority: i32,
        version: i64,
    }

    impl Ticket {
        fn get_title(record: &Ticket) -> Value {
            record.title.to_value()
        }

        fn set_title(record: &mut Ticket, value: Value) -> Result<(), CoerceError> {
            record.title = String::from_value(value)?;
            Ok(())
        }

        fn get_priority(record: &Ticket) -> Value {
            record.priority.to_value()
        }

        fn set_priority(record: &mut Ticket, value: Value) -> Result<(), CoerceError> {
            record.priority = i32::from_value(value)?;
            Ok(())
        }
    }

    const TICKET_FIELDS: &[FieldAccessor<Ticket>] = &[
        FieldAccessor::new(
            "title",
            <String as FieldValue>::field_type,
            Ticket::get_title,
            Ticket::set_title,
        ),
        FieldAccessor::new(
            "priority",
            <i32 as FieldValue>::field_type,
            Ticket::get_priority,
            Ticket::set_priority,
        ),
    ];

    impl Versioned for Ticket {
        fn version(&self) -> i64 {
            self.version
        }

        fn set_version(&mut self, version: i64) -> Result<(), CoerceError> {
            self.version = version;
            Ok(())
        }
    }

    impl InlineRecord for Ticket {
        const RECORD_TYPE: &'static str = "ticket";

        fn fields() -> &'static [FieldAccessor<Self>] {
            TICKET_FIELDS
        }

        fn as_versioned(&self) -> Option<&dyn Versioned> {
            Some(self)
        }

        fn as_versioned_mut(&mut self) -> Option<&mut dyn Versioned> {
            Some(self)
        }
    }

    fn ticket() -> Box<dyn Record> {
        Box::new(Ticket {
            title: "Broken login".into(),
            priority: 2,
            version: 1,
        })
    }

    #[test]
    fn test_erased_field_access() {
        let mut record = ticket();
        assert_eq!(record.record_type(), RecordType::named("ticket"));
        assert_eq!(record.field_names(), vec!["title", "priority"]);
        assert_eq!(record.field_type("priority"), Some(FieldType::Integer));
        assert_eq!(record.get_field("title"), Some(Value::Text("Broken login".into())));
        assert_eq!(record.get_field("missing"), None);

        record.set_field("priority", Value::Integer(5)).unwrap();
        assert_eq!(record.downcast_ref::<Ticket>().unwrap().priority, 5);
    }

    #[test]
    fn test_set_field_errors() {
        let mut record = ticket();
        assert!(matches!(
            record.set_field("missing", Value::Null),
            Err(CoerceError::UnknownField(_))
        ));
        assert!(matches!(
            record.set_field("priority", Value::Integer(i64::MAX)),
            Err(CoerceError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_version_through_erased_view() {
        let mut record = ticket();
        assert_eq!(record.version(), Some(1));
        record.versioned_mut().unwrap().set_version(2).unwrap();
        let copy = record.clone();
        assert_eq!(copy.version(), Some(2));
    }
}
