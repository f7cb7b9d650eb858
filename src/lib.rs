// ============================================================================
// inline-edit Library
// ============================================================================
//
// Single-field record edits: coerce raw text to the field's type, bump the
// record version, commit in a transaction and notify observers along the way.
//
// ============================================================================

extern crate self as inline_edit;

pub mod core;
pub mod coerce;
pub mod model;
pub mod command;
pub mod transaction;
pub mod storage;
pub mod events;
pub mod editor;
pub mod prelude;

// Re-export main types for convenience
pub use crate::core::{EditError, EnumType, ErrorKind, FieldType, HandleError, RecordType, Result, Value};
pub use crate::coerce::{CoerceError, coerce, coerce_as};
pub use crate::model::{FieldAccessor, FieldValue, InlineRecord, Record, UpdatedValue, Versioned};
pub use crate::command::{RevertCommand, UpdateCommand};
pub use crate::transaction::{ChangeSet, FieldPatch, IsolationLevel, RecordKey, TransactionId};
pub use crate::storage::{InMemoryStore, RecordId, Store, StoreConfig, ValidationErrors, ValidationRule};
pub use crate::events::{Channel, EditorEvents, SaveContext, SubscriptionId};
pub use crate::editor::{EditorConfig, InlineEditor};

// Derive macros
pub use inline_edit_derive::{InlineEnum, InlineRecord};
