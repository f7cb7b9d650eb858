//! Everything an application needs to wire an editor to a store.
//!
//! ```ignore
//! use inline_edit::prelude::*;
//! ```

pub use crate::{
    EditError, EditorConfig, ErrorKind, FieldValue, HandleError, InMemoryStore, InlineEditor,
    InlineEnum, InlineRecord, IsolationLevel, RevertCommand, Store, UpdateCommand, ValidationRule,
    Value,
};
pub use crate::events::{
    BeforeSave, Completed, Failed, PropertySetFailed, Updated, ValidationFailed,
};
