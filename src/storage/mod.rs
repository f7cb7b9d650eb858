// ============================================================================
// Storage Module
// ============================================================================
//
// The `Store` seam the editor drives, per-record-type validation rules, and
// the in-memory reference store.
//
// ============================================================================

pub mod engine;
pub mod memory;
pub mod validation;

pub use engine::{RecordId, Store};
pub use memory::{InMemoryStore, StoreConfig};
pub use validation::{FieldViolation, ValidationErrors, ValidationRule, validate};
