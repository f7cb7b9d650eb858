// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Transaction handles, lifecycle state, isolation levels and the single-field
// patches a transaction accumulates before commit.
//
// ============================================================================

pub mod change;
pub mod isolation;
pub mod state;

pub use change::{ChangeSet, FieldPatch, RecordKey};
pub use isolation::IsolationLevel;
pub use state::{Transaction, TransactionId, TransactionState};
