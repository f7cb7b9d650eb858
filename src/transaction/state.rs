// ============================================================================
// Transaction State Management
// ============================================================================
//
// Transaction lifecycle: Active -> Committed / Aborted.
//
// A transaction keeps a private overlay of the records it has patched
// (read-your-writes) and the version each record had when first read, which
// is what commit compares against for write-conflict detection.
//
// ============================================================================

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{ChangeSet, FieldPatch, IsolationLevel, RecordKey};
use crate::core::{EditError, Result};
use crate::model::Record;

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle naming one storage transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

#[derive(Debug)]
pub struct Transaction<I> {
    id: TransactionId,
    state: TransactionState,
    isolation: IsolationLevel,

    /// Version each touched record had at first read (`None`: unversioned).
    read_versions: HashMap<RecordKey<I>, Option<i64>>,

    /// Patched images, visible only to this transaction.
    overlay: HashMap<RecordKey<I>, Box<dyn Record>>,

    /// Patches applied so far, replayed onto committed state at commit.
    changes: ChangeSet<I>,

    start_time: std::time::Instant,
}

impl<I> Transaction<I>
where
    I: Clone + Eq + Hash,
{
    pub fn new(id: TransactionId, isolation: IsolationLevel) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            isolation,
            read_versions: HashMap::new(),
            overlay: HashMap::new(),
            changes: ChangeSet::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn changes(&self) -> &ChangeSet<I> {
        &self.changes
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn ensure_active(&self) -> Result<()> {
        if !self.state.is_active() {
            return Err(EditError::Transaction(format!(
                "transaction {} is {}",
                self.id, self.state
            )));
        }
        Ok(())
    }

    /// Remember the version a record had the first time this transaction
    /// saw it; later reads keep the original entry.
    pub fn record_read(&mut self, key: &RecordKey<I>, version: Option<i64>) {
        self.read_versions.entry(key.clone()).or_insert(version);
    }

    pub fn read_versions(&self) -> impl Iterator<Item = (&RecordKey<I>, &Option<i64>)> {
        self.read_versions.iter()
    }

    pub fn working_copy(&self, key: &RecordKey<I>) -> Option<&dyn Record> {
        self.overlay.get(key).map(|record| record.as_ref())
    }

    /// Install already-validated images and the patches that produced them.
    pub fn stage(
        &mut self,
        images: HashMap<RecordKey<I>, Box<dyn Record>>,
        patches: impl IntoIterator<Item = FieldPatch<I>>,
    ) -> Result<()> {
        self.ensure_active()?;
        self.overlay.extend(images);
        self.changes.extend(patches);
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(EditError::Transaction(format!(
                "Cannot commit: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Mark transaction as aborted and discard staged work
    pub fn rollback(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(EditError::Transaction(format!(
                "Cannot rollback: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.overlay.clear();
        self.changes = ChangeSet::new();
        self.state = TransactionState::Aborted;
        Ok(())
    }
}
