use std::fmt;
use std::hash::Hash;

use async_trait::async_trait;

use crate::core::{RecordType, Result};
use crate::model::Record;
use crate::transaction::{ChangeSet, IsolationLevel, TransactionId};

/// Bounds an identity type must meet to key records in a store.
pub trait RecordId: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> RecordId for T where T: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

/// Storage collaborator the editor drives.
///
/// Implementations must be safe to share between concurrent `handle` calls;
/// isolation between those calls is the store's job, not the editor's.
#[async_trait]
pub trait Store: Send + Sync {
    type Id: RecordId;

    /// Open a transaction. `Unspecified` means the store's default level.
    async fn begin(&self, isolation: IsolationLevel) -> Result<TransactionId>;

    /// Detached copy of a record as seen by `txn`, or `None` when the
    /// identity does not resolve.
    async fn find(
        &self,
        txn: TransactionId,
        record_type: &RecordType,
        id: &Self::Id,
    ) -> Result<Option<Box<dyn Record>>>;

    /// Apply pending patches inside `txn`.
    ///
    /// Rule violations are reported as `EditError::Validation`; nothing from
    /// the change set is applied in that case.
    async fn persist(&self, txn: TransactionId, changes: &ChangeSet<Self::Id>) -> Result<()>;

    async fn commit(&self, txn: TransactionId) -> Result<()>;

    async fn rollback(&self, txn: TransactionId) -> Result<()>;

    /// Release a transaction handle, rolling back if still active.
    async fn dispose(&self, txn: TransactionId) -> Result<()>;

    /// Called when an editor starts holding this store.
    fn acquire(&self) {}

    /// Called when an editor holding this store is closed.
    async fn release(&self) -> Result<()> {
        Ok(())
    }
}
