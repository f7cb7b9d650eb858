use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::RwLock as StdRwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{Level, event};

use super::engine::{RecordId, Store};
use super::validation::{ValidationErrors, ValidationRule, validate};
use crate::core::{EditError, RecordType, Result};
use crate::model::{InlineRecord, Record};
use crate::transaction::{
    ChangeSet, FieldPatch, IsolationLevel, RecordKey, Transaction, TransactionId,
    TransactionState,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Level used when a transaction is opened as `Unspecified`.
    pub default_isolation: IsolationLevel,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_isolation: IsolationLevel::ReadCommitted,
        }
    }
}

/// Reference store keeping records in memory.
///
/// Transactions see their own patches through a private overlay. Commit
/// replays the patches onto the committed records; under `RepeatableRead`,
/// `Snapshot` and `Serializable` it first rejects the commit if any patched
/// record's version moved since the transaction read it.
pub struct InMemoryStore<I> {
    config: StoreConfig,
    // Lock order: transactions before records.
    transactions: RwLock<HashMap<TransactionId, Transaction<I>>>,
    records: RwLock<HashMap<RecordKey<I>, Box<dyn Record>>>,
    rules: StdRwLock<HashMap<RecordType, Vec<ValidationRule>>>,
    handles: AtomicUsize,
}

impl<I: RecordId> InMemoryStore<I> {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            transactions: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
            rules: StdRwLock::new(HashMap::new()),
            handles: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Register a rule checked on every persist touching `record_type`.
    pub fn add_rule(&self, record_type: RecordType, rule: ValidationRule) -> Result<()> {
        let mut rules = self.rules.write()?;
        rules.entry(record_type).or_default().push(rule);
        Ok(())
    }

    /// Insert or replace a committed record outside any transaction.
    pub async fn insert<R: InlineRecord>(&self, id: I, record: R) {
        self.insert_record(id, Box::new(record)).await;
    }

    pub async fn insert_record(&self, id: I, record: Box<dyn Record>) {
        let key = RecordKey::new(record.record_type(), id);
        self.records.write().await.insert(key, record);
    }

    /// Committed copy of a typed record.
    pub async fn get<R: InlineRecord>(&self, id: &I) -> Option<R> {
        let key = RecordKey::new(RecordType::of::<R>(), id.clone());
        let records = self.records.read().await;
        records
            .get(&key)
            .and_then(|record| record.downcast_ref::<R>())
            .cloned()
    }

    pub async fn get_record(&self, record_type: &RecordType, id: &I) -> Option<Box<dyn Record>> {
        let key = RecordKey::new(record_type.clone(), id.clone());
        self.records.read().await.get(&key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Transactions begun and not yet disposed.
    pub async fn open_transactions(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn transaction_state(&self, txn: TransactionId) -> Option<TransactionState> {
        self.transactions.read().await.get(&txn).map(Transaction::state)
    }

    pub fn open_handles(&self) -> usize {
        self.handles.load(Ordering::SeqCst)
    }

    /// Drop one handle; false when none was held.
    fn release_handle(&self) -> bool {
        self.handles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_rules(&self, images: &[(RecordKey<I>, Box<dyn Record>)]) -> Result<()> {
        let rules = self.rules.read()?;
        for (key, image) in images {
            let Some(record_rules) = rules.get(&key.record_type) else {
                continue;
            };
            let violations = validate(image.as_ref(), record_rules);
            if !violations.is_empty() {
                return Err(EditError::Validation(ValidationErrors {
                    record_type: key.record_type.clone(),
                    id: key.id.to_string(),
                    violations,
                }));
            }
        }
        Ok(())
    }
}

impl<I: RecordId> Default for InMemoryStore<I> {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_transaction(txn: TransactionId) -> EditError {
    EditError::Transaction(format!("transaction {} not found", txn))
}

fn apply_patch<I: RecordId>(
    record: &mut dyn Record,
    patch: &FieldPatch<I>,
    version: Option<i64>,
) -> Result<()> {
    record
        .set_field(&patch.field, patch.value.clone())
        .map_err(|err| {
            EditError::Storage(format!("cannot apply {}.{}: {}", patch.key, patch.field, err))
        })?;

    if let Some(version) = version {
        record
            .versioned_mut()
            .ok_or_else(|| EditError::NotVersionable(patch.key.record_type.clone()))?
            .set_version(version)
            .map_err(|_| EditError::VersionExhausted {
                record_type: patch.key.record_type.clone(),
                version: version - 1,
            })?;
    }
    Ok(())
}

/// Rebuild every patched record from its committed image. Versioned patches
/// advance the committed version by one, so weaker isolation levels never
/// move a version backwards.
fn replay<I: RecordId>(
    records: &HashMap<RecordKey<I>, Box<dyn Record>>,
    changes: &ChangeSet<I>,
) -> Result<Vec<(RecordKey<I>, Box<dyn Record>)>> {
    let mut staged: Vec<(RecordKey<I>, Box<dyn Record>)> = Vec::new();
    for patch in changes {
        let index = match staged.iter().position(|(key, _)| *key == patch.key) {
            Some(index) => index,
            None => {
                let committed = records.get(&patch.key).ok_or_else(|| {
                    EditError::Storage(format!("{} vanished before commit", patch.key))
                })?;
                staged.push((patch.key.clone(), committed.clone_record()));
                staged.len() - 1
            }
        };

        let image = staged[index].1.as_mut();
        let next_version = match patch.version {
            Some(_) => {
                let committed = image.version().unwrap_or(0);
                Some(committed.checked_add(1).ok_or_else(|| EditError::VersionExhausted {
                    record_type: patch.key.record_type.clone(),
                    version: committed,
                })?)
            }
            None => None,
        };
        apply_patch(image, patch, next_version)?;
    }
    Ok(staged)
}

#[async_trait]
impl<I: RecordId> Store for InMemoryStore<I> {
    type Id = I;

    async fn begin(&self, isolation: IsolationLevel) -> Result<TransactionId> {
        let level = isolation
            .or(self.config.default_isolation)
            .or(IsolationLevel::ReadCommitted);
        let txn = Transaction::new(TransactionId::new(), level);
        let id = txn.id();

        self.transactions.write().await.insert(id, txn);
        event!(Level::DEBUG, txn = %id, isolation = %level, "transaction started");
        Ok(id)
    }

    async fn find(
        &self,
        txn: TransactionId,
        record_type: &RecordType,
        id: &I,
    ) -> Result<Option<Box<dyn Record>>> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&txn)
            .ok_or_else(|| unknown_transaction(txn))?;
        transaction.ensure_active()?;

        let key = RecordKey::new(record_type.clone(), id.clone());
        if let Some(record) = transaction.working_copy(&key) {
            return Ok(Some(record.clone_record()));
        }

        let records = self.records.read().await;
        let Some(record) = records.get(&key) else {
            return Ok(None);
        };
        transaction.record_read(&key, record.version());
        Ok(Some(record.clone_record()))
    }

    async fn persist(&self, txn: TransactionId, changes: &ChangeSet<I>) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&txn)
            .ok_or_else(|| unknown_transaction(txn))?;
        transaction.ensure_active()?;

        let records = self.records.read().await;
        let mut order: Vec<RecordKey<I>> = Vec::new();
        let mut images: HashMap<RecordKey<I>, Box<dyn Record>> = HashMap::new();

        for patch in changes {
            let image = match images.entry(patch.key.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let base = match transaction.working_copy(&patch.key) {
                        Some(record) => record.clone_record(),
                        None => {
                            let record = records.get(&patch.key).ok_or_else(|| {
                                EditError::NotFound {
                                    record_type: patch.key.record_type.clone(),
                                    id: patch.key.id.to_string(),
                                }
                            })?;
                            transaction.record_read(&patch.key, record.version());
                            record.clone_record()
                        }
                    };
                    order.push(patch.key.clone());
                    entry.insert(base)
                }
            };
            apply_patch(image.as_mut(), patch, patch.version)?;
        }
        drop(records);

        let mut ordered = Vec::with_capacity(order.len());
        for key in order {
            if let Some(image) = images.remove(&key) {
                ordered.push((key, image));
            }
        }
        self.check_rules(&ordered)?;

        transaction.stage(ordered.into_iter().collect(), changes.iter().cloned())?;
        event!(Level::DEBUG, txn = %txn, patches = changes.len(), "changes persisted");
        Ok(())
    }

    async fn commit(&self, txn: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&txn)
            .ok_or_else(|| unknown_transaction(txn))?;
        transaction.ensure_active()?;

        let mut records = self.records.write().await;
        let written: Vec<&RecordKey<I>> = transaction.changes().iter().map(|p| &p.key).collect();

        if transaction.isolation().detects_write_conflicts() {
            let conflict = transaction
                .read_versions()
                .filter(|(key, _)| written.contains(key))
                .find_map(|(key, read)| {
                    let current = records.get(key).and_then(|record| record.version());
                    (current != *read).then(|| {
                        format!(
                            "{} moved from version {:?} to {:?}",
                            key, read, current
                        )
                    })
                });

            if let Some(detail) = conflict {
                transaction.rollback()?;
                event!(Level::WARN, txn = %txn, conflict = %detail, "write-write conflict detected");
                return Err(EditError::Conflict(detail));
            }
        }

        let staged = match replay(&records, transaction.changes()) {
            Ok(staged) => staged,
            Err(err) => {
                transaction.rollback()?;
                return Err(err);
            }
        };

        let count = staged.len();
        records.extend(staged);
        transaction.commit()?;
        event!(Level::INFO, txn = %txn, records = count, "transaction committed");
        Ok(())
    }

    async fn rollback(&self, txn: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&txn)
            .ok_or_else(|| unknown_transaction(txn))?;

        if transaction.state() == TransactionState::Aborted {
            return Ok(());
        }
        transaction.rollback()?;
        event!(Level::DEBUG, txn = %txn, "transaction rolled back");
        Ok(())
    }

    async fn dispose(&self, txn: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let mut transaction = transactions
            .remove(&txn)
            .ok_or_else(|| unknown_transaction(txn))?;

        if transaction.state().is_active() {
            transaction.rollback()?;
            event!(Level::DEBUG, txn = %txn, "active transaction rolled back on dispose");
        }
        Ok(())
    }

    fn acquire(&self) {
        self.handles.fetch_add(1, Ordering::SeqCst);
    }

    async fn release(&self) -> Result<()> {
        if !self.release_handle() {
            event!(Level::WARN, "store released more times than acquired");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::model::{FieldAccessor, FieldValue, Versioned};

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        label: String,
        version: i64,
    }

    impl Counter {
        fn get_label(record: &Counter) -> Value {
            record.label.to_value()
        }

        fn set_label(record: &mut Counter, value: Value) -> std::result::Result<(), crate::coerce::CoerceError> {
            record.label = String::from_value(value)?;
            Ok(())
        }
    }

    const COUNTER_FIELDS: &[FieldAccessor<Counter>] = &[FieldAccessor::new(
        "label",
        <String as FieldValue>::field_type,
        Counter::get_label,
        Counter::set_label,
    )];

    impl Versioned for Counter {
        fn version(&self) -> i64 {
            self.version
        }

        fn set_version(&mut self, version: i64) -> std::result::Result<(), crate::coerce::CoerceError> {
            self.version = version;
            Ok(())
        }
    }

    impl InlineRecord for Counter {
        const RECORD_TYPE: &'static str = "counter";

        fn fields() -> &'static [FieldAccessor<Self>] {
            COUNTER_FIELDS
        }

        fn as_versioned(&self) -> Option<&dyn Versioned> {
            Some(self)
        }

        fn as_versioned_mut(&mut self) -> Option<&mut dyn Versioned> {
            Some(self)
        }
    }

    fn counter_type() -> RecordType {
        RecordType::of::<Counter>()
    }

    fn label_patch(id: u32, label: &str, version: i64) -> ChangeSet<u32> {
        FieldPatch::new(counter_type(), id, "label", label.into())
            .with_version(version)
            .into()
    }

    async fn seeded() -> InMemoryStore<u32> {
        let store = InMemoryStore::new();
        store
            .insert(
                1,
                Counter {
                    label: "one".into(),
                    version: 1,
                },
            )
            .await;
        store
    }

    #[test]
    fn test_commit_publishes_patch() {
        tokio_test::block_on(async {
            let store = seeded().await;
            let txn = store.begin(IsolationLevel::Unspecified).await.unwrap();
            store.persist(txn, &label_patch(1, "uno", 2)).await.unwrap();

            // Not visible outside the transaction until commit.
            assert_eq!(store.get::<Counter>(&1).await.unwrap().label, "one");
            let inside = store.find(txn, &counter_type(), &1).await.unwrap().unwrap();
            assert_eq!(inside.get_field("label"), Some(Value::Text("uno".into())));

            store.commit(txn).await.unwrap();
            let committed = store.get::<Counter>(&1).await.unwrap();
            assert_eq!(committed.label, "uno");
            assert_eq!(committed.version, 2);

            store.dispose(txn).await.unwrap();
            assert_eq!(store.open_transactions().await, 0);
        });
    }

    #[test]
    fn test_rollback_discards_patch() {
        tokio_test::block_on(async {
            let store = seeded().await;
            let txn = store.begin(IsolationLevel::Snapshot).await.unwrap();
            store.persist(txn, &label_patch(1, "uno", 2)).await.unwrap();
            store.rollback(txn).await.unwrap();
            // Second rollback is a no-op.
            store.rollback(txn).await.unwrap();
            assert!(store.commit(txn).await.is_err());

            let committed = store.get::<Counter>(&1).await.unwrap();
            assert_eq!(committed.label, "one");
            assert_eq!(committed.version, 1);
        });
    }

    #[test]
    fn test_validation_rejects_whole_change_set() {
        tokio_test::block_on(async {
            let store = seeded().await;
            store
                .add_rule(counter_type(), ValidationRule::max_len("label", 3))
                .unwrap();

            let txn = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
            let err = store.persist(txn, &label_patch(1, "eleven", 2)).await.unwrap_err();
            match err {
                EditError::Validation(errors) => {
                    assert_eq!(errors.id, "1");
                    assert_eq!(errors.violations[0].field, "label");
                }
                other => panic!("unexpected error: {other}"),
            }

            let inside = store.find(txn, &counter_type(), &1).await.unwrap().unwrap();
            assert_eq!(inside.get_field("label"), Some(Value::Text("one".into())));
        });
    }

    #[test]
    fn test_serializable_conflict_rolls_back() {
        tokio_test::block_on(async {
            let store = seeded().await;
            let first = store.begin(IsolationLevel::Serializable).await.unwrap();
            let second = store.begin(IsolationLevel::Serializable).await.unwrap();

            store.find(first, &counter_type(), &1).await.unwrap();
            store.find(second, &counter_type(), &1).await.unwrap();
            store.persist(first, &label_patch(1, "a", 2)).await.unwrap();
            store.persist(second, &label_patch(1, "b", 2)).await.unwrap();

            store.commit(first).await.unwrap();
            let err = store.commit(second).await.unwrap_err();
            assert!(matches!(err, EditError::Conflict(_)));
            assert_eq!(
                store.transaction_state(second).await,
                Some(TransactionState::Aborted)
            );

            let committed = store.get::<Counter>(&1).await.unwrap();
            assert_eq!(committed.label, "a");
            assert_eq!(committed.version, 2);
        });
    }

    #[test]
    fn test_read_committed_rebases_version() {
        tokio_test::block_on(async {
            let store = seeded().await;
            let first = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
            let second = store.begin(IsolationLevel::ReadCommitted).await.unwrap();

            store.persist(first, &label_patch(1, "a", 2)).await.unwrap();
            store.persist(second, &label_patch(1, "b", 2)).await.unwrap();
            store.commit(first).await.unwrap();
            store.commit(second).await.unwrap();

            let committed = store.get::<Counter>(&1).await.unwrap();
            assert_eq!(committed.label, "b");
            assert_eq!(committed.version, 3);
        });
    }

    #[test]
    fn test_dispose_unknown_transaction() {
        tokio_test::block_on(async {
            let store = InMemoryStore::<u32>::new();
            let txn = store.begin(IsolationLevel::Unspecified).await.unwrap();
            store.dispose(txn).await.unwrap();
            assert!(matches!(
                store.dispose(txn).await,
                Err(EditError::Transaction(_))
            ));
            assert!(store.find(txn, &counter_type(), &1).await.is_err());
        });
    }

    #[test]
    fn test_handle_accounting() {
        tokio_test::block_on(async {
            let store = InMemoryStore::<u32>::new();
            store.acquire();
            store.acquire();
            store.release().await.unwrap();
            assert_eq!(store.open_handles(), 1);
            store.release().await.unwrap();
            store.release().await.unwrap();
            assert_eq!(store.open_handles(), 0);
        });
    }

    #[test]
    fn test_release_without_handle_is_reported() {
        let store = InMemoryStore::<u32>::new();
        store.acquire();
        assert!(store.release_handle());
        assert!(!store.release_handle());
        assert_eq!(store.open_handles(), 0);

        store.acquire();
        assert_eq!(store.open_handles(), 1);
    }

    #[test]
    fn test_commit_refuses_to_wrap_version() {
        tokio_test::block_on(async {
            let store = InMemoryStore::new();
            store
                .insert(
                    1u32,
                    Counter {
                        label: "last".into(),
                        version: i64::MAX,
                    },
                )
                .await;

            let txn = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
            store
                .persist(txn, &label_patch(1, "wrapped", i64::MAX))
                .await
                .unwrap();
            assert!(matches!(
                store.commit(txn).await,
                Err(EditError::VersionExhausted { version: i64::MAX, .. })
            ));
            assert_eq!(store.transaction_state(txn).await, Some(TransactionState::Aborted));

            let committed = store.get::<Counter>(&1).await.unwrap();
            assert_eq!(committed.label, "last");
            assert_eq!(committed.version, i64::MAX);
        });
    }
}
