//! Synchronous notification channels fired by the editor.
//!
//! Every channel is an ordered callback registry. Observers run on the task
//! that called `handle`, in registration order; the first observer that
//! returns an error stops dispatch and its error is handed back to the
//! editor as [`EditError::Observer`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::coerce::CoerceError;
use crate::command::UpdateCommand;
use crate::core::{EditError, Result};
use crate::model::UpdatedValue;
use crate::storage::ValidationErrors;
use crate::transaction::{FieldPatch, TransactionId};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    BeforeSave,
    Updated,
    Completed,
    ValidationFailed,
    Failed,
    PropertySetFailed,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::BeforeSave => "before-save",
            Channel::Updated => "updated",
            Channel::Completed => "completed",
            Channel::ValidationFailed => "validation-failed",
            Channel::Failed => "failed",
            Channel::PropertySetFailed => "property-set-failed",
        };
        f.write_str(name)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    channel: Channel,
    id: u64,
}

impl SubscriptionId {
    pub fn channel(&self) -> Channel {
        self.channel
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Transaction context handed to BeforeSave observers.
///
/// Patches staged here are persisted together with the edit, in staging
/// order, by the same `persist` call.
#[derive(Debug, Clone)]
pub struct SaveContext<I> {
    transaction: TransactionId,
    staged: Arc<Mutex<Vec<FieldPatch<I>>>>,
}

impl<I> SaveContext<I> {
    pub(crate) fn new(transaction: TransactionId) -> Self {
        Self {
            transaction,
            staged: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn transaction(&self) -> TransactionId {
        self.transaction
    }

    /// Queue an additional write against the edit's transaction.
    pub fn stage(&self, patch: FieldPatch<I>) -> Result<()> {
        self.staged.lock()?.push(patch);
        Ok(())
    }

    pub(crate) fn take_staged(&self) -> Result<Vec<FieldPatch<I>>> {
        Ok(std::mem::take(&mut *self.staged.lock()?))
    }
}

#[derive(Debug, Clone)]
pub struct BeforeSave<I> {
    pub command: UpdateCommand<I>,
    pub context: SaveContext<I>,
    /// `from` is the pre-mutation value.
    pub updated: UpdatedValue,
    pub version: i64,
}

/// Fired after a successful commit.
#[derive(Debug, Clone)]
pub struct Updated<I> {
    pub command: UpdateCommand<I>,
    pub updated: UpdatedValue,
    pub version: i64,
}

/// Fired exactly once per `handle` call, whatever the outcome.
#[derive(Debug, Clone)]
pub struct Completed<I> {
    pub command: UpdateCommand<I>,
    /// `None` when the call failed before a version was computed.
    pub version: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ValidationFailed<I> {
    pub command: UpdateCommand<I>,
    pub errors: ValidationErrors,
    pub version: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Failed<I> {
    pub command: UpdateCommand<I>,
    pub error: EditError,
    pub version: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct PropertySetFailed<I> {
    pub command: UpdateCommand<I>,
    pub error: CoerceError,
    pub field: String,
    pub value: String,
}

// ============================================================================
// Registry
// ============================================================================

pub type Observer<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

/// Ordered observer list for one channel.
///
/// The list is copy-on-write: `emit` works on a snapshot, so an observer may
/// subscribe or unsubscribe while being notified. Changes apply from the
/// next emission on.
pub struct Observers<E> {
    channel: Channel,
    list: RwLock<Arc<Vec<(u64, Observer<E>)>>>,
}

impl<E> Observers<E> {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            list: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn subscribe<F>(&self, observer: F) -> Result<SubscriptionId>
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::SeqCst);
        let mut list = self.list.write()?;
        let mut next = (**list).clone();
        next.push((id, Arc::new(observer)));
        *list = Arc::new(next);

        Ok(SubscriptionId {
            channel: self.channel,
            id,
        })
    }

    /// Returns `false` if the subscription was not on this channel.
    pub fn unsubscribe(&self, subscription: SubscriptionId) -> Result<bool> {
        if subscription.channel != self.channel {
            return Ok(false);
        }

        let mut list = self.list.write()?;
        let Some(position) = list.iter().position(|(id, _)| *id == subscription.id) else {
            return Ok(false);
        };
        let mut next = (**list).clone();
        next.remove(position);
        *list = Arc::new(next);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.list.read().map(|list| list.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn emit(&self, payload: &E) -> Result<()> {
        let snapshot = Arc::clone(&*self.list.read()?);
        for (_, observer) in snapshot.iter() {
            observer(payload).map_err(|err| EditError::observer(self.channel, err))?;
        }
        Ok(())
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("channel", &self.channel)
            .field("len", &self.len())
            .finish()
    }
}

/// The full set of channels an editor fires.
#[derive(Debug)]
pub struct EditorEvents<I> {
    before_save: Observers<BeforeSave<I>>,
    updated: Observers<Updated<I>>,
    completed: Observers<Completed<I>>,
    validation_failed: Observers<ValidationFailed<I>>,
    failed: Observers<Failed<I>>,
    property_set_failed: Observers<PropertySetFailed<I>>,
}

impl<I> Default for EditorEvents<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> EditorEvents<I> {
    pub fn new() -> Self {
        Self {
            before_save: Observers::new(Channel::BeforeSave),
            updated: Observers::new(Channel::Updated),
            completed: Observers::new(Channel::Completed),
            validation_failed: Observers::new(Channel::ValidationFailed),
            failed: Observers::new(Channel::Failed),
            property_set_failed: Observers::new(Channel::PropertySetFailed),
        }
    }

    pub fn before_save(&self) -> &Observers<BeforeSave<I>> {
        &self.before_save
    }

    pub fn updated(&self) -> &Observers<Updated<I>> {
        &self.updated
    }

    pub fn completed(&self) -> &Observers<Completed<I>> {
        &self.completed
    }

    pub fn validation_failed(&self) -> &Observers<ValidationFailed<I>> {
        &self.validation_failed
    }

    pub fn failed(&self) -> &Observers<Failed<I>> {
        &self.failed
    }

    pub fn property_set_failed(&self) -> &Observers<PropertySetFailed<I>> {
        &self.property_set_failed
    }

    /// Remove a subscription from whichever channel issued it.
    pub fn unsubscribe(&self, subscription: SubscriptionId) -> Result<bool> {
        match subscription.channel {
            Channel::BeforeSave => self.before_save.unsubscribe(subscription),
            Channel::Updated => self.updated.unsubscribe(subscription),
            Channel::Completed => self.completed.unsubscribe(subscription),
            Channel::ValidationFailed => self.validation_failed.unsubscribe(subscription),
            Channel::Failed => self.failed.unsubscribe(subscription),
            Channel::PropertySetFailed => self.property_set_failed.unsubscribe(subscription),
        }
    }
}
