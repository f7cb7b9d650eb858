// ============================================================================
// Inline Editor
// ============================================================================
//
// Drives one update command through
//
//   lookup -> coerce -> set -> no-op check -> version bump
//          -> before-save -> persist -> commit -> updated -> completed
//
// inside a single transaction. Every failure rolls back, fires the failure
// channel for its kind (if any), then `completed`, and is returned together
// with the version in effect at that point.
//
// ============================================================================

pub mod config;

use std::sync::Arc;

use tracing::{Instrument, Level, event, info_span};

use crate::coerce::{CoerceError, coerce};
use crate::command::UpdateCommand;
use crate::core::{EditError, ErrorKind, HandleError, Result};
use crate::events::{
    BeforeSave, Completed, EditorEvents, Failed, PropertySetFailed, SaveContext, Updated,
    ValidationFailed,
};
use crate::model::UpdatedValue;
use crate::storage::Store;
use crate::transaction::{ChangeSet, FieldPatch, TransactionId};

pub use config::EditorConfig;

/// Failure on its way back to the caller.
struct Failure {
    error: EditError,
    version: Option<i64>,
    /// The kind's dedicated channel has already fired.
    notified: bool,
}

impl Failure {
    fn new(error: EditError, version: Option<i64>) -> Self {
        Self {
            error,
            version,
            notified: false,
        }
    }

    fn notified(error: EditError, version: Option<i64>) -> Self {
        Self {
            error,
            version,
            notified: true,
        }
    }
}

/// Applies single-field edits against a shared [`Store`].
///
/// The editor holds no per-call state; concurrent `handle` calls are
/// isolated only by the store's transactions.
pub struct InlineEditor<S: Store> {
    store: Arc<S>,
    config: EditorConfig,
    events: EditorEvents<S::Id>,
}

impl<S: Store> InlineEditor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, EditorConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: EditorConfig) -> Self {
        store.acquire();
        Self {
            store,
            config,
            events: EditorEvents::new(),
        }
    }

    pub fn events(&self) -> &EditorEvents<S::Id> {
        &self.events
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Apply `command` in a transaction owned by this call.
    ///
    /// The transaction is opened at the command's isolation level (or the
    /// configured default) and disposed on every exit path. On success the
    /// command is handed back unchanged.
    pub async fn handle<C>(&self, command: C) -> std::result::Result<C, HandleError>
    where
        C: AsRef<UpdateCommand<S::Id>> + Send + Sync,
    {
        let cmd = command.as_ref();
        let span = info_span!(
            "editor.handle",
            record_type = %cmd.record_type(),
            id = %cmd.id(),
            field = %cmd.field()
        );
        self.handle_owned(cmd).instrument(span).await?;
        Ok(command)
    }

    /// Apply `command` inside a transaction the caller opened.
    ///
    /// The editor still commits, or rolls back on failure, but never
    /// disposes `txn`.
    pub async fn handle_in<C>(
        &self,
        command: C,
        txn: TransactionId,
    ) -> std::result::Result<C, HandleError>
    where
        C: AsRef<UpdateCommand<S::Id>> + Send + Sync,
    {
        let cmd = command.as_ref();
        let span = info_span!(
            "editor.handle",
            record_type = %cmd.record_type(),
            id = %cmd.id(),
            field = %cmd.field(),
            txn = %txn
        );
        self.execute(cmd, txn).instrument(span).await?;
        Ok(command)
    }

    /// Release the store handle taken in `new`.
    pub async fn close(self) -> Result<()> {
        self.store.release().await
    }

    async fn handle_owned(&self, cmd: &UpdateCommand<S::Id>) -> std::result::Result<(), HandleError> {
        let isolation = self.config.resolve_isolation(cmd.isolation());
        let txn = match self.store.begin(isolation).await {
            Ok(txn) => txn,
            Err(err) => {
                event!(Level::ERROR, error = %err, "failed to open transaction");
                let failure = self.notify_failure(cmd, Failure::new(err, None));
                return Err(self.complete_failed(cmd, failure));
            }
        };

        let outcome = self.execute(cmd, txn).await;
        if let Err(err) = self.store.dispose(txn).await {
            event!(Level::ERROR, txn = %txn, error = %err, "failed to dispose transaction");
        }
        outcome
    }

    async fn execute(
        &self,
        cmd: &UpdateCommand<S::Id>,
        txn: TransactionId,
    ) -> std::result::Result<(), HandleError> {
        match self.apply(cmd, txn).await {
            Ok((updated, version)) => {
                event!(
                    Level::INFO,
                    txn = %txn,
                    from = %updated.from,
                    to = %updated.to,
                    version,
                    "field updated"
                );

                let notified = self.events.updated().emit(&Updated {
                    command: cmd.clone(),
                    updated,
                    version,
                });
                let completed = self.events.completed().emit(&Completed {
                    command: cmd.clone(),
                    version: Some(version),
                });

                // A completed-observer failure is the later one and wins.
                completed
                    .and(notified)
                    .map_err(|err| HandleError::new(err, Some(version)))
            }
            Err(failure) => {
                let failure = self.recover(cmd, txn, failure).await;
                Err(self.complete_failed(cmd, failure))
            }
        }
    }

    async fn apply(
        &self,
        cmd: &UpdateCommand<S::Id>,
        txn: TransactionId,
    ) -> std::result::Result<(UpdatedValue, i64), Failure> {
        let record_type = cmd.record_type();
        let field = cmd.field();

        let mut record = self
            .store
            .find(txn, record_type, cmd.id())
            .await
            .map_err(|err| Failure::new(err, None))?
            .ok_or_else(|| {
                Failure::new(
                    EditError::NotFound {
                        record_type: record_type.clone(),
                        id: cmd.id().to_string(),
                    },
                    None,
                )
            })?;

        let field_not_found = || {
            Failure::new(
                EditError::FieldNotFound {
                    record_type: record_type.clone(),
                    field: field.to_string(),
                },
                None,
            )
        };
        let field_type = record.field_type(field).ok_or_else(field_not_found)?;
        let from = record.get_field(field).ok_or_else(field_not_found)?;

        let coerced = coerce(cmd.value(), &field_type)
            .map_err(|source| self.property_set_failed(cmd, source))?;

        // Set the detached copy, then read the field back: the no-op check
        // compares what the concrete field type actually holds.
        record
            .set_field(field, coerced)
            .map_err(|source| self.property_set_failed(cmd, source))?;
        let to = record.get_field(field).ok_or_else(field_not_found)?;

        let updated = UpdatedValue::new(from, to);
        if updated.is_noop() {
            return Err(Failure::new(
                EditError::NoOpEdit {
                    field: field.to_string(),
                    value: updated.to.canonical().unwrap_or_default(),
                },
                None,
            ));
        }

        let versioned = record.versioned_mut().ok_or_else(|| {
            Failure::new(EditError::NotVersionable(record_type.clone()), None)
        })?;
        let current = versioned.version();
        let exhausted = || {
            Failure::new(
                EditError::VersionExhausted {
                    record_type: record_type.clone(),
                    version: current,
                },
                None,
            )
        };
        let version = current.checked_add(1).ok_or_else(exhausted)?;
        versioned.set_version(version).map_err(|_| exhausted())?;

        let context = SaveContext::new(txn);
        self.events
            .before_save()
            .emit(&BeforeSave {
                command: cmd.clone(),
                context: context.clone(),
                updated: updated.clone(),
                version,
            })
            .map_err(|err| Failure::new(err, Some(version)))?;

        let mut changes = ChangeSet::from(
            FieldPatch::new(
                record_type.clone(),
                cmd.id().clone(),
                field,
                updated.to.clone(),
            )
            .with_version(version),
        );
        changes.extend(
            context
                .take_staged()
                .map_err(|err| Failure::new(err, Some(version)))?,
        );

        self.store
            .persist(txn, &changes)
            .await
            .map_err(|err| Failure::new(err, Some(version)))?;
        self.store
            .commit(txn)
            .await
            .map_err(|err| Failure::new(err, Some(version)))?;

        Ok((updated, version))
    }

    /// Fires at the point of failure, before rollback.
    fn property_set_failed(&self, cmd: &UpdateCommand<S::Id>, source: CoerceError) -> Failure {
        let error = EditError::PropertySet {
            record_type: cmd.record_type().clone(),
            field: cmd.field().to_string(),
            value: cmd.value().to_string(),
            source: source.clone(),
        };
        event!(Level::WARN, error = %error, "property set failed");

        let notified = self.events.property_set_failed().emit(&PropertySetFailed {
            command: cmd.clone(),
            error: source,
            field: cmd.field().to_string(),
            value: cmd.value().to_string(),
        });
        match notified {
            Ok(()) => Failure::notified(error, None),
            Err(observer) => Failure::notified(observer, None),
        }
    }

    async fn recover(
        &self,
        cmd: &UpdateCommand<S::Id>,
        txn: TransactionId,
        failure: Failure,
    ) -> Failure {
        if let Err(err) = self.store.rollback(txn).await {
            event!(
                Level::ERROR,
                txn = %txn,
                error = %err,
                original = %failure.error,
                "rollback failed"
            );
        }
        self.notify_failure(cmd, failure)
    }

    /// Fire the channel dedicated to the failure's kind, if any.
    fn notify_failure(&self, cmd: &UpdateCommand<S::Id>, failure: Failure) -> Failure {
        if failure.notified {
            return failure;
        }

        let Failure { error, version, .. } = failure;
        let notified = match (&error, error.kind()) {
            (EditError::Validation(errors), _) => {
                event!(Level::WARN, error = %error, "edit rejected by validation");
                self.events.validation_failed().emit(&ValidationFailed {
                    command: cmd.clone(),
                    errors: errors.clone(),
                    version,
                })
            }
            (_, ErrorKind::GenericFailure) => {
                event!(Level::ERROR, error = %error, "edit failed");
                self.events.failed().emit(&Failed {
                    command: cmd.clone(),
                    error: error.clone(),
                    version,
                })
            }
            _ => {
                event!(Level::WARN, error = %error, "edit rejected");
                Ok(())
            }
        };

        match notified {
            Ok(()) => Failure::notified(error, version),
            Err(observer) => Failure::notified(observer, version),
        }
    }

    fn complete_failed(&self, cmd: &UpdateCommand<S::Id>, failure: Failure) -> HandleError {
        let completed = self.events.completed().emit(&Completed {
            command: cmd.clone(),
            version: failure.version,
        });
        let error = completed.err().unwrap_or(failure.error);
        HandleError::new(error, failure.version)
    }
}
