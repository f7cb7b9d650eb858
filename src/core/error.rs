use std::sync::Arc;

use thiserror::Error;

use crate::coerce::CoerceError;
use crate::core::RecordType;
use crate::events::Channel;
use crate::storage::ValidationErrors;

#[derive(Error, Debug, Clone)]
pub enum EditError {
    #[error("Record '{record_type}' with id '{id}' not found")]
    NotFound { record_type: RecordType, id: String },

    #[error("Field '{field}' not found on record '{record_type}'")]
    FieldNotFound { record_type: RecordType, field: String },

    #[error("Failed to set value for {record_type}[{field}][{value}]: {source}")]
    PropertySet {
        record_type: RecordType,
        field: String,
        value: String,
        #[source]
        source: CoerceError,
    },

    #[error("Field '{field}' already holds '{value}'")]
    NoOpEdit { field: String, value: String },

    #[error("Record '{0}' is not versionable")]
    NotVersionable(RecordType),

    #[error("Version of record '{record_type}' cannot advance past {version}")]
    VersionExhausted { record_type: RecordType, version: i64 },

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Optimistic concurrency conflict: {0}")]
    Conflict(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Observer on {channel} failed: {source}")]
    Observer {
        channel: Channel,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

/// Failure classes a caller can branch on.
///
/// Every [`EditError`] maps onto exactly one kind; the orchestrator uses the
/// kind to decide which failure notification fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    FieldNotFound,
    PropertySetFailure,
    NoOpEdit,
    NotVersionable,
    ValidationFailure,
    GenericFailure,
}

impl EditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::FieldNotFound { .. } => ErrorKind::FieldNotFound,
            Self::PropertySet { .. } => ErrorKind::PropertySetFailure,
            Self::NoOpEdit { .. } => ErrorKind::NoOpEdit,
            Self::NotVersionable(_) => ErrorKind::NotVersionable,
            Self::Validation(_) => ErrorKind::ValidationFailure,
            Self::VersionExhausted { .. }
            | Self::Conflict(_)
            | Self::Transaction(_)
            | Self::Storage(_)
            | Self::Lock(_)
            | Self::Observer { .. } => ErrorKind::GenericFailure,
        }
    }

    pub(crate) fn observer(channel: Channel, err: anyhow::Error) -> Self {
        let boxed: Box<dyn std::error::Error + Send + Sync> = err.into();
        Self::Observer {
            channel,
            source: Arc::from(boxed),
        }
    }
}

pub type Result<T> = std::result::Result<T, EditError>;

impl<T> From<std::sync::PoisonError<T>> for EditError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

/// Error returned by `InlineEditor::handle`.
///
/// Carries the version in effect when the call failed so a UI can tell
/// "nothing changed" (`None`) from "changed but not committed" (`Some`).
#[derive(Error, Debug, Clone)]
#[error("{error}")]
pub struct HandleError {
    pub error: EditError,
    pub version: Option<i64>,
}

impl HandleError {
    pub fn new(error: EditError, version: Option<i64>) -> Self {
        Self { error, version }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn into_inner(self) -> EditError {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let not_found = EditError::NotFound {
            record_type: RecordType::named("account"),
            id: "7".into(),
        };
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert_eq!(
            EditError::Conflict("v3 != v4".into()).kind(),
            ErrorKind::GenericFailure
        );
        assert_eq!(
            EditError::NotVersionable(RecordType::named("note")).kind(),
            ErrorKind::NotVersionable
        );
    }

    #[test]
    fn test_observer_error_keeps_message() {
        let err = EditError::observer(Channel::BeforeSave, anyhow::anyhow!("audit sink down"));
        assert_eq!(err.kind(), ErrorKind::GenericFailure);
        assert!(err.to_string().contains("audit sink down"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_poison_maps_to_lock_error() {
        let lock = std::sync::Arc::new(std::sync::Mutex::new(0));
        let poisoned = std::sync::Arc::clone(&lock);
        let _ = std::thread::spawn(move || {
            let _guard = poisoned.lock().unwrap();
            panic!("poison");
        })
        .join();

        let err: EditError = lock.lock().unwrap_err().into();
        assert!(matches!(err, EditError::Lock(_)));
    }

    #[test]
    fn test_handle_error_displays_inner() {
        let err = HandleError::new(
            EditError::NoOpEdit {
                field: "status".into(),
                value: "Active".into(),
            },
            None,
        );
        assert_eq!(err.kind(), ErrorKind::NoOpEdit);
        assert_eq!(err.to_string(), "Field 'status' already holds 'Active'");
    }
}
