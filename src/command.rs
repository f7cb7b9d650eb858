use serde::{Deserialize, Serialize};

use crate::core::RecordType;
use crate::model::InlineRecord;
use crate::transaction::IsolationLevel;

/// Request to set one field of one record from raw text.
///
/// Commands are values: the editor never mutates them and hands the same
/// command back on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCommand<I> {
    record_type: RecordType,
    id: I,
    field: String,
    value: String,
    #[serde(default)]
    isolation: IsolationLevel,
}

impl<I> UpdateCommand<I> {
    pub fn new(
        record_type: impl Into<RecordType>,
        id: I,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            id,
            field: field.into(),
            value: value.into(),
            isolation: IsolationLevel::Unspecified,
        }
    }

    /// Command addressed to the record type `R` registers under.
    pub fn for_record<R: InlineRecord>(
        id: I,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(RecordType::of::<R>(), id, field, value)
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    pub fn id(&self) -> &I {
        &self.id
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Raw, uncoerced input.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }
}

impl<I> AsRef<UpdateCommand<I>> for UpdateCommand<I> {
    fn as_ref(&self) -> &UpdateCommand<I> {
        self
    }
}

/// Update that restores a previous value, remembering the version the
/// caller expects the record to be at.
///
/// The editor treats it like any other update; comparing `expected_version`
/// against the stored version is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertCommand<I> {
    command: UpdateCommand<I>,
    expected_version: i64,
}

impl<I> RevertCommand<I> {
    pub fn new(command: UpdateCommand<I>, expected_version: i64) -> Self {
        Self {
            command,
            expected_version,
        }
    }

    pub fn command(&self) -> &UpdateCommand<I> {
        &self.command
    }

    pub fn expected_version(&self) -> i64 {
        self.expected_version
    }

    pub fn is_current(&self, version: i64) -> bool {
        self.expected_version == version
    }

    pub fn into_command(self) -> UpdateCommand<I> {
        self.command
    }
}

impl<I> AsRef<UpdateCommand<I>> for RevertCommand<I> {
    fn as_ref(&self) -> &UpdateCommand<I> {
        &self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_defaults() {
        let command = UpdateCommand::new("account", 7u64, "status", "Inactive");
        assert_eq!(command.record_type().name(), "account");
        assert_eq!(*command.id(), 7);
        assert_eq!(command.field(), "status");
        assert_eq!(command.value(), "Inactive");
        assert!(command.isolation().is_unspecified());

        let strict = command.with_isolation(IsolationLevel::Serializable);
        assert_eq!(strict.isolation(), IsolationLevel::Serializable);
    }

    #[test]
    fn test_revert_exposes_inner_command() {
        let command = UpdateCommand::new("account", 7u64, "status", "Active");
        let revert = RevertCommand::new(command.clone(), 4);

        assert_eq!(revert.as_ref(), &command);
        assert!(revert.is_current(4));
        assert!(!revert.is_current(5));
    }

    #[test]
    fn test_command_from_json() {
        let command: UpdateCommand<u64> = serde_json::from_str(
            r#"{"record_type":"account","id":7,"field":"status","value":"Inactive"}"#,
        )
        .unwrap();
        assert_eq!(command, UpdateCommand::new("account", 7, "status", "Inactive"));
    }
}
