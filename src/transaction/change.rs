// ============================================================================
// Field Patches
// ============================================================================
//
// A narrow update: one record, one field, one new value. The orchestrator
// never ships a whole record image to storage, only the patch naming the
// single modified field (plus the bumped version, when there is one).
//
// ============================================================================

use std::fmt;

use crate::core::{RecordType, Value};

/// Storage key of one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey<I> {
    pub record_type: RecordType,
    pub id: I,
}

impl<I> RecordKey<I> {
    pub fn new(record_type: RecordType, id: I) -> Self {
        Self { record_type, id }
    }
}

impl<I: fmt::Display> fmt::Display for RecordKey<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.record_type, self.id)
    }
}

/// Single-field modification of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPatch<I> {
    pub key: RecordKey<I>,
    pub field: String,
    pub value: Value,
    /// Version the record carries after the patch; `None` leaves it as is.
    pub version: Option<i64>,
}

impl<I> FieldPatch<I> {
    pub fn new(record_type: RecordType, id: I, field: impl Into<String>, value: Value) -> Self {
        Self {
            key: RecordKey::new(record_type, id),
            field: field.into(),
            value,
            version: None,
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }
}

/// Ordered patches handed to a single persist call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet<I> {
    patches: Vec<FieldPatch<I>>,
}

impl<I> Default for ChangeSet<I> {
    fn default() -> Self {
        Self {
            patches: Vec::new(),
        }
    }
}

impl<I> ChangeSet<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, patch: FieldPatch<I>) {
        self.patches.push(patch);
    }

    pub fn patches(&self) -> &[FieldPatch<I>] {
        &self.patches
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldPatch<I>> {
        self.patches.iter()
    }
}

impl<I> From<FieldPatch<I>> for ChangeSet<I> {
    fn from(patch: FieldPatch<I>) -> Self {
        Self {
            patches: vec![patch],
        }
    }
}

impl<I> Extend<FieldPatch<I>> for ChangeSet<I> {
    fn extend<T: IntoIterator<Item = FieldPatch<I>>>(&mut self, iter: T) {
        self.patches.extend(iter);
    }
}

impl<'a, I> IntoIterator for &'a ChangeSet<I> {
    type Item = &'a FieldPatch<I>;
    type IntoIter = std::slice::Iter<'a, FieldPatch<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.patches.iter()
    }
}
