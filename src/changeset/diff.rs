//! Per-field diffing of a record against its persisted snapshot.

use serde_json::Value;

use crate::record::Record;

/// One field whose in-memory value differs from the persisted snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    /// Value from the last-persisted snapshot; `Value::Null` when the
    /// snapshot had no value for the field.
    pub old: Value,
    /// Current in-memory value, taken verbatim.
    pub new: Value,
}

/// Collect the dirty fields of a record as (old, new) pairs.
///
/// Fields are emitted in attribute-map order (sorted by name). A record
/// with no dirty fields yields an empty list; callers treat that as a
/// no-op contribution, not an error.
#[must_use]
pub fn changed_fields(record: &Record) -> Vec<FieldChange> {
    let snapshot = record.snapshot();
    record
        .attributes()
        .iter()
        .filter_map(|(field, new)| {
            let old = snapshot.get(field).cloned().unwrap_or(Value::Null);
            if old == *new {
                None
            } else {
                Some(FieldChange {
                    field: field.clone(),
                    old,
                    new: new.clone(),
                })
            }
        })
        .collect()
}
