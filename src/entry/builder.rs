//! Derives audit entries from planned mutations. Pure: never writes.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::types::AuditEntry;
use crate::changeset::{Action, FieldChange};
use crate::record::{Attributes, PrimaryKey, RecordType};

/// One entry per changed field of an updated record. Labels for the old
/// and new value are resolved independently; either side may translate
/// while the other does not.
#[must_use]
pub fn update_entries(
    record_type: &RecordType,
    key: &PrimaryKey,
    changes: &[FieldChange],
    correlation_id: Uuid,
    actor_id: &str,
    at: DateTime<Utc>,
) -> Vec<AuditEntry> {
    changes
        .iter()
        .map(|change| {
            let labels = record_type.labels();
            let old_label =
                labels.and_then(|l| l.field_label(&change.field, &change.old));
            let new_label =
                labels.and_then(|l| l.field_label(&change.field, &change.new));
            AuditEntry {
                table_name: record_type.table().to_string(),
                field_name: Some(change.field.clone()),
                primary_key: key.to_string(),
                action: Action::Update,
                old_value: Some(change.old.clone()),
                new_value: Some(change.new.clone()),
                old_label,
                new_label,
                correlation_id,
                actor_id: actor_id.to_string(),
                created_at: at,
            }
        })
        .collect()
}

/// One whole-record entry for an insert: no old value, the full persisted
/// attribute set (including the generated key) as the new value.
#[must_use]
pub fn create_entry(
    record_type: &RecordType,
    key: &PrimaryKey,
    attributes: &Attributes,
    correlation_id: Uuid,
    actor_id: &str,
    at: DateTime<Utc>,
) -> AuditEntry {
    let new_label = record_type
        .labels()
        .and_then(|l| l.record_label(attributes));
    AuditEntry {
        table_name: record_type.table().to_string(),
        field_name: None,
        primary_key: key.to_string(),
        action: Action::Create,
        old_value: None,
        new_value: Some(Value::Object(attributes.clone())),
        old_label: None,
        new_label,
        correlation_id,
        actor_id: actor_id.to_string(),
        created_at: at,
    }
}

/// One whole-record entry for a removal: the full pre-delete snapshot as
/// the old value, no new value.
#[must_use]
pub fn delete_entry(
    record_type: &RecordType,
    key: &PrimaryKey,
    snapshot: &Attributes,
    correlation_id: Uuid,
    actor_id: &str,
    at: DateTime<Utc>,
) -> AuditEntry {
    let old_label = record_type.labels().and_then(|l| l.record_label(snapshot));
    AuditEntry {
        table_name: record_type.table().to_string(),
        field_name: None,
        primary_key: key.to_string(),
        action: Action::Delete,
        old_value: Some(Value::Object(snapshot.clone())),
        new_value: None,
        old_label,
        new_label: None,
        correlation_id,
        actor_id: actor_id.to_string(),
        created_at: at,
    }
}
