//! The audit row shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::changeset::Action;

/// One audit row: a single field change (update) or one whole-record
/// action (create/delete).
///
/// `field_name` discriminates the two forms: per-field update rows carry
/// the field name and its old/new raw values; create/delete rows carry no
/// field name and hold the full attribute set as a JSON object in
/// `new_value` (create) or `old_value` (delete). Entries are immutable
/// once written; the sink is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Table of the mutated row.
    pub table_name: String,

    /// Changed field, absent for whole-record create/delete rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,

    /// String-encoded primary key of the mutated row.
    pub primary_key: String,

    /// The action this entry was derived from.
    pub action: Action,

    /// Raw value before the change; absent for create.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,

    /// Raw value after the change; absent for delete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,

    /// Human-readable rendering of `old_value` cached at audit time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_label: Option<String>,

    /// Human-readable rendering of `new_value` cached at audit time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_label: Option<String>,

    /// Shared by every entry produced from one change-set execution.
    pub correlation_id: Uuid,

    /// Identity the change is attributed to.
    pub actor_id: String,

    /// When the entry was built (UTC).
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Whether this is a whole-record (create/delete) entry.
    #[must_use]
    pub fn is_whole_record(&self) -> bool {
        self.field_name.is_none()
    }
}
