//! Structural validation of a change-set before any storage I/O.

use thiserror::Error;

use super::types::{Action, Actor, ChangeSet};
use crate::record::TypeRegistry;

/// Rejections raised by the validator. All of these surface before the
/// first storage write, so a failed validation has no side effects.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// No acting user was bound to the invocation; changes cannot be
    /// attributed.
    #[error("no acting user bound to this invocation")]
    Misconfigured,

    /// The action keyword is not one of create/update/delete.
    #[error("unsupported action: {0}")]
    InvalidAction(String),

    /// The change-set violates a structural rule (empty set, wrong
    /// cardinality, unrecognized member, missing key).
    #[error("invalid change-set: {0}")]
    InvalidChangeSet(String),

    /// A create targets a table with no registered record type.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The member's record type declares a composite primary key.
    #[error("composite primary key on table {0} is not supported")]
    UnsupportedKey(String),
}

/// Check a change-set against the structural rules, in order,
/// short-circuiting on the first failure:
///
/// 1. an actor is bound;
/// 2. the action is a supported keyword (enforced by the [`Action`] type;
///    string input fails at [`Action::from_str`]);
/// 3. every update/delete member is of a registered record type and
///    carries a primary key (a pre-existing row);
/// 4. create and delete sets contain exactly one member;
/// 5. the create target resolves to a registered record type;
/// 6. every member's record type has a single-scalar key.
///
/// # Errors
///
/// Returns the corresponding [`ValidationError`] for the first rule that
/// fails.
pub fn validate(
    registry: &TypeRegistry,
    actor: Option<&Actor>,
    action: Action,
    set: &ChangeSet,
) -> Result<(), ValidationError> {
    // 1. attribution
    if actor.is_none() {
        return Err(ValidationError::Misconfigured);
    }

    // 2. the action keyword is made unrepresentable-if-invalid by the enum

    if set.is_empty() {
        return Err(ValidationError::InvalidChangeSet(
            "change-set is empty".to_string(),
        ));
    }

    // 3. member recognition
    if action != Action::Create {
        for record in set {
            if !registry.contains(record.table()) {
                return Err(ValidationError::InvalidChangeSet(format!(
                    "unrecognized record type for table {}",
                    record.table()
                )));
            }
            if record.primary_key().is_none() {
                return Err(ValidationError::InvalidChangeSet(format!(
                    "{action} member for table {} has no primary key",
                    record.table()
                )));
            }
        }
    }

    // 4. cardinality
    if matches!(action, Action::Create | Action::Delete) && set.len() != 1 {
        return Err(ValidationError::InvalidChangeSet(format!(
            "{action} requires exactly one member, found {}",
            set.len()
        )));
    }

    // 5. create target must be registered
    if action == Action::Create {
        for record in set {
            if !registry.contains(record.table()) {
                return Err(ValidationError::UnknownTable(record.table().to_string()));
            }
        }
    }

    // 6. single-scalar keys only
    for record in set {
        if let Some(record_type) = registry.get(record.table()) {
            if record_type.key_column().is_none() {
                return Err(ValidationError::UnsupportedKey(record.table().to_string()));
            }
        }
    }

    Ok(())
}
