//! Core change-set types.

use serde::{Deserialize, Serialize};

use super::validate::ValidationError;
use crate::record::Record;

/// Kind of mutation a change-set performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// A new row is inserted.
    Create,
    /// Fields of pre-existing rows change.
    Update,
    /// A row is removed.
    Delete,
}

impl Action {
    /// Returns the string representation for database storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(ValidationError::InvalidAction(other.to_string())),
        }
    }
}

/// The identity a change-set is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    id: String,
}

impl Actor {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// An ordered batch of record mutations belonging to one logical user
/// action, audited under one correlation identifier.
///
/// Constructed by the caller, consumed exactly once by the executor. The
/// change-set itself is never persisted, only the audit entries derived
/// from it.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    records: Vec<Record>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A change-set holding exactly one record, the only valid shape for
    /// create and delete.
    #[must_use]
    pub fn single(record: Record) -> Self {
        Self {
            records: vec![record],
        }
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Consume the change-set expecting exactly one member.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidChangeSet`] when the member count
    /// is not one.
    pub fn into_single(self) -> Result<Record, ValidationError> {
        let count = self.records.len();
        let mut records = self.records;
        match count {
            1 => Ok(records.swap_remove(0)),
            n => Err(ValidationError::InvalidChangeSet(format!(
                "expected exactly one member, found {n}"
            ))),
        }
    }
}

impl From<Vec<Record>> for ChangeSet {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Attributes;

    #[test]
    fn test_action_as_str() {
        assert_eq!(Action::Create.as_str(), "create");
        assert_eq!(Action::Update.as_str(), "update");
        assert_eq!(Action::Delete.as_str(), "delete");
    }

    #[test]
    fn test_action_parse_round_trip() {
        for action in [Action::Create, Action::Update, Action::Delete] {
            let parsed: Action = action.as_str().parse().expect("known keyword");
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn test_action_parse_rejects_unknown_keyword() {
        let err = "upsert".parse::<Action>().expect_err("unsupported keyword");
        assert!(matches!(err, ValidationError::InvalidAction(ref word) if word == "upsert"));
    }

    #[test]
    fn test_action_serialize() {
        let json = serde_json::to_string(&Action::Update).expect("serialize");
        assert_eq!(json, "\"update\"");
    }

    #[test]
    fn test_actor_id() {
        let actor = Actor::new("user-7");
        assert_eq!(actor.id(), "user-7");
    }

    #[test]
    fn test_changeset_collects_records() {
        let mut set = ChangeSet::new();
        assert!(set.is_empty());

        set.push(Record::persisted("profiles", 1, Attributes::new()));
        set.push(Record::persisted("delivery_fees", 2, Attributes::new()));

        assert_eq!(set.len(), 2);
        let tables: Vec<_> = set.iter().map(Record::table).collect();
        assert_eq!(tables, vec!["profiles", "delivery_fees"]);
    }

    #[test]
    fn test_into_single_accepts_one_member() {
        let set = ChangeSet::single(Record::persisted("profiles", 1, Attributes::new()));
        let record = set.into_single().expect("single member");
        assert_eq!(record.table(), "profiles");
    }

    #[test]
    fn test_into_single_rejects_two_members() {
        let set = ChangeSet::from(vec![
            Record::persisted("profiles", 1, Attributes::new()),
            Record::persisted("profiles", 2, Attributes::new()),
        ]);
        let err = set.into_single().expect_err("two members");
        assert!(matches!(err, ValidationError::InvalidChangeSet(_)));
    }
}
