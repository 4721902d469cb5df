//! Record instances with persisted-snapshot dirty tracking.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute map of a record: column name to raw JSON value.
///
/// `serde_json::Map` is BTree-backed, so iteration order (and therefore
/// audit entry order) is deterministic by field name.
pub type Attributes = serde_json::Map<String, Value>;

/// A single-scalar primary key value.
///
/// Composite keys are not representable; records with composite keys are
/// rejected during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    /// Integer key, typically a rowid-backed `INTEGER PRIMARY KEY`.
    Int(i64),
    /// Text key, e.g. a UUID stored as TEXT.
    Text(String),
}

impl PrimaryKey {
    /// Extract a key from a raw attribute value, if it holds a scalar of a
    /// supported kind.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// The raw JSON value this key was derived from.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::from(s.clone()),
        }
    }
}

impl std::fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A record instance bound to a table, tracking its last-persisted state.
///
/// A field is dirty when its current value differs from the snapshot taken
/// at load (or insert) time. New, not-yet-persisted records have an empty
/// snapshot and no primary key until the insert assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    table: String,
    primary_key: Option<PrimaryKey>,
    snapshot: Attributes,
    current: Attributes,
}

impl Record {
    /// A new, unsaved record carrying the attributes to insert.
    #[must_use]
    pub fn new(table: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            table: table.into(),
            primary_key: None,
            snapshot: Attributes::new(),
            current: attributes,
        }
    }

    /// A record reflecting an already-persisted row; snapshot and current
    /// state start out identical, so nothing is dirty.
    #[must_use]
    pub fn persisted(
        table: impl Into<String>,
        primary_key: impl Into<PrimaryKey>,
        attributes: Attributes,
    ) -> Self {
        Self {
            table: table.into(),
            primary_key: Some(primary_key.into()),
            snapshot: attributes.clone(),
            current: attributes,
        }
    }

    /// Table this record belongs to.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Primary key, if the record has been persisted.
    #[must_use]
    pub fn primary_key(&self) -> Option<&PrimaryKey> {
        self.primary_key.as_ref()
    }

    /// Current value of a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.current.get(field)
    }

    /// Set a field's in-memory value. The field becomes dirty if the value
    /// differs from the persisted snapshot.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.current.insert(field.into(), value.into());
    }

    /// Current in-memory attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.current
    }

    /// Last-persisted attribute snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &Attributes {
        &self.snapshot
    }

    /// Whether any field differs from the persisted snapshot.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.current
            .iter()
            .any(|(field, value)| self.snapshot.get(field) != Some(value))
    }

    /// Assign the key generated by an insert and mirror it into the
    /// attribute map under the given column.
    pub(crate) fn assign_primary_key(&mut self, column: &str, key: PrimaryKey) {
        self.current.insert(column.to_string(), key.to_value());
        self.primary_key = Some(key);
    }

    /// Fold the current state into the snapshot after a successful write.
    pub(crate) fn mark_persisted(&mut self) {
        self.snapshot = self.current.clone();
    }
}
