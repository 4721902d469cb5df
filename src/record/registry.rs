//! Startup registry of auditable record types, keyed by table name.

use std::collections::HashMap;
use std::sync::Arc;

use super::label::LabelProvider;

/// Descriptor for one auditable record type: its table identity, key
/// columns, and optional label capability.
#[derive(Debug, Clone)]
pub struct RecordType {
    table: String,
    key_columns: Vec<String>,
    labels: Option<Arc<dyn LabelProvider>>,
}

impl RecordType {
    /// A record type with a single-scalar primary key.
    #[must_use]
    pub fn new(table: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_columns: vec![key_column.into()],
            labels: None,
        }
    }

    /// A record type with a composite key. Such types can be registered
    /// (so lookups recognize them) but any change-set containing them is
    /// rejected during validation.
    #[must_use]
    pub fn composite(table: impl Into<String>, key_columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            key_columns,
            labels: None,
        }
    }

    /// Attach a label provider.
    #[must_use]
    pub fn with_labels(mut self, labels: impl LabelProvider + 'static) -> Self {
        self.labels = Some(Arc::new(labels));
        self
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// The key column, when the key is a single scalar.
    #[must_use]
    pub fn key_column(&self) -> Option<&str> {
        match self.key_columns.as_slice() {
            [single] => Some(single),
            _ => None,
        }
    }

    #[must_use]
    pub fn labels(&self) -> Option<&dyn LabelProvider> {
        self.labels.as_deref()
    }
}

/// Immutable lookup map from table name to record type, built once at
/// startup.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<RecordType>>,
}

impl TypeRegistry {
    #[must_use]
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    #[must_use]
    pub fn get(&self, table: &str) -> Option<&Arc<RecordType>> {
        self.types.get(table)
    }

    #[must_use]
    pub fn contains(&self, table: &str) -> bool {
        self.types.contains_key(table)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Builder collecting record type registrations.
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    types: HashMap<String, Arc<RecordType>>,
}

impl TypeRegistryBuilder {
    /// Register a record type. A later registration for the same table
    /// replaces the earlier one.
    #[must_use]
    pub fn register(mut self, record_type: RecordType) -> Self {
        self.types
            .insert(record_type.table().to_string(), Arc::new(record_type));
        self
    }

    #[must_use]
    pub fn build(self) -> TypeRegistry {
        TypeRegistry { types: self.types }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StaticLabels;
    use serde_json::json;

    #[test]
    fn test_registry_lookup() {
        let registry = TypeRegistry::builder()
            .register(RecordType::new("profiles", "id"))
            .register(RecordType::new("delivery_fees", "id"))
            .build();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("profiles"));
        assert!(!registry.contains("orders"));

        let profiles = registry.get("profiles").expect("profiles registered");
        assert_eq!(profiles.table(), "profiles");
        assert_eq!(profiles.key_column(), Some("id"));
    }

    #[test]
    fn test_empty_registry() {
        let registry = TypeRegistry::builder().build();
        assert!(registry.is_empty());
        assert!(registry.get("profiles").is_none());
    }

    #[test]
    fn test_composite_key_has_no_single_column() {
        let line_items = RecordType::composite(
            "line_items",
            vec!["order_id".to_string(), "position".to_string()],
        );
        assert_eq!(line_items.key_columns().len(), 2);
        assert_eq!(line_items.key_column(), None);
    }

    #[test]
    fn test_later_registration_replaces_earlier() {
        let registry = TypeRegistry::builder()
            .register(RecordType::new("profiles", "id"))
            .register(RecordType::new("profiles", "profile_id"))
            .build();

        assert_eq!(registry.len(), 1);
        let profiles = registry.get("profiles").expect("profiles registered");
        assert_eq!(profiles.key_column(), Some("profile_id"));
    }

    #[test]
    fn test_labels_attached_to_type() {
        let registry = TypeRegistry::builder()
            .register(
                RecordType::new("profiles", "id")
                    .with_labels(StaticLabels::new().label("active", 1, "Yes")),
            )
            .build();

        let profiles = registry.get("profiles").expect("profiles registered");
        let labels = profiles.labels().expect("labels attached");
        assert_eq!(labels.field_label("active", &json!(1)).as_deref(), Some("Yes"));
        assert_eq!(labels.field_label("active", &json!(5)), None);
    }
}
