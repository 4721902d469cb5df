//! Optional raw-value to human-readable label translation.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use super::types::Attributes;

/// Capability for translating raw persisted values into the labels a user
/// saw at the time of the change.
///
/// Record types that cannot translate simply return `None`; absence is a
/// normal, checked case. Implementations must be pure: same input, same
/// label, no side effects on the record.
pub trait LabelProvider: fmt::Debug + Send + Sync {
    /// Label for one field's raw value, or `None` when the field or value
    /// has no translation.
    fn field_label(&self, field: &str, value: &Value) -> Option<String>;

    /// Label for a whole record, used for create/delete entries. Defaults
    /// to no whole-record strategy.
    fn record_label(&self, attributes: &Attributes) -> Option<String> {
        let _ = attributes;
        None
    }
}

/// Table-driven label provider: a per-field map from raw value to label.
///
/// Values are keyed by their canonical JSON encoding, so `0` and `"0"` are
/// distinct entries.
#[derive(Debug, Default, Clone)]
pub struct StaticLabels {
    fields: HashMap<String, HashMap<String, String>>,
    record_field: Option<String>,
}

impl StaticLabels {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a label for one raw value of one field.
    #[must_use]
    pub fn label(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
        label: impl Into<String>,
    ) -> Self {
        self.fields
            .entry(field.into())
            .or_default()
            .insert(value.into().to_string(), label.into());
        self
    }

    /// Designate the field whose value names the whole record. Falls back
    /// to the field's raw string value when no per-value label exists.
    #[must_use]
    pub fn record_field(mut self, field: impl Into<String>) -> Self {
        self.record_field = Some(field.into());
        self
    }
}

impl LabelProvider for StaticLabels {
    fn field_label(&self, field: &str, value: &Value) -> Option<String> {
        self.fields
            .get(field)?
            .get(&value.to_string())
            .cloned()
    }

    fn record_label(&self, attributes: &Attributes) -> Option<String> {
        let field = self.record_field.as_deref()?;
        let value = attributes.get(field)?;
        self.field_label(field, value)
            .or_else(|| value.as_str().map(String::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> StaticLabels {
        StaticLabels::new()
            .label("offer_delivery_trade_in", 0, "No")
            .label("offer_delivery_trade_in", 1, "Yes")
            .record_field("name")
    }

    #[test]
    fn test_field_label_hit() {
        let labels = provider();
        assert_eq!(
            labels.field_label("offer_delivery_trade_in", &json!(0)),
            Some("No".to_string())
        );
        assert_eq!(
            labels.field_label("offer_delivery_trade_in", &json!(1)),
            Some("Yes".to_string())
        );
    }

    #[test]
    fn test_field_label_miss_is_none() {
        let labels = provider();
        assert_eq!(labels.field_label("offer_delivery_trade_in", &json!(2)), None);
        assert_eq!(labels.field_label("delivery_range_miles", &json!(50)), None);
    }

    #[test]
    fn test_field_label_distinguishes_value_types() {
        let labels = StaticLabels::new().label("flag", 0, "zero-number");
        assert_eq!(labels.field_label("flag", &json!(0)).as_deref(), Some("zero-number"));
        assert_eq!(labels.field_label("flag", &json!("0")), None);
    }

    #[test]
    fn test_field_label_is_pure() {
        let labels = provider();
        let first = labels.field_label("offer_delivery_trade_in", &json!(1));
        let second = labels.field_label("offer_delivery_trade_in", &json!(1));
        assert_eq!(first, second);
    }

    #[test]
    fn test_record_label_uses_designated_field() {
        let labels = provider();
        let attrs = match json!({"name": "Main St. lot", "id": 3}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert_eq!(labels.record_label(&attrs), Some("Main St. lot".to_string()));
    }

    #[test]
    fn test_record_label_absent_without_strategy() {
        let labels = StaticLabels::new().label("flag", 1, "Yes");
        let attrs = match json!({"flag": 1}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert_eq!(labels.record_label(&attrs), None);
    }
}
