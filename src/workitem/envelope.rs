//! Reserved top-level workitem keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Transient signalling fields that ride along with a workitem while it is
/// being sent to the orchestrator. Every key is optional and omitted from the
/// wire document when unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    #[serde(rename = "__output__", skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(rename = "__streaming__", skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,

    #[serde(rename = "__error__", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(rename = "__waiting__", skip_serializing_if = "Option::is_none")]
    pub waiting: Option<bool>,

    #[serde(rename = "__cancel__", skip_serializing_if = "Option::is_none")]
    pub cancel: Option<bool>,

    #[serde(rename = "__not_needed__", skip_serializing_if = "Option::is_none")]
    pub not_needed: Option<bool>,

    #[serde(rename = "__persist__", skip_serializing_if = "Option::is_none")]
    pub persist: Option<bool>,

    #[serde(rename = "__create__", skip_serializing_if = "Option::is_none")]
    pub create: Option<bool>,

    #[serde(rename = "__update__", skip_serializing_if = "Option::is_none")]
    pub update: Option<bool>,

    #[serde(rename = "__delete__", skip_serializing_if = "Option::is_none")]
    pub delete: Option<bool>,

    #[serde(rename = "__model__", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(rename = "__record_id__", skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    #[serde(rename = "__record_field__", skip_serializing_if = "Option::is_none")]
    pub record_field: Option<String>,

    #[serde(rename = "__record_value__", skip_serializing_if = "Option::is_none")]
    pub record_value: Option<Value>,

    /// Either a field→value map, or (legacy) a comma-joined list of names.
    #[serde(rename = "__record_fields__", skip_serializing_if = "Option::is_none")]
    pub record_fields: Option<Value>,

    /// Comma-joined values matching a legacy `record_fields` list.
    #[serde(rename = "__record_values__", skip_serializing_if = "Option::is_none")]
    pub record_values: Option<Value>,

    #[serde(rename = "__filter__", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Map<String, Value>>,

    #[serde(rename = "__name__", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Envelope {
    /// True when no reserved key is set.
    pub fn is_empty(&self) -> bool {
        *self == Envelope::default()
    }

    /// Drop the persistence markers set by a record operation.
    ///
    /// Model and record payload keys are left in place.
    pub fn clear_persist_markers(&mut self) {
        self.persist = None;
        self.create = None;
        self.update = None;
        self.delete = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_keys_are_omitted() {
        let envelope = Envelope {
            cancel: Some(true),
            ..Default::default()
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value, serde_json::json!({"__cancel__": true}));
    }

    #[test]
    fn test_clear_persist_markers_keeps_payload() {
        let mut envelope = Envelope {
            persist: Some(true),
            delete: Some(true),
            model: Some("animal".into()),
            name: Some("1".into()),
            ..Default::default()
        };
        envelope.clear_persist_markers();
        assert_eq!(envelope.persist, None);
        assert_eq!(envelope.delete, None);
        assert_eq!(envelope.model.as_deref(), Some("animal"));
        assert_eq!(envelope.name.as_deref(), Some("1"));
        assert!(!envelope.is_empty());
    }
}
