//! The workitem document exchanged with the orchestrator.
//!
//! A workitem is a `fields` map (the durable business payload) plus a typed
//! [`Envelope`] of reserved top-level keys that only live for the duration of
//! a single send. Any other top-level keys the host supplies are carried
//! through untouched.

pub mod envelope;
pub mod records;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use envelope::Envelope;
pub use records::{RecordFields, RecordFilter};

/// Outputs produced by the current action for the next workflow step.
pub const CONTEXT_OUTPUTS: &str = "__context_outputs__";
/// Outputs handed down from the previous workflow step.
pub const PREVIOUS_CONTEXT_OUTPUTS: &str = "__previous_context_outputs__";
/// Ordered `{name, url}` records shown in the UI.
pub const LINKS: &str = "__links__";
/// Last error message.
pub const ERROR: &str = "__error__";

/// A workitem document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workitem {
    #[serde(default)]
    pub fields: Map<String, Value>,

    #[serde(flatten)]
    pub envelope: Envelope,

    /// Top-level keys this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Workitem {
    /// Create an empty workitem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a workitem with the given fields.
    pub fn with_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    /// Parse a wire document.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Render the wire document.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Raw field access.
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field value, or `default` when the field is absent, null or empty.
    /// A null default never replaces a present value.
    pub fn get_field_or(&self, name: &str, default: Value) -> Value {
        match self.fields.get(name) {
            Some(v) if !is_empty_value(v) || default.is_null() => v.clone(),
            _ => default,
        }
    }

    /// Integer coercion of a field, falling back to `default`.
    pub fn get_int_field(&self, name: &str, default: i64) -> i64 {
        self.fields
            .get(name)
            .and_then(coerce_int)
            .unwrap_or(default)
    }

    /// Boolean coercion of a field; absent fields are false.
    pub fn get_boolean_field(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(coerce_bool)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Store a named output for the next workflow step.
    pub fn save_output_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let outputs = self.object_field_mut(CONTEXT_OUTPUTS);
        outputs.insert(name.into(), value.into());
    }

    /// Read a named output.
    ///
    /// When the previous step handed down outputs they are the source;
    /// otherwise the current step's own outputs are consulted.
    pub fn read_output_value(&self, name: &str) -> Option<&Value> {
        match self.fields.get(PREVIOUS_CONTEXT_OUTPUTS) {
            Some(Value::Object(previous)) => previous.get(name),
            Some(Value::Null) | None => self
                .fields
                .get(CONTEXT_OUTPUTS)
                .and_then(Value::as_object)
                .and_then(|outputs| outputs.get(name)),
            Some(_) => None,
        }
    }

    /// Append a link to the `__links__` list.
    pub fn add_link(&mut self, name: impl Into<String>, url: impl Into<String>) {
        let link = serde_json::json!({ "name": name.into(), "url": url.into() });
        match self.fields.get_mut(LINKS) {
            Some(Value::Array(links)) => links.push(link),
            _ => {
                self.fields.insert(LINKS.to_string(), Value::Array(vec![link]));
            }
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.fields.get(ERROR).and_then(Value::as_str)
    }

    /// True when a non-empty error message is recorded.
    pub fn has_error(&self) -> bool {
        self.error().is_some_and(|e| !e.is_empty())
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.fields.insert(ERROR.to_string(), Value::String(error.into()));
    }

    /// Get (creating or replacing a non-object value) an object field.
    fn object_field_mut(&mut self, name: &str) -> &mut Map<String, Value> {
        let slot = self
            .fields
            .entry(name.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot was just made an object"),
        }
    }
}

/// Whether a string parses as a JSON document.
pub fn is_json(text: &str) -> bool {
    serde_json::from_str::<Value>(text).is_ok()
}

/// Null, and empty strings, arrays and objects count as empty.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Integer coercion: native integers, floats (truncated) and integer strings.
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                    .map(|f| f.trunc() as i64)
            }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Boolean coercion: booleans as-is, numbers as `!= 0`, and the strings
/// `"t"` / `"true"` in any case; everything else is false.
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_i64() {
            Some(i) => i != 0,
            None => n.as_f64().is_some_and(|f| f != 0.0),
        },
        Value::String(s) => s.eq_ignore_ascii_case("t") || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
