//! Arguments of the record persistence requests.

use serde_json::{Map, Value};

/// Field data for a record creation request.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordFields {
    /// Field name → value map, sent as-is.
    Map(Map<String, Value>),
    /// Legacy form: parallel name and value lists, sent comma-joined.
    Columns { names: Vec<String>, values: Vec<String> },
}

impl RecordFields {
    /// Build the legacy column form.
    pub fn columns<N, V>(names: N, values: V) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        RecordFields::Columns {
            names: names.into_iter().map(Into::into).collect(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Map<String, Value>> for RecordFields {
    fn from(map: Map<String, Value>) -> Self {
        RecordFields::Map(map)
    }
}

/// Selector for a record deletion request.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordFilter {
    /// Field → value filter, sent as `__filter__`.
    Filter(Map<String, Value>),
    /// Legacy form: a record name or id, sent as `__name__`.
    Name(String),
}

impl From<Map<String, Value>> for RecordFilter {
    fn from(map: Map<String, Value>) -> Self {
        RecordFilter::Filter(map)
    }
}

impl From<&str> for RecordFilter {
    fn from(name: &str) -> Self {
        RecordFilter::Name(name.to_string())
    }
}

impl From<String> for RecordFilter {
    fn from(name: String) -> Self {
        RecordFilter::Name(name)
    }
}

impl From<i64> for RecordFilter {
    fn from(id: i64) -> Self {
        RecordFilter::Name(id.to_string())
    }
}

impl From<i32> for RecordFilter {
    fn from(id: i32) -> Self {
        RecordFilter::Name(id.to_string())
    }
}

impl From<u64> for RecordFilter {
    fn from(id: u64) -> Self {
        RecordFilter::Name(id.to_string())
    }
}

impl From<Value> for RecordFilter {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RecordFilter::Filter(map),
            Value::String(s) => RecordFilter::Name(s),
            other => RecordFilter::Name(other.to_string()),
        }
    }
}
