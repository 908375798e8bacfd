//! Assertions for participant test suites.

use serde_json::Value;

use crate::workitem::Workitem;

/// Assert that `name` is set in the workitem's fields to `expected`.
#[track_caller]
pub fn assert_field(workitem: &Workitem, name: &str, expected: impl Into<Value>) {
    let expected = expected.into();
    match workitem.get_field(name) {
        Some(actual) if *actual == expected => {}
        Some(actual) => panic!(
            "expected field '{name}' to be {expected}, but it was {actual}\nfields: {}",
            Value::Object(workitem.fields.clone())
        ),
        None => panic!(
            "expected field '{name}' to be {expected}, but it was not set\nfields: {}",
            Value::Object(workitem.fields.clone())
        ),
    }
}

/// Assert that `name` is absent from the workitem's fields.
#[track_caller]
pub fn assert_no_field(workitem: &Workitem, name: &str) {
    if let Some(actual) = workitem.get_field(name) {
        panic!("expected field '{name}' not to be set, but it was {actual}");
    }
}
