//! Topic filters
//!
//! A topic filter is a pure predicate over a published value. An absent
//! filter matches everything. The helpers in this module operate on
//! [`Value`] and answer `false` for values of an unexpected shape.

use std::sync::Arc;

use crate::value::{Value, ValueKind};

/// Shared predicate deciding whether a subscriber receives a value
pub type TopicFilter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Wrap a closure as a [`TopicFilter`]
pub fn filter<T, F>(f: F) -> TopicFilter<T>
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Match every value
pub fn all<T: 'static>() -> TopicFilter<T> {
    Arc::new(|_: &T| true)
}

/// Match text values containing `needle`
pub fn contains(needle: impl Into<String>) -> TopicFilter<Value> {
    let needle = needle.into();
    Arc::new(move |v: &Value| v.as_str().is_some_and(|s| s.contains(needle.as_str())))
}

/// Match text values starting with `prefix`
pub fn starts_with(prefix: impl Into<String>) -> TopicFilter<Value> {
    let prefix = prefix.into();
    Arc::new(move |v: &Value| v.as_str().is_some_and(|s| s.starts_with(prefix.as_str())))
}

/// Match values of the given kind
pub fn kind(kind: ValueKind) -> TopicFilter<Value> {
    Arc::new(move |v: &Value| v.kind() == kind)
}

/// Match JSON objects whose `field` equals `expected`
pub fn json_field_equals(
    field: impl Into<String>,
    expected: serde_json::Value,
) -> TopicFilter<Value> {
    let field = field.into();
    Arc::new(move |v: &Value| {
        v.as_json()
            .and_then(|json| json.get(field.as_str()))
            .is_some_and(|actual| *actual == expected)
    })
}
