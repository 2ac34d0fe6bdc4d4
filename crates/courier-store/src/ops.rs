//! Atomic field operations.
//!
//! These are evaluated by the store against its current copy of the
//! document, which makes them safe under concurrent independent writers.
//! Client-side read-modify-write of shared fields (unread counters,
//! reaction sets) is forbidden everywhere in the core; this module is the
//! enforcement point.

use serde_json::Value;

use courier_shared::time::Millis;

use crate::document::Fields;

/// Dot-separated path into a document's (possibly nested) field maps, e.g.
/// `unread.alice` or `reactions.👍`.
///
/// Segment keys must not contain `.`. Courier's identifier types guarantee
/// this for the id-keyed maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// A one-level nested path: `<root>.<key>`.
    pub fn nested(root: &str, key: &str) -> Self {
        Self(format!("{root}.{key}"))
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single server-evaluated mutation.
#[derive(Debug, Clone)]
pub enum FieldOp {
    Set(FieldPath, Value),
    /// Set the field to the store's own clock, in epoch millis. This is how
    /// creation timestamps are assigned by the store rather than the client.
    SetServerTime(FieldPath),
    /// Add to a numeric field, treating a missing field as zero.
    Increment(FieldPath, i64),
    /// Set-union: append the values not already present in the array field.
    Union(FieldPath, Vec<Value>),
    /// Set-difference: remove matching values from the array field.
    Difference(FieldPath, Vec<Value>),
    /// Remove the field entirely.
    Delete(FieldPath),
}

/// Apply one operation to a field map. `server_time` is the clock of the
/// store applying the op.
pub fn apply(fields: &mut Fields, op: &FieldOp, server_time: Millis) {
    match op {
        FieldOp::Set(path, value) => set_at(fields, path, value.clone()),
        FieldOp::SetServerTime(path) => set_at(fields, path, Value::from(server_time)),
        FieldOp::Increment(path, delta) => {
            let current = get_at(fields, path).and_then(Value::as_i64).unwrap_or(0);
            set_at(fields, path, Value::from(current + delta));
        }
        FieldOp::Union(path, values) => {
            let mut array = array_at(fields, path);
            for value in values {
                if !array.contains(value) {
                    array.push(value.clone());
                }
            }
            set_at(fields, path, Value::Array(array));
        }
        FieldOp::Difference(path, values) => {
            let mut array = array_at(fields, path);
            array.retain(|v| !values.contains(v));
            set_at(fields, path, Value::Array(array));
        }
        FieldOp::Delete(path) => delete_at(fields, path),
    }
}

/// Read the value at a dotted path, if present.
pub fn get_at<'a>(fields: &'a Fields, path: &FieldPath) -> Option<&'a Value> {
    let mut segments = path.segments();
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn array_at(fields: &Fields, path: &FieldPath) -> Vec<Value> {
    get_at(fields, path)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn set_at(fields: &mut Fields, path: &FieldPath, value: Value) {
    let segments: Vec<&str> = path.segments().collect();
    let mut current = fields;
    for segment in &segments[..segments.len() - 1] {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Fields::new()));
        if !entry.is_object() {
            *entry = Value::Object(Fields::new());
        }
        current = entry.as_object_mut().expect("intermediate is an object");
    }
    current.insert(segments[segments.len() - 1].to_string(), value);
}

fn delete_at(fields: &mut Fields, path: &FieldPath) {
    let segments: Vec<&str> = path.segments().collect();
    let mut current = fields;
    for segment in &segments[..segments.len() - 1] {
        match current.get_mut(*segment).and_then(Value::as_object_mut) {
            Some(map) => current = map,
            None => return,
        }
    }
    current.remove(segments[segments.len() - 1]);
}
