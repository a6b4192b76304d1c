//! Dotted key-path access into nested JSON records.
//!
//! A key path such as `person.address.city` or `friends.0.uid` walks objects
//! by key and arrays by integer index. Lookups never fail loudly: a path that
//! does not fit the data simply resolves to `None`.

use serde_json::{Map, Value};

const SEPARATOR: char = '.';

/// Resolve `path` inside `data`.
///
/// Returns `None` when a segment is missing, the container has the wrong
/// type, an index is not a number or out of range, or the value found is
/// JSON `null`.
pub fn resolve<'a>(path: &str, data: &'a Value) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = data;
    for segment in path.split(SEPARATOR) {
        current = step(current, segment)?;
    }

    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Resolve `path` against a record (a JSON object).
pub fn resolve_in<'a>(path: &str, record: &'a Map<String, Value>) -> Option<&'a Value> {
    let mut segments = path.split(SEPARATOR);
    let first = segments.next()?;
    let mut current = record.get(first)?;
    for segment in segments {
        current = step(current, segment)?;
    }

    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Return the prefix of `path` at which the walk first lands on an array.
///
/// `first_list_prefix("to.id", {"to": [{"id": 1}]})` is `Some("to")`.
pub fn first_list_prefix(path: &str, data: &Value) -> Option<String> {
    if path.is_empty() {
        return None;
    }

    let mut current = data;
    let mut walked: Vec<&str> = Vec::new();
    for segment in path.split(SEPARATOR) {
        current = step(current, segment)?;
        walked.push(segment);
        if current.is_array() {
            return Some(walked.join("."));
        }
    }

    None
}

pub fn contains_list(path: &str, data: &Value) -> bool {
    first_list_prefix(path, data).is_some()
}

/// Build a new value equal to `base` with `value` written at `path`.
///
/// Intermediate objects are created when missing; a non-object found along
/// the way is replaced by an object. Array segments with an in-range index
/// replace that element. `base` itself is left untouched.
pub fn with_value_at(base: &Value, path: &str, value: Value) -> Value {
    let segments: Vec<&str> = path.split(SEPARATOR).collect();
    build(base, &segments, value)
}

fn build(base: &Value, segments: &[&str], value: Value) -> Value {
    let Some((head, rest)) = segments.split_first() else {
        return value;
    };

    if let Value::Array(items) = base {
        if let Some(index) = parse_index(head).filter(|i| *i < items.len()) {
            let mut items = items.clone();
            let child = build(&items[index], rest, value);
            items[index] = child;
            return Value::Array(items);
        }
    }

    let mut object = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    let child = object.get(*head).cloned().unwrap_or(Value::Null);
    object.insert((*head).to_string(), build(&child, rest, value));
    Value::Object(object)
}

fn step<'a>(current: &'a Value, segment: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => parse_index(segment).and_then(|i| items.get(i)),
        _ => None,
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    segment.trim().parse::<usize>().ok()
}
