//! Structural de-duplication of record batches.

use crate::models::Record;
use serde_json::Value;
use std::collections::HashSet;

/// Drop records that are structurally identical to an earlier record.
///
/// Order is preserved and the first occurrence wins. Equality is decided on a
/// canonical text form in which object keys are sorted at every depth, so
/// `{"a": {"x": 1, "y": 2}}` and `{"a": {"y": 2, "x": 1}}` are duplicates.
pub fn dedupe(records: &[Record]) -> Vec<Record> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut unique = Vec::with_capacity(records.len());

    for record in records {
        if seen.insert(canonical_record(record)) {
            unique.push(record.clone());
        }
    }

    unique
}

fn canonical_record(record: &Record) -> String {
    let mut out = String::new();
    write_object(record, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx != 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(map: &serde_json::Map<String, Value>, out: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (idx, (key, value)) in entries.into_iter().enumerate() {
        if idx != 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(value, out);
    }
    out.push('}');
}
