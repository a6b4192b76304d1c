//! Property map rendering with parameter binding.
//!
//! Values never appear in statement text. Each property becomes a
//! `` `name`:$placeholder `` pair and the value is returned in the parameter
//! map under the same placeholder.

use crate::models::{Parameters, Record};
use serde_json::Value;
use std::collections::BTreeSet;

/// String values treated as "no value" (compared case-insensitively).
const SENTINELS: [&str; 3] = ["none", "null", "empty"];

/// A rendered property block and the parameters it references.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyFragment {
    /// Text such as `` {`age`:$age_b0n0, `name`:$name_b0n0}`` (leading space).
    pub text: String,
    pub params: Parameters,
}

impl PropertyFragment {
    /// Number of properties this fragment assigns.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Render `record` as a parameterized property block.
///
/// Keys are emitted in sorted order. Entries are skipped when excluded, null,
/// an empty string, or one of the sentinel strings. Nested objects and arrays
/// are bound as their JSON text since graph properties cannot hold maps.
pub fn serialize(suffix: &str, record: &Record, exclude: &BTreeSet<String>) -> PropertyFragment {
    let mut keys: Vec<&String> = record.keys().filter(|k| !exclude.contains(*k)).collect();
    keys.sort();

    let mut pairs = Vec::with_capacity(keys.len());
    let mut params = Parameters::new();
    for key in keys {
        let value = &record[key];
        if is_blank(value) {
            continue;
        }

        let placeholder = placeholder_name(key, suffix);
        pairs.push(format!("{}:${}", quote_identifier(key), placeholder));
        params.insert(placeholder, bindable(value));
    }

    PropertyFragment {
        text: format!(" {{{}}}", pairs.join(", ")),
        params,
    }
}

/// True for values that must not be written as properties.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty() || SENTINELS.iter().any(|x| s.eq_ignore_ascii_case(x)),
        _ => false,
    }
}

/// Convert a value into something a driver can bind as a property.
pub fn bindable(value: &Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => Value::String(value.to_string()),
        other => other.clone(),
    }
}

/// Wrap an identifier (label, relationship type, property key) in backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Build the placeholder for `key` within the record identified by `suffix`.
///
/// Placeholder names may only use `[A-Za-z0-9_]`. The encoding is injective so
/// distinct keys never share a placeholder: `_` becomes `__` and any other
/// character becomes `_x{hex code point}_`. Suffixes are alphanumeric, so the
/// last `_` always separates the encoded key from the suffix.
pub fn placeholder_name(key: &str, suffix: &str) -> String {
    let mut name = String::with_capacity(key.len() + suffix.len() + 1);
    for c in key.chars() {
        match c {
            '_' => name.push_str("__"),
            c if c.is_ascii_alphanumeric() => name.push(c),
            c => name.push_str(&format!("_x{:x}_", c as u32)),
        }
    }
    name.push('_');
    name.push_str(suffix);
    name
}
