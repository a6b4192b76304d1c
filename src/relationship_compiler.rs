//! Batched relationship upserts and list-endpoint expansion.

use crate::dedupe::dedupe;
use crate::error::{Result, UploadError};
use crate::key_path::{first_list_prefix, resolve_in, with_value_at};
use crate::models::{CompiledStatement, Parameters, Record, RelationshipGroup, TargetNodeRef};
use crate::properties::{bindable, placeholder_name, quote_identifier, serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Compile one batch of relationship records into a single statement.
///
/// Each record must resolve a scalar value for both endpoint record keys;
/// records that don't are skipped with a warning. Returns `None` when no
/// record survives.
///
/// ```text
/// WITH [[$from_b0r0, $to_b0r0, {`since`:$since_b0r0}]] AS from_to_data
/// UNWIND from_to_data AS tuple
/// MATCH (fromNode:`Person` {`uid`:tuple[0]})
/// MATCH (toNode:`Person` {`uid`:tuple[1]})
/// MERGE (fromNode)-[r:`KNOWS`]->(toNode)
/// SET r += tuple[2]
/// ```
pub fn compile_relationships(
    batch_id: &str,
    records: &[Record],
    from_node: &TargetNodeRef,
    to_node: &TargetNodeRef,
    rel_type: &str,
    exclude_keys: &BTreeSet<String>,
    dedupe_records: bool,
) -> Option<CompiledStatement> {
    if records.is_empty() {
        return None;
    }

    let records: Cow<'_, [Record]> = if dedupe_records {
        Cow::Owned(dedupe(records))
    } else {
        Cow::Borrowed(records)
    };

    let mut elements = Vec::with_capacity(records.len());
    let mut parameters = Parameters::new();
    let mut property_bindings = 0;

    for (idx, record) in records.iter().enumerate() {
        let (Some(from_value), Some(to_value)) = (
            endpoint_value(record, &from_node.record_key),
            endpoint_value(record, &to_node.record_key),
        ) else {
            warn!(
                "⚠️  Skipping {} record {} in batch {}: could not resolve '{}' and '{}'",
                rel_type, idx, batch_id, from_node.record_key, to_node.record_key
            );
            continue;
        };

        let suffix = format!("{}{}", batch_id, idx);
        // An endpoint placeholder only meets a property placeholder for the
        // same flat key, and the flat key is what the endpoint resolved to.
        let from_placeholder = placeholder_name(&from_node.record_key, &suffix);
        let to_placeholder = placeholder_name(&to_node.record_key, &suffix);
        let fragment = serialize(&suffix, record, exclude_keys);

        property_bindings += fragment.len();
        elements.push(format!("[${}, ${},{}]", from_placeholder, to_placeholder, fragment.text));
        parameters.extend(fragment.params);
        parameters.insert(from_placeholder, from_value);
        parameters.insert(to_placeholder, to_value);
    }

    if elements.is_empty() {
        return None;
    }

    let write_verb = if dedupe_records { "MERGE" } else { "CREATE" };
    let text = format!(
        "WITH [{}] AS from_to_data\n\
         UNWIND from_to_data AS tuple\n\
         MATCH (fromNode{} {{{}:tuple[0]}})\n\
         MATCH (toNode{} {{{}:tuple[1]}})\n\
         {} (fromNode)-[r:{}]->(toNode)\n\
         SET r += tuple[2]",
        elements.join(", "),
        label_clause(from_node),
        quote_identifier(&from_node.node_key),
        label_clause(to_node),
        quote_identifier(&to_node.node_key),
        write_verb,
        quote_identifier(rel_type),
    );

    debug!("Compiled {} batch {} ({} records)", rel_type, batch_id, elements.len());

    Some(CompiledStatement {
        text,
        parameters,
        property_bindings,
    })
}

/// Value identifying an endpoint node, if it is a bindable scalar.
///
/// The whole record key is tried as a flat key first so keys that literally
/// contain dots still work; otherwise it is walked as a key path.
fn endpoint_value(record: &Record, record_key: &str) -> Option<Value> {
    let value = record
        .get(record_key)
        .filter(|v| !v.is_null())
        .or_else(|| resolve_in(record_key, record))?;

    match value {
        Value::Object(_) | Value::Array(_) => None,
        scalar => Some(bindable(scalar)),
    }
}

fn label_clause(target: &TargetNodeRef) -> String {
    match &target.node_label {
        Some(label) => format!(":{}", quote_identifier(label)),
        None => String::new(),
    }
}

// ============================================================================
// List-endpoint expansion
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    From,
    To,
}

/// Rewrite a group whose endpoint key path runs through a list.
///
/// A record such as `{"from": "a", "to": [{"id": "x"}, {"id": "y"}]}` with
/// `to_node.record_key = "to.id"` describes one relationship per list
/// element. The returned group holds one record per element, with the
/// endpoint record key shortened to the part after the list (`id`) and the
/// other endpoint's value copied into every element so it still resolves.
///
/// Detection looks at the first record only; later records whose value at the
/// list prefix is present but not a list are rejected. Groups without list
/// endpoints are returned unchanged.
pub fn expand_list_endpoints(group: &RelationshipGroup) -> Result<RelationshipGroup> {
    let Some(first) = group.records.first() else {
        return Ok(group.clone());
    };
    let first = Value::Object(first.clone());

    for endpoint in [Endpoint::To, Endpoint::From] {
        let target = target_of(group, endpoint);
        if let Some(prefix) = first_list_prefix(&target.record_key, &first) {
            let expanded = expand_endpoint(group, endpoint, &prefix)?;
            // Elements may hold further lists; the key path shrinks every round.
            return expand_list_endpoints(&expanded);
        }
    }

    Ok(group.clone())
}

fn expand_endpoint(group: &RelationshipGroup, endpoint: Endpoint, prefix: &str) -> Result<RelationshipGroup> {
    let target = target_of(group, endpoint);
    let other = target_of(group, endpoint.opposite());

    let new_record_key = target
        .record_key
        .strip_prefix(prefix)
        .map(|rest| rest.strip_prefix('.').unwrap_or(rest))
        .unwrap_or_default()
        .to_string();
    if new_record_key.is_empty() {
        return Err(UploadError::Configuration(format!(
            "{} record_key '{}' of relationship {} points at a list with nothing after '{}'",
            endpoint.field_name(),
            target.record_key,
            group.rel_type,
            prefix
        )));
    }

    let mut new_records = Vec::new();
    for (idx, record) in group.records.iter().enumerate() {
        let items = match resolve_in(prefix, record) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(UploadError::Configuration(format!(
                    "record {} of relationship {} has a non-list value at '{}' while the first record has a list",
                    idx, group.rel_type, prefix
                )));
            }
            None => {
                warn!("⚠️  Skipping {} record {}: nothing found at '{}'", group.rel_type, idx, prefix);
                continue;
            }
        };

        let carried = carried_endpoint(record, &other.record_key);
        for item in items {
            let mut element = item.clone();
            if let Some((path, value)) = &carried {
                element = with_value_at(&element, path, value.clone());
            }
            match element {
                Value::Object(map) => new_records.push(map),
                _ => warn!(
                    "⚠️  Skipping non-object element at '{}' in {} record {}",
                    prefix, group.rel_type, idx
                ),
            }
        }
    }

    info!(
        "🔀 Expanded {} {} list at '{}': {} records -> {} records",
        group.rel_type,
        endpoint.field_name(),
        prefix,
        group.records.len(),
        new_records.len()
    );

    let mut expanded = group.clone();
    expanded.records = new_records;
    let new_target = TargetNodeRef {
        record_key: new_record_key,
        ..target.clone()
    };
    match endpoint {
        Endpoint::From => expanded.from_node = new_target,
        Endpoint::To => expanded.to_node = new_target,
    }
    Ok(expanded)
}

/// What to copy into each expanded element so the opposite endpoint still
/// resolves: its scalar value at the full key path, or, when that path runs
/// through a list itself, the whole top-level field so a later expansion
/// round can split it.
fn carried_endpoint(record: &Record, record_key: &str) -> Option<(String, Value)> {
    if let Some(value) = endpoint_value(record, record_key) {
        return Some((record_key.to_string(), value));
    }

    let root = record_key.split('.').next()?;
    record.get(root).map(|value| (root.to_string(), value.clone()))
}

fn target_of(group: &RelationshipGroup, endpoint: Endpoint) -> &TargetNodeRef {
    match endpoint {
        Endpoint::From => &group.from_node,
        Endpoint::To => &group.to_node,
    }
}

impl Endpoint {
    fn opposite(self) -> Self {
        match self {
            Endpoint::From => Endpoint::To,
            Endpoint::To => Endpoint::From,
        }
    }

    fn field_name(self) -> &'static str {
        match self {
            Endpoint::From => "from_node",
            Endpoint::To => "to_node",
        }
    }
}
