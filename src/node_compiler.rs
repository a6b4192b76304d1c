//! Batched node upserts.

use crate::dedupe::dedupe;
use crate::models::{CompiledStatement, Parameters, Record};
use crate::properties::{bindable, is_blank, placeholder_name, quote_identifier, serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Compile one batch of node records into a single statement.
///
/// Returns `None` when there is nothing to write. With `dedupe` the nodes are
/// MERGEd on `key`, making the statement idempotent; without it every record
/// is CREATEd, so replaying the statement duplicates the nodes.
///
/// ```text
/// WITH [[$uid_b0n0, {`name`:$name_b0n0, `uid`:$uid_b0n0}]] AS node_data
/// UNWIND node_data AS node
/// MERGE (n:`Person` {`uid`:node[0]})
/// SET n += node[1]
/// ```
pub fn compile_nodes(
    batch_id: &str,
    records: &[Record],
    key: &str,
    labels: &[String],
    exclude_keys: &BTreeSet<String>,
    dedupe_records: bool,
) -> Option<CompiledStatement> {
    let primary_label = labels.first()?;
    if records.is_empty() {
        return None;
    }

    let records: Cow<'_, [Record]> = if dedupe_records {
        Cow::Owned(dedupe(records))
    } else {
        Cow::Borrowed(records)
    };

    // CREATE has no identity match, so the key must travel in the payload.
    let exclude_keys: Cow<'_, BTreeSet<String>> = if !dedupe_records && exclude_keys.contains(key) {
        let mut keys = exclude_keys.clone();
        keys.remove(key);
        Cow::Owned(keys)
    } else {
        Cow::Borrowed(exclude_keys)
    };

    let mut elements = Vec::with_capacity(records.len());
    let mut parameters = Parameters::new();
    let mut property_bindings = 0;

    for (idx, record) in records.iter().enumerate() {
        let key_value = match record.get(key) {
            Some(value) if !is_blank(value) => value,
            _ => {
                warn!("⚠️  Skipping node record {} in batch {}: no value for key '{}'", idx, batch_id, key);
                continue;
            }
        };

        let suffix = format!("{}{}", batch_id, idx);
        let fragment = serialize(&suffix, record, &exclude_keys);
        // Shares the key property's placeholder, which binds the same value.
        let key_placeholder = placeholder_name(key, &suffix);

        property_bindings += fragment.len();
        elements.push(format!("[${},{}]", key_placeholder, fragment.text));
        parameters.extend(fragment.params);
        parameters.insert(key_placeholder, bindable(key_value));
    }

    if elements.is_empty() {
        return None;
    }

    let label = quote_identifier(primary_label);
    let write_clause = if dedupe_records {
        format!("MERGE (n:{} {{{}:node[0]}})", label, quote_identifier(key))
    } else {
        format!("CREATE (n:{})", label)
    };

    let mut text = format!(
        "WITH [{}] AS node_data\nUNWIND node_data AS node\n{}\nSET n += node[1]",
        elements.join(", "),
        write_clause
    );
    for extra in &labels[1..] {
        text.push_str(&format!("\nSET n:{}", quote_identifier(extra)));
    }

    debug!("Compiled node batch {} ({} records, {} parameters)", batch_id, elements.len(), parameters.len());

    Some(CompiledStatement {
        text,
        parameters,
        property_bindings,
    })
}
