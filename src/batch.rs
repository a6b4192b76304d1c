//! Chunking and whole-specification compilation.

use crate::error::{Result, UploadError};
use crate::models::{CompiledStatement, GraphSpecification, NodeGroup, Record, RelationshipGroup};
use crate::node_compiler::compile_nodes;
use crate::relationship_compiler::{compile_relationships, expand_list_endpoints};
use tracing::info;

/// One group of the specification, resolved once per group.
#[derive(Debug, Clone, Copy)]
pub enum GroupSpec<'a> {
    Nodes(&'a NodeGroup),
    Relationships(&'a RelationshipGroup),
}

/// Split `records` into contiguous chunks of at most `max_batch_size`.
pub fn chunk_records(records: &[Record], max_batch_size: usize) -> Result<Vec<&[Record]>> {
    if max_batch_size == 0 {
        return Err(UploadError::Configuration(
            "max_batch_size must be greater than zero".to_string(),
        ));
    }
    Ok(records.chunks(max_batch_size).collect())
}

/// Compile one group into one statement per chunk.
///
/// Relationship groups are list-expanded first, so a chunk always holds
/// records with scalar endpoints.
pub fn chunked_statements(group: GroupSpec<'_>, max_batch_size: usize) -> Result<Vec<CompiledStatement>> {
    let mut statements = Vec::new();

    match group {
        GroupSpec::Nodes(nodes) => {
            for (idx, chunk) in chunk_records(&nodes.records, max_batch_size)?.into_iter().enumerate() {
                let batch_id = format!("b{}n", idx);
                statements.extend(compile_nodes(
                    &batch_id,
                    chunk,
                    &nodes.key,
                    &nodes.labels,
                    &nodes.exclude_keys,
                    nodes.dedupe,
                ));
            }
        }
        GroupSpec::Relationships(relationships) => {
            let expanded = expand_list_endpoints(relationships)?;
            let exclude_keys = expanded.effective_exclude_keys();
            for (idx, chunk) in chunk_records(&expanded.records, max_batch_size)?.into_iter().enumerate() {
                let batch_id = format!("b{}r", idx);
                statements.extend(compile_relationships(
                    &batch_id,
                    chunk,
                    &expanded.from_node,
                    &expanded.to_node,
                    &expanded.rel_type,
                    &exclude_keys,
                    expanded.dedupe,
                ));
            }
        }
    }

    Ok(statements)
}

/// Compile a whole specification.
///
/// Every node group is compiled before any relationship group so that
/// relationships can MATCH the nodes created earlier in the same upload.
/// Within each kind, group order and chunk order are preserved.
pub fn compile(spec: &GraphSpecification, max_batch_size: usize) -> Result<Vec<CompiledStatement>> {
    let groups = spec
        .nodes
        .iter()
        .map(GroupSpec::Nodes)
        .chain(spec.relationships.iter().map(GroupSpec::Relationships));

    let mut statements = Vec::new();
    for group in groups {
        statements.extend(chunked_statements(group, max_batch_size)?);
    }

    info!(
        "🧱 Compiled {} statements from {} node groups and {} relationship groups (batch_size={})",
        statements.len(),
        spec.nodes.len(),
        spec.relationships.len(),
        max_batch_size
    );
    Ok(statements)
}
