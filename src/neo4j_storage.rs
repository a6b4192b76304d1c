//! Neo4j backend
//!
//! Runs compiled statements over Bolt, one transaction per statement, and
//! implements the database reset used by overwrite uploads.

use crate::backend::GraphBackend;
use crate::config::Neo4jConfig;
use crate::models::{CompiledStatement, Counters, Parameters};
use crate::properties::quote_identifier;
use crate::retry::connect_with_backoff;
use anyhow::{anyhow, Context, Result};
use neo4rs::{query, BoltNull, BoltType, Graph, Query, Row, RowStream, Txn};
use serde_json::Value;
use tracing::{debug, info, warn};

// ============================================================================
// Queries
// ============================================================================

/// Nodes deleted per pass when wiping a database.
pub const RESET_DELETE_BATCH: usize = 50_000;

// Single-pattern counts are answered from the count store.
const NODE_COUNT_QUERY: &str = "MATCH (n) RETURN count(n) AS nodes";
const RELATIONSHIP_COUNT_QUERY: &str = "MATCH ()-[r]->() RETURN count(r) AS relationships";

const SHOW_CONSTRAINTS_QUERY: &str = "SHOW CONSTRAINTS YIELD name";

fn delete_batch_query() -> String {
    format!(
        "MATCH (n) WITH n LIMIT {} DETACH DELETE n RETURN count(n) AS deleted",
        RESET_DELETE_BATCH
    )
}

fn drop_constraint_query(name: &str) -> String {
    format!("DROP CONSTRAINT {} IF EXISTS", quote_identifier(name))
}

// ============================================================================
// Parameter conversion
// ============================================================================

fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        Value::String(s) => s.clone().into(),
        // Nested values are stringified before they get here; keep it total anyway.
        other => other.to_string().into(),
    }
}

fn build_query(text: &str, parameters: &Parameters) -> Query {
    parameters
        .iter()
        .fold(query(text), |q, (name, value)| q.param(name, to_bolt(value)))
}

// ============================================================================
// Backend
// ============================================================================

pub struct Neo4jBackend {
    graph: Graph,
    database: String,
}

impl Neo4jBackend {
    pub fn new(graph: Graph, database: impl Into<String>) -> Self {
        Self {
            graph,
            database: database.into(),
        }
    }

    /// Connect with exponential backoff (1s, 2s, 4s, ...) between attempts.
    pub async fn connect_with_retry(config: &Neo4jConfig, max_retries: u32) -> Result<Self> {
        let (uri, user, password) = config.creds();
        let graph = connect_with_backoff("Neo4j", uri, max_retries, || Graph::new(uri, user, password)).await?;
        Ok(Self::new(graph, config.neo4j_database.clone()))
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    async fn start_txn(&self, database: &str) -> Result<Txn> {
        self.graph
            .start_txn_on(database)
            .await
            .with_context(|| format!("Failed to start transaction on '{}'", database))
    }

    async fn execute_in(&self, txn: &mut Txn, statement: &CompiledStatement) -> Result<Counters> {
        let (nodes_before, relationships_before) = graph_counts(txn).await?;

        txn.run(build_query(&statement.text, &statement.parameters))
            .await
            .context("Failed to run statement")?;

        let (nodes_after, relationships_after) = graph_counts(txn).await?;

        // Statements only ever add, so the deltas are creations.
        Ok(Counters {
            nodes_created: (nodes_after - nodes_before).max(0) as u64,
            relationships_created: (relationships_after - relationships_before).max(0) as u64,
            properties_set: statement.property_bindings as u64,
        })
    }

    async fn drop_constraints(&self, database: &str) -> Result<usize> {
        let mut stream = self
            .graph
            .execute_on(database, query(SHOW_CONSTRAINTS_QUERY))
            .await
            .context("Failed to list constraints")?;

        let mut names = Vec::new();
        while let Some(row) = stream.next().await.context("Failed to read constraints")? {
            names.push(row.get::<String>("name").context("Constraint row without a name")?);
        }

        for name in &names {
            self.graph
                .run_on(database, query(&drop_constraint_query(name)))
                .await
                .with_context(|| format!("Failed to drop constraint {}", name))?;
            debug!("Dropped constraint {}", name);
        }

        Ok(names.len())
    }

    async fn delete_all_nodes(&self, database: &str) -> Result<u64> {
        let delete = delete_batch_query();
        let mut total = 0u64;

        loop {
            let mut stream = self
                .graph
                .execute_on(database, query(&delete))
                .await
                .context("Failed to delete nodes")?;

            let deleted = match stream.next().await.context("Failed to read delete count")? {
                Some(row) => row.get::<i64>("deleted").context("Delete row without a count")?,
                None => 0,
            };
            if deleted <= 0 {
                break;
            }

            total += deleted as u64;
            info!("   Deleted {} nodes ({} so far)", deleted, total);
        }

        Ok(total)
    }
}

async fn collect_rows(txn: &mut Txn, mut stream: RowStream) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = stream.next(&mut *txn).await? {
        rows.push(row);
    }
    Ok(rows)
}

async fn count_in(txn: &mut Txn, text: &str, column: &str) -> Result<i64> {
    let stream = txn
        .execute(query(text))
        .await
        .with_context(|| format!("Failed to count {}", column))?;
    let rows = collect_rows(txn, stream).await?;
    let row = rows
        .first()
        .ok_or_else(|| anyhow!("Count query for {} returned no rows", column))?;

    Ok(row.get::<i64>(column)?)
}

async fn graph_counts(txn: &mut Txn) -> Result<(i64, i64)> {
    let nodes = count_in(txn, NODE_COUNT_QUERY, "nodes").await?;
    let relationships = count_in(txn, RELATIONSHIP_COUNT_QUERY, "relationships").await?;
    Ok((nodes, relationships))
}

impl GraphBackend for Neo4jBackend {
    async fn verify_connectivity(&self) -> Result<()> {
        self.graph
            .run_on(&self.database, query("RETURN 1"))
            .await
            .with_context(|| format!("Failed to reach Neo4j database '{}'", self.database))
    }

    async fn execute(&self, statement: &CompiledStatement, database: &str) -> Result<Counters> {
        let mut txn = self.start_txn(database).await?;

        match self.execute_in(&mut txn, statement).await {
            Ok(counters) => {
                txn.commit().await.context("Failed to commit transaction")?;
                Ok(counters)
            }
            Err(e) => {
                warn!("❌ Statement failed, rolling back: {:#}", e);
                txn.rollback().await.context("Failed to rollback transaction")?;
                Err(e)
            }
        }
    }

    async fn reset(&self, database: &str) -> Result<()> {
        info!("🧹 Resetting database '{}'", database);

        let constraints = self.drop_constraints(database).await?;
        let nodes = self.delete_all_nodes(database).await?;

        info!("✅ Reset complete: dropped {} constraints, deleted {} nodes", constraints, nodes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_drop_constraint_query_quotes_name() {
        assert_eq!(drop_constraint_query("person_uid"), "DROP CONSTRAINT `person_uid` IF EXISTS");
        assert_eq!(drop_constraint_query("odd`name"), "DROP CONSTRAINT `odd``name` IF EXISTS");
    }

    #[test]
    fn test_count_queries_use_single_pattern() {
        assert_eq!(NODE_COUNT_QUERY, "MATCH (n) RETURN count(n) AS nodes");
        assert_eq!(RELATIONSHIP_COUNT_QUERY, "MATCH ()-[r]->() RETURN count(r) AS relationships");
        for q in [NODE_COUNT_QUERY, RELATIONSHIP_COUNT_QUERY] {
            assert!(!q.contains("WITH"));
            assert!(!q.contains("OPTIONAL"));
        }
    }

    #[test]
    fn test_delete_batch_query_is_bounded() {
        let q = delete_batch_query();

        assert!(q.contains("LIMIT 50000"));
        assert!(q.contains("DETACH DELETE n"));
        assert!(q.ends_with("AS deleted"));
    }

    #[test]
    fn test_to_bolt_scalars() {
        assert_eq!(to_bolt(&json!("abc")), BoltType::from("abc".to_string()));
        assert_eq!(to_bolt(&json!(42)), BoltType::from(42i64));
        assert_eq!(to_bolt(&json!(1.5)), BoltType::from(1.5f64));
        assert_eq!(to_bolt(&json!(true)), BoltType::from(true));
        assert_eq!(to_bolt(&Value::Null), BoltType::Null(BoltNull));
    }

    #[test]
    fn test_to_bolt_large_unsigned_falls_back_to_float() {
        let big = json!(u64::MAX);

        assert_eq!(to_bolt(&big), BoltType::from(u64::MAX as f64));
    }
}
