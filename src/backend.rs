//! Seam between statement execution and the graph database.

use crate::models::{CompiledStatement, Counters};
use anyhow::Result;

/// A graph database that can run compiled statements.
///
/// Implementations are used from a single task; statements are never issued
/// concurrently.
#[allow(async_fn_in_trait)]
pub trait GraphBackend {
    /// Cheap round trip proving the database is reachable with these credentials.
    async fn verify_connectivity(&self) -> Result<()>;

    /// Run one statement on `database` and report what it wrote.
    async fn execute(&self, statement: &CompiledStatement, database: &str) -> Result<Counters>;

    /// Drop every constraint and delete every node and relationship.
    async fn reset(&self, database: &str) -> Result<()>;
}
