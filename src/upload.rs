//! Statement execution and the top-level upload entry point.

use crate::backend::GraphBackend;
use crate::batch::compile;
use crate::config::Neo4jConfig;
use crate::error::{Result, UploadError};
use crate::models::{CompiledStatement, GraphSpecification, UploadResult};
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

pub const NO_DATA_MESSAGE: &str = "No data to process";

/// Runs compiled statements one after another against a backend.
pub struct Uploader<'a, B: GraphBackend> {
    backend: &'a B,
    database: String,
}

impl<'a, B: GraphBackend> Uploader<'a, B> {
    pub fn new(backend: &'a B, database: impl Into<String>) -> Self {
        Self {
            backend,
            database: database.into(),
        }
    }

    pub async fn run(&self, statements: &[CompiledStatement]) -> UploadResult {
        self.run_with_progress(statements, |_| {}).await
    }

    /// Execute every statement in order.
    ///
    /// A failing statement is recorded in the result and the rest still run.
    /// `on_progress` sees a snapshot after each statement.
    pub async fn run_with_progress<F>(&self, statements: &[CompiledStatement], mut on_progress: F) -> UploadResult
    where
        F: FnMut(&UploadResult),
    {
        let total = statements.len();
        let mut result = UploadResult::new(Utc::now(), total);

        info!("💾 Executing {} statements on database '{}'", total, self.database);

        for (idx, statement) in statements.iter().enumerate() {
            match self.backend.execute(statement, &self.database).await {
                Ok(counters) => {
                    result.add_counters(&counters);
                    info!(
                        "✅ Batch {}/{} done (+{} nodes, +{} relationships, {} properties)",
                        idx + 1,
                        total,
                        counters.nodes_created,
                        counters.relationships_created,
                        counters.properties_set
                    );
                }
                Err(e) => {
                    error!("❌ Batch {}/{} failed: {:#}", idx + 1, total, e);
                    result.push_error(&format!("Error processing batch {} of {}: {:#}", idx + 1, total, e));
                }
            }
            on_progress(&result);
        }

        result.finish(Utc::now());
        if result.was_successful {
            info!(
                "✅ Upload finished in {:.2}s: {} nodes, {} relationships, {} properties",
                result.seconds_to_complete.unwrap_or_default(),
                result.nodes_created,
                result.relationships_created,
                result.properties_set
            );
        } else {
            warn!(
                "⚠️  Upload finished with errors ({}/{} batches succeeded)",
                result.records_completed, total
            );
        }
        result
    }
}

/// Validate, compile and upload `data` in one call.
pub async fn batch_upload<B: GraphBackend>(config: &Neo4jConfig, data: Value, backend: &B) -> Result<UploadResult> {
    batch_upload_with_progress(config, data, backend, |_| {}).await
}

/// [`batch_upload`] with a callback invoked after each statement.
///
/// Order matters: credentials are checked before the database is contacted,
/// and the database is reachable before the payload is parsed or anything is
/// wiped. Nothing executes if any of these steps fail.
pub async fn batch_upload_with_progress<B, F>(
    config: &Neo4jConfig,
    data: Value,
    backend: &B,
    on_progress: F,
) -> Result<UploadResult>
where
    B: GraphBackend,
    F: FnMut(&UploadResult),
{
    config.validate()?;

    backend
        .verify_connectivity()
        .await
        .map_err(UploadError::Connectivity)?;

    let spec = GraphSpecification::from_value(data)?;

    if config.overwrite {
        warn!("🧹 Overwrite requested, resetting database '{}'", config.neo4j_database);
        backend
            .reset(&config.neo4j_database)
            .await
            .map_err(UploadError::Reset)?;
    }

    let statements = compile(&spec, config.max_batch_size)?;
    if statements.is_empty() {
        warn!("⚠️  {}", NO_DATA_MESSAGE);
        let now = Utc::now();
        let mut result = UploadResult::new(now, 0);
        result.push_error(NO_DATA_MESSAGE);
        result.finish(now);
        return Ok(result);
    }

    Ok(Uploader::new(backend, config.neo4j_database.clone())
        .run_with_progress(&statements, on_progress)
        .await)
}
