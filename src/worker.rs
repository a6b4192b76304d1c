//! Queue-driven upload jobs.
//!
//! Jobs arrive as JSON on a Redis list. Each job is uploaded with the worker's
//! Neo4j settings, optionally overridden per job, and its progress is
//! reported to the API gateway.

use crate::api_client::{ApiClient, JobUpdatePayload};
use crate::backend::GraphBackend;
use crate::config::Neo4jConfig;
use crate::models::UploadResult;
use crate::upload::batch_upload_with_progress;
use anyhow::{Context, Result};
use redis::AsyncCommands;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadOptions {
    pub database: Option<String>,
    pub max_batch_size: Option<usize>,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadJob {
    pub job_id: String,
    /// Graph specification payload (`nodes` / `relationships`).
    pub data: Value,
    #[serde(default)]
    pub options: UploadOptions,
}

impl UploadJob {
    /// Worker settings with this job's overrides applied.
    pub fn config(&self, base: &Neo4jConfig) -> Neo4jConfig {
        let mut config = base.clone();
        if let Some(database) = &self.options.database {
            config.neo4j_database = database.clone();
        }
        if let Some(size) = self.options.max_batch_size {
            config.max_batch_size = size;
        }
        config.overwrite = self.options.overwrite;
        config
    }
}

// ============================================================================
// Progress reporting
// ============================================================================

pub type StatusUpdate = (String, JobUpdatePayload);

/// Sends status updates to a background task so uploads never wait on HTTP.
///
/// Updates are delivered in the order they were sent.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<StatusUpdate>) -> Self {
        Self { tx }
    }

    /// Spawn the forwarding task. It exits once every reporter is dropped.
    pub fn spawn(api_client: ApiClient) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<StatusUpdate>();

        let handle = tokio::spawn(async move {
            while let Some((job_id, payload)) = rx.recv().await {
                if let Err(e) = api_client.update_upload(&job_id, &payload).await {
                    error!("Failed to report status for upload {}: {:?}", job_id, e);
                }
            }
        });

        (Self::new(tx), handle)
    }

    pub fn send(&self, job_id: &str, payload: JobUpdatePayload) {
        if self.tx.send((job_id.to_string(), payload)).is_err() {
            warn!("⚠️  Status reporter stopped, dropping update for upload {}", job_id);
        }
    }
}

fn percent(result: &UploadResult) -> i32 {
    (result.float_completed() * 100.0).round() as i32
}

// ============================================================================
// Job handling
// ============================================================================

/// Pop the next job, if any.
pub async fn pop_job(redis_conn: &mut redis::aio::Connection, queue: &str) -> Result<Option<UploadJob>> {
    // RPOP instead of BRPOP: old Redis servers reject the float timeout the crate sends.
    let raw: Option<String> = redis_conn
        .rpop(queue, None)
        .await
        .context("Failed to pop from Redis queue")?;

    match raw {
        Some(job_json) => {
            let job = serde_json::from_str(&job_json).context("Failed to deserialize upload job")?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

/// Run one job to completion and report its outcome.
///
/// Returns the upload result when the upload got as far as executing.
pub async fn handle_job<B: GraphBackend>(
    job: &UploadJob,
    base_config: &Neo4jConfig,
    backend: &B,
    reporter: &ProgressReporter,
) -> Option<UploadResult> {
    info!("📝 Processing upload job: {}", job.job_id);
    reporter.send(&job.job_id, JobUpdatePayload::processing(0));

    let config = job.config(base_config);
    let mut last_percent = 0;
    let outcome = batch_upload_with_progress(&config, job.data.clone(), backend, |snapshot| {
        let current = percent(snapshot);
        if current != last_percent {
            last_percent = current;
            reporter.send(&job.job_id, JobUpdatePayload::processing(current));
        }
    })
    .await;

    match outcome {
        Ok(result) => {
            let summary = serde_json::to_value(&result).unwrap_or(Value::Null);
            if result.was_successful {
                info!("✅ Successfully processed upload job: {}", job.job_id);
                reporter.send(&job.job_id, JobUpdatePayload::completed(summary));
            } else {
                warn!("⚠️  Upload job {} finished with errors", job.job_id);
                reporter.send(
                    &job.job_id,
                    JobUpdatePayload::failed(result.error_message.clone(), Some(summary)),
                );
            }
            Some(result)
        }
        Err(e) => {
            error!("❌ Failed to process upload job {}: {}", job.job_id, e);
            reporter.send(&job.job_id, JobUpdatePayload::failed(e.to_string(), None));
            None
        }
    }
}

/// Pop and handle one job. Returns `false` when the queue was empty.
pub async fn process_job<B: GraphBackend>(
    redis_conn: &mut redis::aio::Connection,
    queue: &str,
    base_config: &Neo4jConfig,
    backend: &B,
    reporter: &ProgressReporter,
) -> Result<bool> {
    match pop_job(redis_conn, queue).await? {
        Some(job) => {
            handle_job(&job, base_config, backend, reporter).await;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::UploadStatus;
    use crate::test_support::MemoryGraph;
    use serde_json::json;

    fn base_config() -> Neo4jConfig {
        Neo4jConfig::new("bolt://localhost:7687", "neo4j", "password")
    }

    fn job(data: Value) -> UploadJob {
        UploadJob {
            job_id: "job-1".to_string(),
            data,
            options: UploadOptions::default(),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StatusUpdate>) -> Vec<JobUpdatePayload> {
        let mut updates = Vec::new();
        while let Ok((job_id, payload)) = rx.try_recv() {
            assert_eq!(job_id, "job-1");
            updates.push(payload);
        }
        updates
    }

    #[test]
    fn test_upload_job_deserialization() {
        let job: UploadJob = serde_json::from_value(json!({
            "job_id": "abc",
            "data": {"nodes": []},
            "options": {"database": "movies", "max_batch_size": 10, "overwrite": true}
        }))
        .unwrap();

        let config = job.config(&base_config());

        assert_eq!(config.neo4j_database, "movies");
        assert_eq!(config.max_batch_size, 10);
        assert!(config.overwrite);
    }

    #[test]
    fn test_upload_job_without_options_keeps_worker_settings() {
        let job: UploadJob = serde_json::from_value(json!({"job_id": "abc", "data": {}})).unwrap();

        assert_eq!(job.config(&base_config()), base_config());
    }

    #[tokio::test]
    async fn test_handle_job_reports_progress_then_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(tx);
        let graph = MemoryGraph::new();
        let mut job = job(json!({
            "nodes": [{"labels": ["Person"], "key": "uid", "records": [{"uid": "a"}, {"uid": "b"}]}]
        }));
        job.options.max_batch_size = Some(1);

        let result = handle_job(&job, &base_config(), &graph, &reporter).await.unwrap();

        assert!(result.was_successful);
        let updates = drain(&mut rx);
        let progress: Vec<Option<i32>> = updates.iter().map(|u| u.progress).collect();
        assert_eq!(progress, vec![Some(0), Some(50), Some(100), Some(100)]);
        assert_eq!(updates[0].status, Some(UploadStatus::Processing));
        let last = updates.last().unwrap();
        assert_eq!(last.status, Some(UploadStatus::Completed));
        assert_eq!(last.result_summary.as_ref().unwrap()["nodes_created"], json!(2));
    }

    #[tokio::test]
    async fn test_handle_job_reports_failure_for_bad_payload() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(tx);
        let graph = MemoryGraph::new();

        let result = handle_job(&job(json!({"vertices": []})), &base_config(), &graph, &reporter).await;

        assert!(result.is_none());
        let updates = drain(&mut rx);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].status, Some(UploadStatus::Failed));
        assert!(updates[1].error.as_ref().unwrap().starts_with("invalid payload"));
    }

    #[tokio::test]
    async fn test_handle_job_reports_partial_failure_with_summary() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(tx);
        let graph = MemoryGraph::failing_on("`Broken`");
        let data = json!({
            "nodes": [
                {"labels": ["Broken"], "key": "id", "records": [{"id": 1}]},
                {"labels": ["Fine"], "key": "id", "records": [{"id": 2}]}
            ]
        });

        let result = handle_job(&job(data), &base_config(), &graph, &reporter).await.unwrap();

        assert!(!result.was_successful);
        let last = drain(&mut rx).pop().unwrap();
        assert_eq!(last.status, Some(UploadStatus::Failed));
        assert!(last.error.unwrap().starts_with("Error processing batch 1 of 2"));
        assert_eq!(last.result_summary.unwrap()["records_completed"], json!(1));
    }

    #[tokio::test]
    async fn test_reporter_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        ProgressReporter::new(tx).send("job-1", JobUpdatePayload::processing(5));
    }

    #[test]
    fn test_percent_rounds_fraction() {
        let mut result = UploadResult::new(chrono::Utc::now(), 3);
        result.records_completed = 2;

        assert_eq!(percent(&result), 67);
    }
}
