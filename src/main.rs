use anyhow::{Context, Result};
use graph_uploader::api_client::ApiClient;
use graph_uploader::config::WorkerConfig;
use graph_uploader::neo4j_storage::Neo4jBackend;
use graph_uploader::retry::connect_with_backoff;
use graph_uploader::worker::{process_job, ProgressReporter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

const MAX_CONNECT_RETRIES: u32 = 4;

/// Open a Redis client and check it hands out a connection.
async fn open_redis(url: &str) -> Result<redis::aio::Connection> {
    let client = redis::Client::open(url).context("Failed to create Redis client")?;
    client
        .get_async_connection()
        .await
        .context("Failed to connect to Redis")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Upload Worker starting...");

    let config = WorkerConfig::from_env()?;
    let (reporter, reporter_task) = ProgressReporter::spawn(ApiClient::new(config.api_gateway_url.clone()));

    let mut redis_conn = connect_with_backoff("Redis", &config.redis_url, MAX_CONNECT_RETRIES, || {
        open_redis(&config.redis_url)
    })
    .await?;

    let backend = Neo4jBackend::connect_with_retry(&config.neo4j, MAX_CONNECT_RETRIES).await?;
    info!("✅ Using Neo4j database '{}'", backend.database());

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Shutdown signal received, finishing current upload...");
                shutdown_clone.store(true, Ordering::SeqCst);
            }
            Err(err) => {
                error!("Failed to listen for shutdown signal: {}", err);
            }
        }
    });

    info!("👂 Listening for uploads on {}...", config.upload_queue);
    while !shutdown.load(Ordering::SeqCst) {
        match process_job(&mut redis_conn, &config.upload_queue, &config.neo4j, &backend, &reporter).await {
            Ok(true) => {}
            Ok(false) => sleep(Duration::from_secs(2)).await,
            Err(e) => {
                error!("Error processing upload job: {:?}", e);
                sleep(Duration::from_secs(5)).await;
            }
        }
    }

    // Let queued status updates reach the gateway before exiting.
    drop(reporter);
    if let Err(e) = reporter_task.await {
        warn!("Status reporter ended abnormally: {}", e);
    }

    info!("👋 Upload Worker shutdown complete");
    Ok(())
}
