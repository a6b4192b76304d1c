//! Startup connections with exponential backoff.

use anyhow::{anyhow, Result};
use std::fmt::Display;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Seconds to wait after failed `attempt` (1-based): 1, 2, 4, 8, ...
pub fn backoff_secs(attempt: u32) -> u64 {
    2u64.saturating_pow(attempt.saturating_sub(1))
}

/// Call `connect` up to `max_retries` times, sleeping `backoff_secs` between
/// failures. `service` and `target` only feed the log lines.
pub async fn connect_with_backoff<T, E, F, Fut>(
    service: &str,
    target: &str,
    max_retries: u32,
    mut connect: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    for attempt in 1..=max_retries {
        info!("🔄 Attempting to connect to {} at {}... (attempt {}/{})", service, target, attempt, max_retries);

        match connect().await {
            Ok(connection) => {
                info!("✅ Successfully connected to {}", service);
                return Ok(connection);
            }
            Err(e) if attempt < max_retries => {
                let wait_time = backoff_secs(attempt);
                warn!(
                    "⚠️  Failed to connect to {}: {:#}. Retrying in {}s (attempt {}/{})...",
                    service, e, wait_time, attempt, max_retries
                );
                sleep(Duration::from_secs(wait_time)).await;
            }
            Err(e) => {
                error!("❌ Failed to connect to {} after {} attempts: {:#}", service, max_retries, e);
                return Err(anyhow!("{} connection failed after {} retries: {:#}", service, max_retries, e));
            }
        }
    }

    Err(anyhow!("Failed to connect to {}: no attempts allowed", service))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_one_second() {
        let waits: Vec<u64> = (1..=4).map(backoff_secs).collect();

        assert_eq!(waits, vec![1, 2, 4, 8]);
        assert_eq!(backoff_secs(0), 1);
        assert_eq!(backoff_secs(100), u64::MAX);
    }

    #[tokio::test]
    async fn test_connect_returns_first_success() {
        let mut calls = 0;

        let value = connect_with_backoff("Test", "local", 3, || {
            calls += 1;
            async { Ok::<_, String>(7) }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_connect_retries_after_failure() {
        let mut calls = 0;

        let value = connect_with_backoff("Test", "local", 3, || {
            calls += 1;
            let attempt = calls;
            async move {
                if attempt < 2 {
                    Err("connection refused".to_string())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_connect_gives_up_with_last_error() {
        let err = connect_with_backoff("Redis", "redis://nowhere", 1, || async {
            Err::<(), _>("connection refused")
        })
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Redis connection failed after 1 retries: connection refused");
    }

    #[tokio::test]
    async fn test_connect_with_zero_retries_fails() {
        let result = connect_with_backoff("Neo4j", "bolt://nowhere", 0, || async { Ok::<_, String>(()) }).await;

        assert!(result.is_err());
    }
}
