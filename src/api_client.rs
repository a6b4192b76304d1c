//! Upload status reporting to the API gateway.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct JobUpdatePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<UploadStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobUpdatePayload {
    pub fn processing(progress: i32) -> Self {
        Self {
            status: Some(UploadStatus::Processing),
            progress: Some(progress),
            result_summary: None,
            error: None,
        }
    }

    pub fn completed(result_summary: serde_json::Value) -> Self {
        Self {
            status: Some(UploadStatus::Completed),
            progress: Some(100),
            result_summary: Some(result_summary),
            error: None,
        }
    }

    /// `result_summary` carries the partial result when statements ran.
    pub fn failed(error: String, result_summary: Option<serde_json::Value>) -> Self {
        Self {
            status: Some(UploadStatus::Failed),
            progress: None,
            result_summary,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn update_upload(&self, job_id: &str, payload: &JobUpdatePayload) -> Result<()> {
        let url = format!("{}/api/v1/uploads/{}", self.base_url, job_id);

        let response = self
            .client
            .patch(&url)
            .json(payload)
            .send()
            .await
            .context("Failed to send update request")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Failed to update upload status: {}", error_text);
            return Err(anyhow::anyhow!("API Error: {}", error_text));
        }

        info!(
            "📊 Updated upload {} (status={:?}, progress={:?})",
            job_id, payload.status, payload.progress
        );

        Ok(())
    }
}
