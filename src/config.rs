//! Connection and batching configuration.

use crate::error::{Result, UploadError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_DATABASE: &str = "neo4j";
pub const DEFAULT_USER: &str = "neo4j";

fn default_user() -> String {
    DEFAULT_USER.to_string()
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Target database and upload settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Neo4jConfig {
    pub neo4j_uri: String,
    pub neo4j_password: String,
    #[serde(default = "default_user")]
    pub neo4j_user: String,
    #[serde(default = "default_database")]
    pub neo4j_database: String,
    /// Maximum records compiled into one statement.
    #[serde(default = "default_batch_size")]
    pub max_batch_size: usize,
    /// Wipe the database (constraints, nodes, relationships) before uploading.
    #[serde(default)]
    pub overwrite: bool,
}

impl Neo4jConfig {
    pub fn new(uri: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            neo4j_uri: uri.into(),
            neo4j_password: password.into(),
            neo4j_user: user.into(),
            neo4j_database: default_database(),
            max_batch_size: DEFAULT_BATCH_SIZE,
            overwrite: false,
        }
    }

    /// Parse and validate a loosely typed JSON config.
    pub fn from_value(value: Value) -> Result<Self> {
        let config: Neo4jConfig = serde_json::from_value(value)
            .map_err(|e| UploadError::InvalidCredentials(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.neo4j_uri.trim().is_empty() {
            return Err(UploadError::InvalidCredentials("neo4j_uri is empty".to_string()));
        }
        if self.neo4j_user.trim().is_empty() {
            return Err(UploadError::InvalidCredentials("neo4j_user is empty".to_string()));
        }
        if self.neo4j_database.trim().is_empty() {
            return Err(UploadError::InvalidCredentials("neo4j_database is empty".to_string()));
        }
        if self.max_batch_size == 0 {
            return Err(UploadError::InvalidCredentials(
                "max_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// (uri, user, password)
    pub fn creds(&self) -> (&str, &str, &str) {
        (&self.neo4j_uri, &self.neo4j_user, &self.neo4j_password)
    }
}

/// Process-level settings for the upload worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub upload_queue: String,
    pub api_gateway_url: String,
    pub neo4j: Neo4jConfig,
}

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let max_batch_size = match env::var("MAX_BATCH_SIZE") {
            Ok(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("MAX_BATCH_SIZE is not a number: {}", raw))?,
            Err(_) => DEFAULT_BATCH_SIZE,
        };

        let neo4j = Neo4jConfig {
            neo4j_uri: env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".to_string()),
            neo4j_user: env::var("NEO4J_USER").unwrap_or_else(|_| DEFAULT_USER.to_string()),
            neo4j_password: env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "password".to_string()),
            neo4j_database: env::var("NEO4J_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string()),
            max_batch_size,
            overwrite: false,
        };
        neo4j.validate().context("Invalid Neo4j configuration")?;

        Ok(WorkerConfig {
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            upload_queue: env::var("UPLOAD_QUEUE").unwrap_or_else(|_| "upload_queue".to_string()),
            api_gateway_url: env::var("API_GATEWAY_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            neo4j,
        })
    }
}
