use thiserror::Error;

/// Errors that abort an upload before (or instead of) executing statements.
///
/// Failures of individual statements are not represented here; they are
/// folded into [`crate::models::UploadResult`] so partial uploads still report
/// what succeeded.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connectivity check failed: {0:#}")]
    Connectivity(#[source] anyhow::Error),

    #[error("database reset failed: {0:#}")]
    Reset(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, UploadError>;
