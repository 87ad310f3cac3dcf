//! Worker error types.

use thiserror::Error;

use movan_media::MediaError;
use movan_models::ModelError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The recording cannot be opened or a frame fails to decode.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The heatmap video cannot be produced.
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The session vanished while it was being processed.
    #[error("Session cancelled")]
    Cancelled,

    /// Another worker holds the session lock.
    #[error("Session locked: {0}")]
    Locked(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Job state error: {0}")]
    Model(#[from] ModelError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job failed: {0}")]
    JobFailed(String),
}

impl WorkerError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn locked(msg: impl Into<String>) -> Self {
        Self::Locked(msg.into())
    }

    pub fn invalid_session(msg: impl Into<String>) -> Self {
        Self::InvalidSession(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    /// Benign abort: nothing is written back to the session.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }

    /// Short category label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Decode(_) => "decode",
            WorkerError::Encode(_) => "encode",
            WorkerError::Io(_) => "io",
            WorkerError::Cancelled => "cancelled",
            WorkerError::Locked(_) => "locked",
            WorkerError::InvalidSession(_) => "invalid_session",
            WorkerError::Model(_) => "state",
            WorkerError::Json(_) => "json",
            WorkerError::ConfigError(_) => "config",
            WorkerError::JobFailed(_) => "job_failed",
        }
    }
}

impl From<MediaError> for WorkerError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Encode(msg) => WorkerError::Encode(msg),
            MediaError::Cancelled => WorkerError::Cancelled,
            MediaError::Io(e) => WorkerError::Io(e),
            MediaError::JsonParse(e) => WorkerError::Json(e),
            MediaError::Decode(msg) => WorkerError::Decode(msg),
            other => WorkerError::Decode(other.to_string()),
        }
    }
}
