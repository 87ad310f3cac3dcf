//! Error types for model validation.

use thiserror::Error;

use crate::job::JobStatus;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised when a model invariant would be violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Progress regressed from {current} to {requested} frames")]
    ProgressRegressed { current: u64, requested: u64 },

    #[error("Invalid session name: {0}")]
    InvalidSessionName(String),
}

impl ModelError {
    /// Create an invalid transition error.
    pub fn invalid_transition(from: JobStatus, to: JobStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Create an invalid session name error.
    pub fn invalid_session_name(name: impl Into<String>) -> Self {
        Self::InvalidSessionName(name.into())
    }
}
