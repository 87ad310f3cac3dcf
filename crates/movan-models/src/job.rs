//! The `job.json` progress record.
//!
//! A session's job record is owned exclusively by the worker that holds the
//! session lock. External readers poll the persisted file, so every change
//! goes through the state machine below before being written atomically.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};

/// Job processing status.
///
/// ```text
/// pending -> processing -> done
///                      \-> error
/// pending --------------> error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Session recorded, waiting for a worker
    #[default]
    Pending,
    /// Frames are being analyzed
    Processing,
    /// Analytics and heatmap are available
    Done,
    /// Processing failed; no artifacts are valid
    Error,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Whether the state machine allows moving to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Error)
                | (JobStatus::Processing, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Done)
                | (JobStatus::Processing, JobStatus::Error)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted job record (`job.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    /// Current status
    pub status: JobStatus,
    /// Expected frame count (best-effort estimate until the job is done)
    #[serde(default)]
    pub total_frames: u64,
    /// Frames analyzed so far
    #[serde(default)]
    pub processed_frames: u64,
    /// When the session was recorded
    pub created_at: DateTime<Utc>,
    /// Failure reason, only present when `status == error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for JobRecord {
    fn default() -> Self {
        Self::pending()
    }
}

impl JobRecord {
    /// Create a fresh pending record stamped with the current time.
    pub fn pending() -> Self {
        Self::pending_at(Utc::now())
    }

    /// Create a pending record with an explicit creation time.
    pub fn pending_at(created_at: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Pending,
            total_frames: 0,
            processed_frames: 0,
            created_at,
            error: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Progress percentage (0-100), 0 while the total is unknown.
    pub fn progress_percent(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.processed_frames as f64 / self.total_frames as f64 * 100.0).min(100.0)
    }

    /// `pending -> processing`, recording the expected frame count.
    pub fn start(&mut self, total_frames: u64) -> ModelResult<()> {
        self.transition(JobStatus::Processing)?;
        self.total_frames = total_frames;
        self.processed_frames = 0;
        self.error = None;
        Ok(())
    }

    /// `processing -> processing`, recording frames analyzed so far.
    ///
    /// The estimate is raised when decoding runs past it so that
    /// `processed_frames <= total_frames` always holds.
    pub fn record_progress(&mut self, processed_frames: u64) -> ModelResult<()> {
        if self.status != JobStatus::Processing {
            return Err(ModelError::invalid_transition(self.status, JobStatus::Processing));
        }
        if processed_frames < self.processed_frames {
            return Err(ModelError::ProgressRegressed {
                current: self.processed_frames,
                requested: processed_frames,
            });
        }
        self.processed_frames = processed_frames;
        self.total_frames = self.total_frames.max(processed_frames);
        Ok(())
    }

    /// `processing -> done`. The final count replaces the estimate.
    pub fn complete(&mut self, processed_frames: u64) -> ModelResult<()> {
        self.record_progress(processed_frames)?;
        self.transition(JobStatus::Done)?;
        self.total_frames = processed_frames;
        Ok(())
    }

    /// `pending|processing -> error`.
    pub fn fail(&mut self, reason: impl Into<String>) -> ModelResult<()> {
        self.transition(JobStatus::Error)?;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Reset a terminal record for an explicit re-run, keeping `created_at`.
    pub fn reset(&mut self) {
        *self = Self::pending_at(self.created_at);
    }

    fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::invalid_transition(self.status, next));
        }
        self.status = next;
        Ok(())
    }
}
