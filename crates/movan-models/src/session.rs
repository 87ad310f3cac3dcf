//! Session naming and on-disk layout.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ModelError, ModelResult};

/// Recorded input video.
pub const ORIGINAL_VIDEO: &str = "original.webm";
/// Optional separate audio track.
pub const AUDIO_TRACK: &str = "audio.webm";
/// Progress record polled by readers.
pub const JOB_FILE: &str = "job.json";
/// Rendered movement heatmap.
pub const HEATMAP_VIDEO: &str = "heatmap.webm";
/// Heatmap while it is being encoded; never read by consumers.
pub const HEATMAP_PARTIAL: &str = "heatmap.webm.part";
/// Final analytics payload.
pub const ANALYTICS_FILE: &str = "analytics.json";
/// Mutual-exclusion marker held by the worker processing the session.
pub const LOCK_FILE: &str = ".lock";

/// strftime pattern for session names. Lexicographic order equals
/// chronological order.
pub const SESSION_NAME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Name of a session directory, derived from its creation timestamp.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionName(String);

impl SessionName {
    /// Name for a session created now.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Name for a session created at `at` (second precision).
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format(SESSION_NAME_FORMAT).to_string())
    }

    /// Disambiguated name for the `n`-th collision within the same second.
    ///
    /// `2024-05-01T12-34-56` < `2024-05-01T12-34-56-01` < `2024-05-01T12-34-57`
    pub fn with_suffix(&self, n: u32) -> Self {
        Self(format!("{}-{:02}", self.0, n))
    }

    /// Validate an existing directory name.
    pub fn parse(name: impl Into<String>) -> ModelResult<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && !name.chars().any(char::is_control);
        if valid {
            Ok(Self(name))
        } else {
            Err(ModelError::invalid_session_name(name))
        }
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<Path> for SessionName {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// Absolute paths of every file a session may own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub dir: PathBuf,
    pub original: PathBuf,
    pub audio: PathBuf,
    pub job: PathBuf,
    pub heatmap: PathBuf,
    pub heatmap_partial: PathBuf,
    pub analytics: PathBuf,
    pub lock: PathBuf,
}

impl SessionPaths {
    /// Layout of `<sessions_dir>/<name>/`.
    pub fn new(sessions_dir: impl AsRef<Path>, name: &SessionName) -> Self {
        let dir = sessions_dir.as_ref().join(name);
        Self {
            original: dir.join(ORIGINAL_VIDEO),
            audio: dir.join(AUDIO_TRACK),
            job: dir.join(JOB_FILE),
            heatmap: dir.join(HEATMAP_VIDEO),
            heatmap_partial: dir.join(HEATMAP_PARTIAL),
            analytics: dir.join(ANALYTICS_FILE),
            lock: dir.join(LOCK_FILE),
            dir,
        }
    }
}
