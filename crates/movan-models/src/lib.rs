//! Shared data models for the Movan movement analyzer.
//!
//! This crate provides Serde-serializable types for:
//! - Session naming and the per-session file layout
//! - The `job.json` progress record and its state machine
//! - The `analytics.json` payload (timelines, zones, repetition stats)
//! - JSON Schemas for both persisted documents

pub mod analytics;
pub mod error;
pub mod job;
pub mod schema;
pub mod session;

// Re-export common types
pub use analytics::{
    round_to, AnalyticsRecord, IntensitySummary, RepetitionStats, Resolution, TimelinePoint,
    ZoneCode, ZoneMap, ZoneTimelinePoint,
};
pub use error::{ModelError, ModelResult};
pub use job::{JobRecord, JobStatus};
pub use session::{SessionName, SessionPaths};
