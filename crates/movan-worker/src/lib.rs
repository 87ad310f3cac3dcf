//! Session processing worker for the movement analyzer.
//!
//! This crate provides:
//! - Session store over the on-disk directory layout
//! - Job controller driving decode, analysis and heatmap encoding
//! - Bounded executor with lock files and graceful shutdown
//! - Structured logging and Prometheus metrics

pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod lock;
pub mod logging;
pub mod metrics;
pub mod progress;
pub mod store;

pub use config::WorkerConfig;
pub use controller::{JobController, JobOutcome};
pub use error::{WorkerError, WorkerResult};
pub use executor::{ExecutorStats, JobExecutor};
pub use lock::SessionLock;
pub use logging::JobLogger;
pub use store::{SessionEntry, SessionStore};
