//! Tracing setup and structured job logging.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use movan_models::SessionName;

/// Install the global subscriber.
///
/// Colored human-readable output by default, JSON when `LOG_FORMAT=json`.
/// `RUST_LOG` overrides the default `movan=info` filter.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,movan=info"));

    let result = if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
}

/// Job logger for consistent per-session lifecycle events.
#[derive(Debug, Clone)]
pub struct JobLogger {
    session: String,
    worker: String,
}

impl JobLogger {
    pub fn new(session: &SessionName, worker: &str) -> Self {
        Self {
            session: session.to_string(),
            worker: worker.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            session = %self.session,
            worker = %self.worker,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            session = %self.session,
            worker = %self.worker,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            session = %self.session,
            worker = %self.worker,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            session = %self.session,
            worker = %self.worker,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            session = %self.session,
            worker = %self.worker,
            "Job completed: {}", message
        );
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Span covering one processing run of the session.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            session = %self.session,
            worker = %self.worker
        )
    }
}
