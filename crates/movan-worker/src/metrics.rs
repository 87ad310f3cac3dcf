//! Prometheus metrics for the worker.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::error::{WorkerError, WorkerResult};

/// Metric name constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "movan_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "movan_jobs_failed_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "movan_jobs_cancelled_total";
    pub const FRAMES_PROCESSED_TOTAL: &str = "movan_frames_processed_total";
    pub const JOB_DURATION_SECONDS: &str = "movan_job_duration_seconds";
}

/// Serve `/metrics` on `addr`. Without a call to this, recording is a no-op.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

pub fn record_job_completed(frames: u64, duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(frames);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "done").record(duration_secs);
}

pub fn record_job_failed(kind: &'static str, duration_secs: f64) {
    counter!(names::JOBS_FAILED_TOTAL, "kind" => kind).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "error").record(duration_secs);
}

pub fn record_job_cancelled() {
    counter!(names::JOBS_CANCELLED_TOTAL).increment(1);
}
