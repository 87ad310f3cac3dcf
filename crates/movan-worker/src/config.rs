//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use movan_media::AnalysisConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root directory holding one subdirectory per session
    pub sessions_dir: PathBuf,
    /// Maximum sessions processed concurrently
    pub max_concurrent_jobs: usize,
    /// How often the sessions directory is scanned for pending jobs
    pub poll_interval: Duration,
    /// Persist progress after this many frames...
    pub progress_every_frames: u64,
    /// ...or after this much time, whichever comes first
    pub progress_interval: Duration,
    /// Age after which a session lock is considered abandoned
    pub lock_stale_after: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Process currently pending sessions once, then exit
    pub run_once: bool,
    /// Prometheus listener; metrics are only exported when set
    pub metrics_addr: Option<SocketAddr>,
    /// Analysis parameters applied to every session
    pub analysis: AnalysisConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sessions_dir: PathBuf::from("./sessions"),
            max_concurrent_jobs: default_max_jobs(),
            poll_interval: Duration::from_secs(5),
            progress_every_frames: 10,
            progress_interval: Duration::from_millis(1000),
            lock_stale_after: Duration::from_secs(3600), // 1 hour
            shutdown_timeout: Duration::from_secs(60),
            run_once: false,
            metrics_addr: None,
            analysis: AnalysisConfig::default(),
        }
    }
}

/// Available cores, capped at 4.
fn default_max_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, 4)
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut analysis = defaults.analysis.clone();
        if let Some(width) = env_parse("MOVAN_ANALYSIS_WIDTH") {
            analysis = analysis.with_analysis_width(width);
        }
        if let Some(threshold) = env_parse("MOVAN_NOISE_THRESHOLD") {
            analysis = analysis.with_noise_threshold(threshold);
        }
        if let Some(sigma) = env_parse("MOVAN_BLUR_SIGMA") {
            analysis = analysis.with_blur_sigma(sigma);
        }
        if let Some(preprocess) = env_parse("MOVAN_PREPROCESS") {
            analysis = analysis.with_preprocess(preprocess);
        }
        if let Some(style) = env_parse("MOVAN_HEATMAP_STYLE") {
            analysis = analysis.with_heatmap_style(style);
        }
        if let Some(alpha) = env_parse("MOVAN_OVERLAY_ALPHA") {
            analysis = analysis.with_overlay_alpha(alpha);
        }
        if let Some(hz) = env_parse("MOVAN_TIMELINE_HZ") {
            analysis = analysis.with_timeline_hz(hz);
        }

        Self {
            sessions_dir: std::env::var("MOVAN_SESSIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.sessions_dir),
            max_concurrent_jobs: env_parse::<usize>("MOVAN_MAX_JOBS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            poll_interval: env_parse("MOVAN_POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            progress_every_frames: env_parse::<u64>("MOVAN_PROGRESS_EVERY_FRAMES")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.progress_every_frames),
            progress_interval: env_parse("MOVAN_PROGRESS_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.progress_interval),
            lock_stale_after: env_parse("MOVAN_LOCK_STALE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_stale_after),
            shutdown_timeout: env_parse("MOVAN_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            run_once: env_flag("MOVAN_RUN_ONCE"),
            metrics_addr: env_parse("MOVAN_METRICS_ADDR"),
            analysis,
        }
    }

    /// Builder-style setter for the sessions directory.
    pub fn with_sessions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sessions_dir = dir.into();
        self
    }

    pub fn with_max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn with_run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    pub fn with_analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.analysis = analysis;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.progress_every_frames, 10);
        assert!((1..=4).contains(&config.max_concurrent_jobs));
        assert!(config.metrics_addr.is_none());
        assert!(!config.run_once);
    }

    #[test]
    fn test_builders() {
        let config = WorkerConfig::default()
            .with_sessions_dir("/data/sessions")
            .with_max_concurrent_jobs(0)
            .with_run_once(true);
        assert_eq!(config.sessions_dir, PathBuf::from("/data/sessions"));
        assert_eq!(config.max_concurrent_jobs, 1);
        assert!(config.run_once);
    }
}
