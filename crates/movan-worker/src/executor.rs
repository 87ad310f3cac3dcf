//! Job executor.
//!
//! Scans the sessions directory for pending jobs and runs each one on a
//! bounded pool of tokio tasks.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use movan_media::MediaBackend;
use movan_models::SessionName;

use crate::config::WorkerConfig;
use crate::controller::{JobController, JobOutcome};
use crate::error::{WorkerError, WorkerResult};
use crate::store::SessionStore;

/// Tally of outcomes, mostly for run-once mode and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub skipped: u64,
}

impl ExecutorStats {
    fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Completed { .. } => self.completed += 1,
            JobOutcome::Failed { .. } => self.failed += 1,
            JobOutcome::Cancelled => self.cancelled += 1,
            JobOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Job executor that processes pending sessions.
pub struct JobExecutor {
    config: WorkerConfig,
    controller: Arc<JobController>,
    job_semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<SessionName>>>,
    stats: Arc<Mutex<ExecutorStats>>,
    shutdown: watch::Sender<bool>,
    worker_id: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, backend: Arc<dyn MediaBackend>) -> Self {
        let worker_id = format!("worker-{}", Uuid::new_v4());
        let store = SessionStore::new(config.sessions_dir.clone());
        let controller = Arc::new(JobController::new(
            store,
            backend,
            config.clone(),
            worker_id.clone(),
        ));
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            controller,
            job_semaphore,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            stats: Arc::new(Mutex::new(ExecutorStats::default())),
            shutdown,
            worker_id,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    /// Start the executor. Returns after shutdown, or after one pass in
    /// run-once mode.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' on {} with {} max concurrent jobs",
            self.worker_id,
            self.config.sessions_dir.display(),
            self.config.max_concurrent_jobs
        );
        self.controller.store().ensure_root().await?;
        self.recover_interrupted().await;

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow_and_update() {
                info!("Shutdown requested before poll, stopping executor");
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.dispatch_pending().await {
                        error!("Error scanning for pending sessions: {}", e);
                    }
                    if self.config.run_once {
                        self.wait_for_jobs().await;
                        break;
                    }
                }
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}",
                self.config.shutdown_timeout
            );
        }

        let stats = self.stats();
        info!(
            "Job executor stopped: {} completed, {} failed, {} cancelled, {} skipped",
            stats.completed, stats.failed, stats.cancelled, stats.skipped
        );
        Ok(())
    }

    /// Fail sessions a crashed worker left in `processing`.
    async fn recover_interrupted(&self) {
        let store = self.controller.store();
        let interrupted = match store.find_interrupted(self.config.lock_stale_after).await {
            Ok(names) => names,
            Err(e) => {
                warn!("Failed to scan for interrupted sessions: {}", e);
                return;
            }
        };
        for name in interrupted {
            match self.controller.fail_interrupted(&name).await {
                Ok(true) => warn!(session = %name, "Marked interrupted session as error"),
                Ok(false) => {}
                Err(e) => debug!(session = %name, "Could not recover session: {}", e),
            }
        }
    }

    /// Spawn a task for every pending session not already in flight.
    ///
    /// Stops early once shutdown is requested, including while waiting for
    /// a free slot.
    async fn dispatch_pending(&self) -> WorkerResult<()> {
        let pending = self.controller.store().find_pending().await?;
        if pending.is_empty() {
            return Ok(());
        }
        debug!("Found {} pending sessions", pending.len());

        let mut shutdown_rx = self.shutdown.subscribe();
        for name in pending {
            if *shutdown_rx.borrow_and_update() {
                info!("Shutdown requested, not dispatching further sessions");
                break;
            }
            {
                let mut in_flight = self
                    .in_flight
                    .lock()
                    .map_err(|_| WorkerError::config_error("in-flight set poisoned"))?;
                if !in_flight.insert(name.clone()) {
                    continue;
                }
            }

            let permit = tokio::select! {
                permit = self.job_semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        self.release(&name);
                        return Err(WorkerError::config_error("Semaphore closed"));
                    }
                },
                _ = shutdown_rx.changed() => {
                    self.release(&name);
                    info!("Shutdown requested while waiting for a job slot");
                    break;
                }
            };

            let controller = Arc::clone(&self.controller);
            let in_flight = Arc::clone(&self.in_flight);
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                let _permit = permit;
                let outcome = controller.run(&name).await;
                debug!(session = %name, "Outcome: {:?}", outcome);
                if let Ok(mut stats) = stats.lock() {
                    stats.record(&outcome);
                }
                if let Ok(mut set) = in_flight.lock() {
                    set.remove(&name);
                }
            });
        }
        Ok(())
    }

    fn release(&self, name: &SessionName) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(name);
        }
    }

    /// Wait until every permit is back.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
