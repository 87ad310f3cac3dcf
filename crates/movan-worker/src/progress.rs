//! Throttled `job.json` persistence.
//!
//! Every persisted update doubles as a cancellation checkpoint: if the
//! session directory or its job file has disappeared, processing stops with
//! [`WorkerError::Cancelled`] and nothing is written back. It also refreshes
//! the session lock; a lock taken over by another worker stops processing
//! with [`WorkerError::Locked`], again without writing.

use std::io::ErrorKind;
use std::time::{Duration, Instant};
use tracing::debug;

use movan_models::{JobRecord, SessionName};

use crate::error::{WorkerError, WorkerResult};
use crate::lock::SessionLock;
use crate::store::SessionStore;

/// Decides when progress is worth persisting.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    every_frames: u64,
    interval: Duration,
    last_frames: u64,
    last_at: Instant,
}

impl ProgressThrottle {
    pub fn new(every_frames: u64, interval: Duration) -> Self {
        Self {
            every_frames: every_frames.max(1),
            interval,
            last_frames: 0,
            last_at: Instant::now(),
        }
    }

    /// Whether `processed` frames should be persisted now.
    pub fn is_due(&self, processed: u64) -> bool {
        processed >= self.last_frames + self.every_frames
            || self.last_at.elapsed() >= self.interval
    }

    pub fn mark(&mut self, processed: u64) {
        self.last_frames = processed;
        self.last_at = Instant::now();
    }
}

/// Owns a session's job record while it is being processed.
pub struct JobProgress<'a> {
    store: &'a SessionStore,
    name: &'a SessionName,
    job: JobRecord,
    throttle: ProgressThrottle,
    lock: Option<&'a mut SessionLock>,
    writes: u64,
}

impl<'a> JobProgress<'a> {
    pub fn new(
        store: &'a SessionStore,
        name: &'a SessionName,
        job: JobRecord,
        throttle: ProgressThrottle,
    ) -> Self {
        Self {
            store,
            name,
            job,
            throttle,
            lock: None,
            writes: 0,
        }
    }

    /// Keep `lock` fresh at every checkpoint.
    pub fn with_lock(mut self, lock: &'a mut SessionLock) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn job(&self) -> &JobRecord {
        &self.job
    }

    pub fn job_mut(&mut self) -> &mut JobRecord {
        &mut self.job
    }

    /// Number of `job.json` writes so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Record `processed` frames, persisting if the throttle allows.
    pub async fn advance(&mut self, processed: u64) -> WorkerResult<()> {
        self.job.record_progress(processed)?;
        if self.throttle.is_due(processed) {
            self.checkpoint().await?;
        }
        Ok(())
    }

    /// Persist the current record unconditionally.
    pub async fn checkpoint(&mut self) -> WorkerResult<()> {
        if !self.store.exists(self.name).await {
            debug!(session = %self.name, "Session disappeared at checkpoint");
            return Err(WorkerError::Cancelled);
        }
        if let Some(lock) = self.lock.as_deref_mut() {
            lock.refresh()?;
        }
        match self.store.write_job(self.name, &self.job).await {
            Ok(()) => {}
            Err(WorkerError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(WorkerError::Cancelled)
            }
            Err(e) => return Err(e),
        }
        self.throttle.mark(self.job.processed_frames);
        self.writes += 1;
        Ok(())
    }
}
