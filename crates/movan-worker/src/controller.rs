//! Job controller: runs the analysis pipeline over one session.
//!
//! ```text
//! pending -> processing -> done
//!                      \-> error
//! ```
//!
//! Outputs are produced in this order so readers never observe a partial
//! result: heatmap encoded to `heatmap.webm.part`, renamed to
//! `heatmap.webm`, `analytics.json` written atomically, and only then
//! `job.json` flipped to `done`.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tracing::Instrument;

use movan_media::fs_utils::move_file;
use movan_media::{FramePipeline, FrameSink, FrameSource, MediaBackend, MediaError, SinkSpec};
use movan_models::{JobRecord, JobStatus, SessionName, SessionPaths};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::lock::SessionLock;
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::{JobProgress, ProgressThrottle};
use crate::store::SessionStore;

/// How a processing attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// `job.json` is `done`; heatmap and analytics are in place.
    Completed { frames: u64 },
    /// `job.json` is `error`; no outputs remain.
    Failed { reason: String },
    /// The session disappeared; nothing was written back.
    Cancelled,
    /// Not processed: locked by another worker or no longer pending, or
    /// the lock was taken over mid-run.
    Skipped,
}

/// Processes sessions one at a time; share it behind an `Arc` to run
/// several sessions concurrently.
pub struct JobController {
    store: SessionStore,
    backend: Arc<dyn MediaBackend>,
    config: WorkerConfig,
    worker_id: String,
}

impl JobController {
    pub fn new(
        store: SessionStore,
        backend: Arc<dyn MediaBackend>,
        config: WorkerConfig,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            backend,
            config,
            worker_id: worker_id.into(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Process a pending session to completion.
    ///
    /// Never returns an error: every failure is recorded in the session's
    /// `job.json` and reported as an outcome.
    pub async fn run(&self, name: &SessionName) -> JobOutcome {
        let logger = JobLogger::new(name, &self.worker_id);
        let span = logger.create_span();
        self.run_logged(name, &logger).instrument(span).await
    }

    async fn run_logged(&self, name: &SessionName, logger: &JobLogger) -> JobOutcome {
        let started = Instant::now();
        let paths = self.store.paths(name);

        let mut lock = match SessionLock::acquire(
            &paths.lock,
            &self.worker_id,
            self.config.lock_stale_after,
        ) {
            Ok(lock) => lock,
            Err(WorkerError::Locked(holder)) => {
                logger.log_progress(&format!("skipped, {}", holder));
                return JobOutcome::Skipped;
            }
            Err(WorkerError::Cancelled) => return self.cancelled(&paths, logger).await,
            Err(e) => return self.failed(name, None, e, started, logger).await,
        };

        let job = match self.store.read_job(name).await {
            Ok(job) => job,
            Err(WorkerError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                return self.cancelled(&paths, logger).await;
            }
            Err(e) => return self.failed(name, None, e, started, logger).await,
        };
        if job.status != JobStatus::Pending {
            logger.log_progress(&format!("skipped, status is {}", job.status));
            return JobOutcome::Skipped;
        }

        logger.log_start(&format!("analyzing {}", paths.original.display()));
        let throttle = ProgressThrottle::new(
            self.config.progress_every_frames,
            self.config.progress_interval,
        );
        let mut progress = JobProgress::new(&self.store, name, job, throttle).with_lock(&mut lock);

        match self.process(name, &paths, &mut progress, logger).await {
            Ok(frames) => {
                let elapsed = started.elapsed().as_secs_f64();
                logger.log_completion(&format!(
                    "{} frames in {:.1}s ({} job.json writes)",
                    frames,
                    elapsed,
                    progress.writes()
                ));
                metrics::record_job_completed(frames, elapsed);
                JobOutcome::Completed { frames }
            }
            Err(e) if e.is_cancelled() => self.cancelled(&paths, logger).await,
            Err(WorkerError::Locked(holder)) => {
                // the session belongs to another worker now; leave it alone
                logger.log_warning(&format!("stopped, {}", holder));
                JobOutcome::Skipped
            }
            Err(e) => {
                let job = progress.job().clone();
                self.failed(name, Some(job), e, started, logger).await
            }
        }
    }

    async fn process(
        &self,
        name: &SessionName,
        paths: &SessionPaths,
        progress: &mut JobProgress<'_>,
        logger: &JobLogger,
    ) -> WorkerResult<u64> {
        let analysis = &self.config.analysis;

        let mut source = self
            .backend
            .open_source(&paths.original, analysis)
            .await
            .map_err(decode_error)?;
        let info = *source.info();

        progress.job_mut().start(info.estimated_frames)?;
        progress.checkpoint().await?;
        logger.log_progress(&format!(
            "~{} frames at {:.2} fps, analysis {}x{}",
            info.estimated_frames, info.fps, info.width, info.height
        ));

        let pipeline = FramePipeline::new(analysis, &info);
        let mut sink = self
            .backend
            .create_sink(&paths.heatmap_partial, &SinkSpec::matching(&info))
            .await
            .map_err(encode_error)?;

        let streamed = stream_frames(source.as_mut(), pipeline, sink.as_mut(), progress).await;
        let pipeline = match streamed {
            Ok(pipeline) => pipeline,
            Err(e) => {
                sink.abort().await;
                return Err(e);
            }
        };
        let frames = pipeline.frames();

        let written = sink.finish().await.map_err(encode_error)?;
        if written != frames {
            return Err(WorkerError::encode(format!(
                "Heatmap has {} frames, recording has {}",
                written, frames
            )));
        }
        move_file(&paths.heatmap_partial, &paths.heatmap).await?;

        let analytics = tokio::task::spawn_blocking(move || pipeline.finish())
            .await
            .map_err(|e| WorkerError::job_failed(format!("Analysis task join error: {}", e)))?;
        self.store.write_analytics(name, &analytics).await?;

        progress.job_mut().complete(frames)?;
        progress.checkpoint().await?;
        Ok(frames)
    }

    /// Abort without touching `job.json`.
    async fn cancelled(&self, paths: &SessionPaths, logger: &JobLogger) -> JobOutcome {
        if fs::metadata(&paths.dir).await.is_ok() {
            if let Err(e) = self.store.remove_temp_files(paths).await {
                logger.log_warning(&format!("temp cleanup failed: {}", e));
            }
        }
        logger.log_warning("session removed, processing cancelled");
        metrics::record_job_cancelled();
        JobOutcome::Cancelled
    }

    /// Discard outputs and record `status = error`.
    ///
    /// If the session disappeared in the meantime this is a cancellation.
    async fn failed(
        &self,
        name: &SessionName,
        job: Option<JobRecord>,
        err: WorkerError,
        started: Instant,
        logger: &JobLogger,
    ) -> JobOutcome {
        let paths = &self.store.paths(name);
        if !self.store.exists(name).await {
            return self.cancelled(paths, logger).await;
        }

        let reason = err.to_string();
        logger.log_error(&reason);
        metrics::record_job_failed(err.kind(), started.elapsed().as_secs_f64());

        if let Err(e) = self.store.discard_outputs(paths).await {
            logger.log_warning(&format!("output cleanup failed: {}", e));
        }

        let mut job = job.unwrap_or_else(JobRecord::pending);
        if job.is_terminal() {
            // `done` could not be persisted
            job = JobRecord::pending_at(job.created_at);
        }
        if let Err(e) = job.fail(reason.clone()) {
            logger.log_warning(&format!("unexpected job state: {}", e));
        }
        match self.store.write_job(name, &job).await {
            Ok(()) => JobOutcome::Failed { reason },
            Err(WorkerError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                self.cancelled(paths, logger).await
            }
            Err(e) => {
                logger.log_error(&format!("could not record failure: {}", e));
                JobOutcome::Failed { reason }
            }
        }
    }

    /// Mark a session left in `processing` by a dead worker as failed.
    ///
    /// Partial state cannot be resumed, and failed sessions are not retried
    /// automatically.
    pub async fn fail_interrupted(&self, name: &SessionName) -> WorkerResult<bool> {
        let paths = self.store.paths(name);
        let _lock =
            SessionLock::acquire(&paths.lock, &self.worker_id, self.config.lock_stale_after)?;
        let mut job = self.store.read_job(name).await?;
        if job.status != JobStatus::Processing {
            return Ok(false);
        }
        self.store.discard_outputs(&paths).await?;
        job.fail("Processing interrupted")?;
        self.store.write_job(name, &job).await?;
        JobLogger::new(name, &self.worker_id).log_warning("interrupted run marked as error");
        Ok(true)
    }
}

/// Feed every decoded frame through the pipeline and into the sink.
///
/// Analysis runs on the blocking pool, one frame at a time, so the runtime
/// keeps draining ffmpeg pipes while a frame is being processed.
async fn stream_frames(
    source: &mut dyn FrameSource,
    mut pipeline: FramePipeline,
    sink: &mut dyn FrameSink,
    progress: &mut JobProgress<'_>,
) -> WorkerResult<FramePipeline> {
    while let Some(frame) = source.next_frame().await.map_err(decode_error)? {
        let (returned, rendered) = tokio::task::spawn_blocking(move || {
            let rendered = pipeline.process(&frame);
            (pipeline, rendered)
        })
        .await
        .map_err(|e| WorkerError::job_failed(format!("Analysis task join error: {}", e)))?;
        pipeline = returned;

        sink.write_frame(&rendered?).await.map_err(encode_error)?;
        progress.advance(pipeline.frames()).await?;
    }
    if pipeline.frames() == 0 {
        return Err(WorkerError::decode("Recording contains no decodable frames"));
    }
    Ok(pipeline)
}

/// Anything that goes wrong reading the recording is a decode failure.
fn decode_error(err: MediaError) -> WorkerError {
    match err {
        MediaError::Cancelled => WorkerError::Cancelled,
        MediaError::Decode(msg) => WorkerError::Decode(msg),
        other => WorkerError::Decode(other.to_string()),
    }
}

/// Anything that goes wrong writing the heatmap is an encode failure.
fn encode_error(err: MediaError) -> WorkerError {
    match err {
        MediaError::Cancelled => WorkerError::Cancelled,
        MediaError::Encode(msg) => WorkerError::Encode(msg),
        other => WorkerError::Encode(other.to_string()),
    }
}
