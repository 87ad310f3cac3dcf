//! Synthetic media backend for worker tests.
//!
//! A session's `original.webm` holds a JSON [`Recipe`] instead of video.
//! The source renders frames from it, and the sink writes one line per
//! frame so tests can count what was encoded.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

use movan_media::{
    AnalysisConfig, Frame, FrameSink, FrameSource, MediaBackend, MediaError, MediaResult,
    SinkSpec, SourceInfo,
};
use movan_models::{JobRecord, SessionName};
use movan_worker::lock::LockInfo;
use movan_worker::{JobController, SessionStore, WorkerConfig};

/// Synthetic recording description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub frames: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Blink a square in the top-left zone every `blink_half` frames
    #[serde(default)]
    pub blink_half: Option<u64>,
    /// Fail decoding when this frame is requested
    #[serde(default)]
    pub fail_decode_at: Option<u64>,
    /// Delete the session directory when this frame is requested
    #[serde(default)]
    pub delete_session_at: Option<u64>,
    /// Have another worker reclaim the lock and fail the job at this frame
    #[serde(default)]
    pub take_over_at: Option<u64>,
}

impl Recipe {
    pub fn still(frames: u64) -> Self {
        Self {
            frames,
            fps: 30.0,
            width: 48,
            height: 48,
            blink_half: None,
            fail_decode_at: None,
            delete_session_at: None,
            take_over_at: None,
        }
    }

    pub fn blinking(frames: u64, half: u64) -> Self {
        Self {
            blink_half: Some(half),
            ..Self::still(frames)
        }
    }

    fn render(&self, index: u64) -> RgbImage {
        let mut image = RgbImage::from_pixel(self.width, self.height, Rgb([30, 30, 30]));
        if let Some(half) = self.blink_half {
            if (index / half) % 2 == 0 {
                let side = (self.width / 4).max(2);
                for y in 2..2 + side {
                    for x in 2..2 + side {
                        image.put_pixel(x, y, Rgb([250, 250, 250]));
                    }
                }
            }
        }
        image
    }
}

/// Test backend; clones share observations.
#[derive(Debug, Clone, Default)]
pub struct SyntheticBackend {
    fail_encode_at: Option<u64>,
    frame_delay: Option<Duration>,
    observed: Arc<Mutex<Vec<JobRecord>>>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_encode_at(mut self, frame: u64) -> Self {
        self.fail_encode_at = Some(frame);
        self
    }

    /// Sleep this long before every frame.
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = Some(delay);
        self
    }

    /// `job.json` as read before each frame was decoded.
    pub fn observed_jobs(&self) -> Vec<JobRecord> {
        self.observed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaBackend for SyntheticBackend {
    async fn open_source(
        &self,
        path: &Path,
        _config: &AnalysisConfig,
    ) -> MediaResult<Box<dyn FrameSource>> {
        let bytes = tokio::fs::read(path).await?;
        let recipe: Recipe = serde_json::from_slice(&bytes)
            .map_err(|e| MediaError::decode(format!("Not a recording: {}", e)))?;
        let session_dir = path.parent().unwrap().to_path_buf();
        let info = SourceInfo {
            width: recipe.width,
            height: recipe.height,
            source_width: recipe.width * 2,
            source_height: recipe.height * 2,
            fps: recipe.fps,
            estimated_frames: recipe.frames,
        };
        Ok(Box::new(SyntheticSource {
            recipe,
            info,
            next: 0,
            session_dir,
            delay: self.frame_delay,
            observed: Arc::clone(&self.observed),
        }))
    }

    async fn create_sink(&self, path: &Path, spec: &SinkSpec) -> MediaResult<Box<dyn FrameSink>> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Box::new(LineSink {
            file,
            path: path.to_path_buf(),
            spec: *spec,
            written: 0,
            fail_at: self.fail_encode_at,
        }))
    }
}

struct SyntheticSource {
    recipe: Recipe,
    info: SourceInfo,
    next: u64,
    session_dir: PathBuf,
    delay: Option<Duration>,
    observed: Arc<Mutex<Vec<JobRecord>>>,
}

impl SyntheticSource {
    /// Replace the lock with another worker's and mark the job failed, as
    /// startup recovery on that worker would.
    async fn take_over(&self) -> MediaResult<()> {
        let lock = LockInfo {
            owner: "worker-other".to_string(),
            acquired_at: chrono::Utc::now(),
        };
        tokio::fs::write(self.session_dir.join(".lock"), serde_json::to_vec(&lock)?).await?;

        let job_path = self.session_dir.join("job.json");
        let mut job: JobRecord = serde_json::from_slice(&tokio::fs::read(&job_path).await?)?;
        job.fail("Processing interrupted").unwrap();
        tokio::fs::write(&job_path, serde_json::to_vec_pretty(&job)?).await?;
        Ok(())
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Ok(bytes) = tokio::fs::read(self.session_dir.join("job.json")).await {
            if let Ok(job) = serde_json::from_slice(&bytes) {
                self.observed.lock().unwrap().push(job);
            }
        }
        if self.next >= self.recipe.frames {
            return Ok(None);
        }
        if self.recipe.delete_session_at == Some(self.next) {
            tokio::fs::remove_dir_all(&self.session_dir).await?;
        }
        if self.recipe.take_over_at == Some(self.next) {
            self.take_over().await?;
        }
        if self.recipe.fail_decode_at == Some(self.next) {
            return Err(MediaError::decode("Corrupt cluster"));
        }
        let frame = Frame::new(self.next, self.info.fps, self.recipe.render(self.next));
        self.next += 1;
        Ok(Some(frame))
    }
}

struct LineSink {
    file: tokio::fs::File,
    path: PathBuf,
    spec: SinkSpec,
    written: u64,
    fail_at: Option<u64>,
}

#[async_trait]
impl FrameSink for LineSink {
    async fn write_frame(&mut self, image: &RgbImage) -> MediaResult<()> {
        if self.fail_at == Some(self.written) {
            return Err(MediaError::encode("Encoder exited"));
        }
        if image.dimensions() != (self.spec.width, self.spec.height) {
            return Err(MediaError::encode("Wrong frame size"));
        }
        let line = format!("frame {}\n", self.written);
        self.file.write_all(line.as_bytes()).await?;
        self.written += 1;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> MediaResult<u64> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(self.written)
    }

    async fn abort(self: Box<Self>) {
        let _ = tokio::fs::remove_file(&self.path).await;
    }
}

/// Temp sessions root with a store and a config pointing at it.
pub struct Fixture {
    pub tmp: TempDir,
    pub store: SessionStore,
    pub config: WorkerConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let sessions = tmp.path().join("sessions");
        let config = WorkerConfig::default()
            .with_sessions_dir(&sessions)
            .with_max_concurrent_jobs(2)
            .with_run_once(true);
        Self {
            store: SessionStore::new(&sessions),
            config,
            tmp,
        }
    }

    /// Create a session whose recording is `recipe`.
    pub async fn session(&self, recipe: &Recipe) -> SessionName {
        self.session_with_bytes(&serde_json::to_vec(recipe).unwrap())
            .await
    }

    pub async fn session_with_bytes(&self, bytes: &[u8]) -> SessionName {
        let src = self.tmp.path().join(format!("rec-{}.webm", uuid::Uuid::new_v4()));
        tokio::fs::write(&src, bytes).await.unwrap();
        self.store.create_session(&src, None).await.unwrap()
    }

    pub fn controller(&self, backend: SyntheticBackend) -> JobController {
        JobController::new(
            self.store.clone(),
            Arc::new(backend),
            self.config.clone(),
            "worker-test",
        )
    }
}

pub const LOCK_TIMEOUT: Duration = Duration::from_secs(3600);
