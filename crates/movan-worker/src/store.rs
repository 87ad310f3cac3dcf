//! Session directory store.
//!
//! Layout of `<sessions_dir>/<session>/` is defined by [`SessionPaths`].
//! All documents are replaced atomically so concurrent readers polling
//! `job.json` never see a half-written file.

use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

use movan_media::fs_utils::{copy_atomic, remove_if_exists, tmp_path, write_json_atomic};
use movan_models::{AnalyticsRecord, JobRecord, JobStatus, SessionName, SessionPaths};

use crate::error::{WorkerError, WorkerResult};
use crate::lock;

/// Highest collision suffix tried when two sessions start in the same second.
const MAX_NAME_SUFFIX: u32 = 99;

/// A session as seen by a directory listing.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub name: SessionName,
    /// `None` when `job.json` is missing or unreadable
    pub job: Option<JobRecord>,
}

/// Filesystem-backed session store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the sessions directory if needed.
    pub async fn ensure_root(&self) -> WorkerResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn paths(&self, name: &SessionName) -> SessionPaths {
        SessionPaths::new(&self.root, name)
    }

    /// Whether the session directory and its job record both exist.
    pub async fn exists(&self, name: &SessionName) -> bool {
        let paths = self.paths(name);
        fs::metadata(&paths.dir).await.map(|m| m.is_dir()).unwrap_or(false)
            && fs::metadata(&paths.job).await.is_ok()
    }

    /// All sessions, most recent first.
    pub async fn list(&self) -> WorkerResult<Vec<SessionEntry>> {
        let mut names = self.session_names().await?;
        names.sort_by(|a, b| b.cmp(a));

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let job = self.read_job(&name).await.ok();
            entries.push(SessionEntry { name, job });
        }
        Ok(entries)
    }

    async fn session_names(&self) -> WorkerResult<Vec<SessionName>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let Some(raw) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Ok(name) = SessionName::parse(raw) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Create a session from a finished recording.
    ///
    /// The recording (and optional audio track) are copied in, then a
    /// pending `job.json` is written last so workers never see a session
    /// without its input.
    pub async fn create_session(
        &self,
        original: &Path,
        audio: Option<&Path>,
    ) -> WorkerResult<SessionName> {
        self.create_session_at(Utc::now(), original, audio).await
    }

    /// [`Self::create_session`] with an explicit creation time.
    pub async fn create_session_at(
        &self,
        created_at: DateTime<Utc>,
        original: &Path,
        audio: Option<&Path>,
    ) -> WorkerResult<SessionName> {
        if !fs::metadata(original).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(WorkerError::invalid_session(format!(
                "Recording not found: {}",
                original.display()
            )));
        }
        self.ensure_root().await?;

        let name = self.reserve_name(SessionName::from_datetime(created_at)).await?;
        let paths = self.paths(&name);

        let populated = async {
            copy_atomic(original, &paths.original).await?;
            if let Some(audio) = audio {
                copy_atomic(audio, &paths.audio).await?;
            }
            write_json_atomic(&paths.job, &JobRecord::pending_at(created_at)).await?;
            Ok::<_, WorkerError>(())
        }
        .await;

        if let Err(e) = populated {
            let _ = fs::remove_dir_all(&paths.dir).await;
            return Err(e);
        }

        info!(session = %name, "Created session");
        Ok(name)
    }

    /// Create the session directory, suffixing the name on collision.
    async fn reserve_name(&self, base: SessionName) -> WorkerResult<SessionName> {
        let mut candidate = base.clone();
        for n in 1..=MAX_NAME_SUFFIX + 1 {
            match fs::create_dir(self.root.join(&candidate)).await {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    candidate = base.with_suffix(n);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(WorkerError::invalid_session(format!(
            "Too many sessions named {}",
            base
        )))
    }

    pub async fn read_job(&self, name: &SessionName) -> WorkerResult<JobRecord> {
        let bytes = fs::read(self.paths(name).job).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn write_job(&self, name: &SessionName, job: &JobRecord) -> WorkerResult<()> {
        write_json_atomic(self.paths(name).job, job).await?;
        Ok(())
    }

    /// Analytics of a finished session; `None` unless the job is done.
    pub async fn read_analytics(
        &self,
        name: &SessionName,
    ) -> WorkerResult<Option<AnalyticsRecord>> {
        let job = self.read_job(name).await?;
        if job.status != JobStatus::Done {
            return Ok(None);
        }
        match fs::read(self.paths(name).analytics).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_analytics(
        &self,
        name: &SessionName,
        analytics: &AnalyticsRecord,
    ) -> WorkerResult<()> {
        write_json_atomic(self.paths(name).analytics, analytics).await?;
        Ok(())
    }

    /// Sessions waiting for a worker, oldest first.
    pub async fn find_pending(&self) -> WorkerResult<Vec<SessionName>> {
        self.find_with_status(JobStatus::Pending).await
    }

    /// Sessions left in `processing` by a worker that is no longer running.
    pub async fn find_interrupted(
        &self,
        stale_after: Duration,
    ) -> WorkerResult<Vec<SessionName>> {
        let mut interrupted = Vec::new();
        for name in self.find_with_status(JobStatus::Processing).await? {
            if !lock::is_held(&self.paths(&name).lock, stale_after) {
                interrupted.push(name);
            }
        }
        Ok(interrupted)
    }

    async fn find_with_status(&self, status: JobStatus) -> WorkerResult<Vec<SessionName>> {
        let mut names = self.session_names().await?;
        names.sort();
        let mut matching = Vec::new();
        for name in names {
            match self.read_job(&name).await {
                Ok(job) if job.status == status => matching.push(name),
                Ok(_) => {}
                Err(e) => debug!(session = %name, "Skipping session: {}", e),
            }
        }
        Ok(matching)
    }

    /// Reset a finished or failed session to `pending`, discarding its
    /// artifacts. This is the only way a session is processed again.
    pub async fn rerun(
        &self,
        name: &SessionName,
        stale_after: Duration,
    ) -> WorkerResult<JobRecord> {
        let paths = self.paths(name);
        if lock::is_held(&paths.lock, stale_after) {
            return Err(WorkerError::locked(format!("{} is being processed", name)));
        }
        let mut job = self.read_job(name).await?;
        if !job.is_terminal() {
            return Err(WorkerError::invalid_session(format!(
                "{} is {}, only done or error sessions can be re-run",
                name, job.status
            )));
        }

        self.discard_outputs(&paths).await?;
        job.reset();
        self.write_job(name, &job).await?;
        info!(session = %name, "Session reset for re-run");
        Ok(job)
    }

    /// Remove in-progress files (`*.part`, `*.tmp`).
    pub async fn remove_temp_files(&self, paths: &SessionPaths) -> WorkerResult<()> {
        remove_if_exists(&paths.heatmap_partial).await?;
        remove_if_exists(tmp_path(&paths.analytics)).await?;
        remove_if_exists(tmp_path(&paths.job)).await?;
        Ok(())
    }

    /// Remove temp files and any heatmap or analytics output.
    pub async fn discard_outputs(&self, paths: &SessionPaths) -> WorkerResult<()> {
        self.remove_temp_files(paths).await?;
        remove_if_exists(&paths.heatmap).await?;
        remove_if_exists(&paths.analytics).await?;
        Ok(())
    }
}
