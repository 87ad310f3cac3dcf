//! Per-session lock file.
//!
//! `<session>/.lock` is created with `O_CREAT | O_EXCL`; whoever creates it
//! owns the session until the guard is dropped. A lock older than the stale
//! timeout is assumed to belong to a crashed worker and is taken over, so
//! long jobs [`refresh`](SessionLock::refresh) theirs while they run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};

/// Lock file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
}

/// RAII guard for a session lock.
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
    info: LockInfo,
}

impl SessionLock {
    /// Take the lock at `path` for `owner`.
    ///
    /// Fails with [`WorkerError::Locked`] when a live lock exists and with
    /// [`WorkerError::Cancelled`] when the session directory is gone.
    pub fn acquire(
        path: impl AsRef<Path>,
        owner: &str,
        stale_after: Duration,
    ) -> WorkerResult<Self> {
        let path = path.as_ref().to_path_buf();
        match Self::create(&path, owner) {
            Ok(lock) => Ok(lock),
            Err(WorkerError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                if !is_stale(&path, stale_after) {
                    let holder = read_info(&path)
                        .map(|info| info.owner)
                        .unwrap_or_else(|| "unknown".to_string());
                    return Err(WorkerError::locked(format!(
                        "{} held by {}",
                        path.display(),
                        holder
                    )));
                }
                warn!("Reclaiming stale lock {}", path.display());
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                Self::create(&path, owner).map_err(|e| match e {
                    WorkerError::Io(e) if e.kind() == ErrorKind::AlreadyExists => WorkerError::locked(
                        format!("{} reclaimed by another worker", path.display()),
                    ),
                    other => other,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn create(path: &Path, owner: &str) -> WorkerResult<Self> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(WorkerError::Cancelled),
            Err(e) => return Err(e.into()),
        };
        let info = LockInfo {
            owner: owner.to_string(),
            acquired_at: Utc::now(),
        };
        let written = serde_json::to_vec(&info)
            .map_err(WorkerError::from)
            .and_then(|bytes| file.write_all(&bytes).map_err(WorkerError::from));
        if let Err(e) = written {
            let _ = fs::remove_file(path);
            return Err(e);
        }
        debug!("Acquired {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }

    /// Re-stamp the lock with the current time.
    ///
    /// Fails with [`WorkerError::Locked`] when another worker has taken the
    /// lock over, and with [`WorkerError::Cancelled`] when the session
    /// directory is gone.
    pub fn refresh(&mut self) -> WorkerResult<()> {
        let current = match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice::<LockInfo>(&bytes).ok(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.path.parent().is_some_and(|dir| !dir.exists()) {
                    return Err(WorkerError::Cancelled);
                }
                None
            }
            Err(e) => return Err(e.into()),
        };
        if current.as_ref() != Some(&self.info) {
            let holder = current
                .map(|info| info.owner)
                .unwrap_or_else(|| "nobody".to_string());
            return Err(WorkerError::locked(format!(
                "{} lost to {}",
                self.path.display(),
                holder
            )));
        }

        let info = LockInfo {
            owner: self.info.owner.clone(),
            acquired_at: Utc::now(),
        };
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let written = serde_json::to_vec(&info)
            .map_err(WorkerError::from)
            .and_then(|bytes| fs::write(&tmp, bytes).map_err(WorkerError::from))
            .and_then(|()| fs::rename(&tmp, &self.path).map_err(WorkerError::from));
        match written {
            Ok(()) => {
                self.info = info;
                Ok(())
            }
            Err(WorkerError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(WorkerError::Cancelled)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e)
            }
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        // Only remove the file if it is still ours.
        if read_info(&self.path).as_ref() != Some(&self.info) {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to release {}: {}", self.path.display(), e);
            }
        }
    }
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Whether the lock at `path` is older than `stale_after`.
///
/// Unreadable contents fall back to the file's modification time.
pub fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let acquired: Option<SystemTime> = read_info(path)
        .map(|info| info.acquired_at.into())
        .or_else(|| fs::metadata(path).and_then(|m| m.modified()).ok());
    match acquired {
        Some(at) => SystemTime::now()
            .duration_since(at)
            .map(|age| age > stale_after)
            .unwrap_or(false),
        None => false,
    }
}

/// Whether a live (non-stale) lock exists at `path`.
pub fn is_held(path: &Path, stale_after: Duration) -> bool {
    path.exists() && !is_stale(path, stale_after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");

        let lock = SessionLock::acquire(&path, "worker-a", HOUR).unwrap();
        assert!(path.exists());
        assert_eq!(lock.info().owner, "worker-a");
        assert!(is_held(&path, HOUR));

        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_is_locked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");

        let _held = SessionLock::acquire(&path, "worker-a", HOUR).unwrap();
        let err = SessionLock::acquire(&path, "worker-b", HOUR).unwrap_err();
        assert!(matches!(err, WorkerError::Locked(ref m) if m.contains("worker-a")));
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");
        let old = LockInfo {
            owner: "crashed".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        fs::write(&path, serde_json::to_vec(&old).unwrap()).unwrap();

        assert!(is_stale(&path, HOUR));
        let lock = SessionLock::acquire(&path, "worker-b", HOUR).unwrap();
        assert_eq!(read_info(&path).unwrap().owner, "worker-b");
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_session_dir_is_cancelled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone").join(".lock");
        let err = SessionLock::acquire(&path, "worker-a", HOUR).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_refresh_restamps_own_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");

        let mut lock = SessionLock::acquire(&path, "worker-a", HOUR).unwrap();
        let first = lock.info().acquired_at;
        std::thread::sleep(Duration::from_millis(5));
        lock.refresh().unwrap();

        assert!(lock.info().acquired_at > first);
        assert_eq!(read_info(&path).as_ref(), Some(lock.info()));
        assert!(!is_stale(&path, Duration::from_secs(1)));
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_refresh_after_takeover_is_locked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");

        let mut lock = SessionLock::acquire(&path, "worker-a", HOUR).unwrap();
        let other = LockInfo {
            owner: "worker-b".to_string(),
            acquired_at: Utc::now(),
        };
        fs::write(&path, serde_json::to_vec(&other).unwrap()).unwrap();

        let err = lock.refresh().unwrap_err();
        assert!(matches!(err, WorkerError::Locked(ref m) if m.contains("worker-b")));
        assert_eq!(read_info(&path), Some(other));
    }

    #[test]
    fn test_refresh_without_session_dir_is_cancelled() {
        let dir = TempDir::new().unwrap();
        let session = dir.path().join("session");
        fs::create_dir(&session).unwrap();
        let mut lock = SessionLock::acquire(session.join(".lock"), "worker-a", HOUR).unwrap();

        fs::remove_dir_all(&session).unwrap();
        assert!(lock.refresh().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_drop_keeps_foreign_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");

        let lock = SessionLock::acquire(&path, "worker-a", HOUR).unwrap();
        let other = LockInfo {
            owner: "worker-b".to_string(),
            acquired_at: Utc::now(),
        };
        fs::write(&path, serde_json::to_vec(&other).unwrap()).unwrap();
        drop(lock);
        assert!(path.exists());
    }
}
