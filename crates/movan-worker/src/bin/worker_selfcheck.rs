use std::path::Path;

use serde_json::Value;

use movan_media::{check_ffmpeg, check_ffprobe, has_encoder};
use movan_models::schema::{analytics_schema, job_schema, missing_required};
use movan_models::JobStatus;
use movan_worker::{SessionStore, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with sessions_dir={}",
        config.sessions_dir.display()
    );
    ensure_sessions_dir(&config.sessions_dir).await?;
    ensure_tools().await?;
    check_session_documents(&config.sessions_dir).await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_sessions_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;

    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("{} is not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

async fn ensure_tools() -> anyhow::Result<()> {
    check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;

    let vp8 = has_encoder("libvpx")
        .await
        .map_err(|e| anyhow::anyhow!("ffmpeg -encoders failed: {}", e))?;
    if !vp8 {
        return Err(anyhow::anyhow!("ffmpeg was built without the libvpx encoder"));
    }
    Ok(())
}

/// Report session documents that lack fields readers depend on.
async fn check_session_documents(root: &Path) -> anyhow::Result<()> {
    let store = SessionStore::new(root);
    let job_schema = job_schema();
    let analytics_schema = analytics_schema();

    let sessions = store.list().await?;
    let mut invalid = 0;
    for entry in &sessions {
        let paths = store.paths(&entry.name);
        let mut problems =
            missing_fields(&paths.job, |doc| missing_required(&job_schema, doc)).await;
        if entry.job.as_ref().map(|job| job.status) == Some(JobStatus::Done) {
            problems.extend(
                missing_fields(&paths.analytics, |doc| missing_required(&analytics_schema, doc))
                    .await,
            );
        }
        if !problems.is_empty() {
            invalid += 1;
            println!(
                "worker-selfcheck: session {}: {}",
                entry.name,
                problems.join(", ")
            );
        }
    }
    println!(
        "worker-selfcheck: {} sessions, {} with invalid documents",
        sessions.len(),
        invalid
    );
    Ok(())
}

async fn missing_fields(path: &Path, check: impl Fn(&Value) -> Vec<String>) -> Vec<String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => return vec![format!("{} unreadable: {}", name, e)],
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(document) => check(&document)
            .into_iter()
            .map(|field| format!("{} lacks {}", name, field))
            .collect(),
        Err(e) => vec![format!("{} is not JSON: {}", name, e)],
    }
}
