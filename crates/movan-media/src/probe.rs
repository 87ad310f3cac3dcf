//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Frame rate used when the container reports nothing usable.
pub const FALLBACK_FPS: f64 = 30.0;
/// Highest frame rate accepted from container metadata.
pub const MAX_TRUSTED_FPS: f64 = 120.0;

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps), already sanitized
    pub fps: f64,
    /// Video codec
    pub codec: String,
    /// Best-effort frame count
    pub frame_count: u64,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
    duration: Option<String>,
}

/// Probe a video file for information.
///
/// WebM files written by browser `MediaRecorder` usually lack a frame count
/// and report a bogus frame rate, so both go through fallbacks.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let stdout = run_ffprobe(
        path,
        &["-print_format", "json", "-show_format", "-show_streams"],
    )
    .await?;
    let probe: FfprobeOutput = serde_json::from_slice(&stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let width = video_stream.width.unwrap_or(0);
    let height = video_stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(MediaError::InvalidVideo(format!(
            "Video stream has no usable dimensions ({}x{})",
            width, height
        )));
    }

    let duration = video_stream
        .duration
        .as_deref()
        .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0);

    let fps = sanitize_fps(
        video_stream
            .avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .filter(|f| *f > 0.0)
            .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate)),
    );

    let reported = video_stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok());
    let counted = if reported.filter(|n| *n > 0).is_none() {
        count_packets(path).await.unwrap_or_else(|e| {
            debug!("Packet count unavailable for {}: {}", path.display(), e);
            None
        })
    } else {
        None
    };

    Ok(VideoInfo {
        duration,
        width,
        height,
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        frame_count: resolve_frame_count(reported, counted, duration, fps),
    })
}

/// Count video packets without decoding (`nb_read_packets`).
async fn count_packets(path: &Path) -> MediaResult<Option<u64>> {
    let stdout = run_ffprobe(
        path,
        &[
            "-select_streams",
            "v:0",
            "-count_packets",
            "-show_entries",
            "stream=nb_read_packets",
            "-print_format",
            "json",
        ],
    )
    .await?;
    let probe: FfprobeOutput = serde_json::from_slice(&stdout)?;
    Ok(probe
        .streams
        .first()
        .and_then(|s| s.nb_read_packets.as_deref())
        .and_then(|n| n.parse::<u64>().ok()))
}

async fn run_ffprobe(path: &Path, args: &[&str]) -> MediaResult<Vec<u8>> {
    let ffprobe = check_ffprobe()?;

    let output = Command::new(ffprobe)
        .args(["-v", "error"])
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    Ok(output.stdout)
}

/// Pick the frame-count estimate: container count, packet count, then
/// duration x fps.
pub fn resolve_frame_count(
    reported: Option<u64>,
    counted: Option<u64>,
    duration: f64,
    fps: f64,
) -> u64 {
    reported
        .filter(|n| *n > 0)
        .or(counted.filter(|n| *n > 0))
        .unwrap_or_else(|| (duration * fps).round().max(0.0) as u64)
}

/// Replace missing or implausible frame rates with [`FALLBACK_FPS`].
pub fn sanitize_fps(fps: Option<f64>) -> f64 {
    match fps {
        Some(f) if f.is_finite() && f > 0.0 && f <= MAX_TRUSTED_FPS => f,
        _ => FALLBACK_FPS,
    }
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}
