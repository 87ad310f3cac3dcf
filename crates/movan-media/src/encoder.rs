//! FFmpeg-backed heatmap encoder.
//!
//! Rendered frames are piped into FFmpeg as raw RGB24, scaled back to the
//! recording's resolution and encoded as VP8/WebM.

use async_trait::async_trait;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::{collect_stderr_tail, FfmpegCommand, PIPE};
use crate::error::{MediaError, MediaResult};
use crate::frame::{FrameSink, SinkSpec};

/// Encoding parameters for the heatmap video.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub codec: String,
    pub bitrate: String,
    pub deadline: String,
    pub cpu_used: u8,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: "libvpx".to_string(),
            bitrate: "1M".to_string(),
            deadline: "realtime".to_string(),
            cpu_used: 8,
        }
    }
}

impl EncoderSettings {
    fn command(&self, path: &Path, spec: &SinkSpec) -> FfmpegCommand {
        FfmpegCommand::new(PIPE, path)
            .raw_rgb_input(spec.width, spec.height, spec.fps)
            .video_filter(format!("scale={}:{}", spec.output_width, spec.output_height))
            .video_codec(&self.codec)
            .output_arg("-b:v")
            .output_arg(&self.bitrate)
            .output_arg("-deadline")
            .output_arg(&self.deadline)
            .output_arg("-cpu-used")
            .output_arg(self.cpu_used.to_string())
            .output_arg("-pix_fmt")
            .output_arg("yuv420p")
            .no_audio()
            .format("webm")
    }
}

/// Writes frames to a WebM file through an FFmpeg child process.
pub struct FfmpegHeatmapEncoder {
    path: PathBuf,
    spec: SinkSpec,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_tail: Option<JoinHandle<String>>,
    frames: u64,
}

impl FfmpegHeatmapEncoder {
    /// Start FFmpeg writing to `path`.
    pub fn create(
        path: impl AsRef<Path>,
        spec: &SinkSpec,
        settings: &EncoderSettings,
    ) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let cmd = settings.command(&path, spec);
        let mut child = cmd.spawn().map_err(|e| MediaError::encode(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::encode("Failed to capture FFmpeg stdin"))?;
        let stderr_tail = child.stderr.take().map(collect_stderr_tail);

        debug!(
            "Heatmap encoder started: {}x{} -> {}x{} @ {} fps -> {}",
            spec.width,
            spec.height,
            spec.output_width,
            spec.output_height,
            spec.fps,
            path.display()
        );

        Ok(Self {
            path,
            spec: *spec,
            child,
            stdin: Some(stdin),
            stderr_tail,
            frames: 0,
        })
    }

    async fn stderr(&mut self) -> String {
        match self.stderr_tail.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl FrameSink for FfmpegHeatmapEncoder {
    async fn write_frame(&mut self, image: &RgbImage) -> MediaResult<()> {
        if image.dimensions() != (self.spec.width, self.spec.height) {
            return Err(MediaError::encode(format!(
                "Frame is {}x{}, encoder expects {}x{}",
                image.width(),
                image.height(),
                self.spec.width,
                self.spec.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::encode("Encoder input already closed"))?;
        if let Err(e) = stdin.write_all(image.as_raw()).await {
            let stderr = self.stderr().await;
            return Err(MediaError::encode(format!(
                "Writing frame {} failed: {} {}",
                self.frames,
                e,
                stderr.trim()
            )));
        }
        self.frames += 1;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> MediaResult<u64> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .shutdown()
                .await
                .map_err(|e| MediaError::encode(format!("Closing encoder input failed: {}", e)))?;
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| MediaError::encode(e.to_string()))?;
        let stderr = self.stderr().await;
        if !status.success() {
            return Err(MediaError::encode(format!(
                "FFmpeg exited with {:?}: {}",
                status.code(),
                stderr.trim()
            )));
        }
        debug!("Heatmap encoded: {} frames -> {}", self.frames, self.path.display());
        Ok(self.frames)
    }

    async fn abort(mut self: Box<Self>) {
        self.stdin.take();
        if let Err(e) = self.child.kill().await {
            warn!("Failed to stop heatmap encoder: {}", e);
        }
    }
}
