//! FFmpeg-backed frame source.
//!
//! Frames are decoded at a forced constant frame rate and downscaled to the
//! analysis resolution, then streamed over stdout as raw RGB24.

use async_trait::async_trait;
use image::RgbImage;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::analysis::AnalysisConfig;
use crate::command::{collect_stderr_tail, format_fps, FfmpegCommand, PIPE};
use crate::error::{MediaError, MediaResult};
use crate::frame::{analysis_dimensions, Frame, FrameSource, SourceInfo};
use crate::probe::probe_video;

/// Decodes a video file into [`Frame`]s.
pub struct FfmpegFrameSource {
    info: SourceInfo,
    child: Child,
    stdout: ChildStdout,
    stderr_tail: Option<JoinHandle<String>>,
    buffer: Vec<u8>,
    next_index: u64,
    finished: bool,
}

impl FfmpegFrameSource {
    /// Probe `path` and start decoding it.
    pub async fn open(path: impl AsRef<Path>, config: &AnalysisConfig) -> MediaResult<Self> {
        let path = path.as_ref();
        let probe = probe_video(path).await.map_err(into_decode_error)?;
        let (width, height) = analysis_dimensions(probe.width, probe.height, config.analysis_width)
            .map_err(into_decode_error)?;

        let info = SourceInfo {
            width,
            height,
            source_width: probe.width,
            source_height: probe.height,
            fps: probe.fps,
            estimated_frames: probe.frame_count,
        };

        info!(
            "Decoding {}: {}x{} @ {:.2} fps ({}, {:.2}s), ~{} frames, analysis {}x{}",
            path.display(),
            probe.width,
            probe.height,
            probe.fps,
            probe.codec,
            probe.duration,
            probe.frame_count,
            width,
            height
        );

        let cmd = FfmpegCommand::new(path, PIPE)
            .video_filter(format!("fps={},scale={}:{}", format_fps(info.fps), width, height))
            .raw_rgb_output();

        let mut child = cmd.spawn().map_err(into_decode_error)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::decode("Failed to capture FFmpeg stdout"))?;
        let stderr_tail = child.stderr.take().map(collect_stderr_tail);

        Ok(Self {
            info,
            child,
            stdout,
            stderr_tail,
            buffer: vec![0u8; width as usize * height as usize * 3],
            next_index: 0,
            finished: false,
        })
    }

    /// Fill the frame buffer. Returns the number of bytes read before EOF.
    async fn fill_buffer(&mut self) -> MediaResult<usize> {
        let mut filled = 0;
        while filled < self.buffer.len() {
            let n = self.stdout.read(&mut self.buffer[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Reap the child after EOF and surface a non-zero exit as a decode error.
    async fn finish_process(&mut self) -> MediaResult<()> {
        let status = self.child.wait().await?;
        let stderr = match self.stderr_tail.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        if !status.success() {
            return Err(MediaError::decode(format!(
                "FFmpeg exited with {:?} after {} frames: {}",
                status.code(),
                self.next_index,
                stderr.trim()
            )));
        }
        debug!("Decoder finished after {} frames", self.next_index);
        Ok(())
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let filled = self.fill_buffer().await.map_err(into_decode_error)?;
        if filled == 0 {
            self.finished = true;
            self.finish_process().await?;
            return Ok(None);
        }
        if filled < self.buffer.len() {
            self.finished = true;
            let _ = self.child.kill().await;
            return Err(MediaError::decode(format!(
                "Truncated frame {} ({} of {} bytes)",
                self.next_index,
                filled,
                self.buffer.len()
            )));
        }

        let image = RgbImage::from_raw(self.info.width, self.info.height, self.buffer.clone())
            .ok_or_else(|| MediaError::internal("Frame buffer size mismatch"))?;
        let frame = Frame::new(self.next_index, self.info.fps, image);
        self.next_index += 1;
        Ok(Some(frame))
    }
}

/// Everything that goes wrong on the input side is a decode failure.
fn into_decode_error(err: MediaError) -> MediaError {
    match err {
        MediaError::Decode(_) | MediaError::Cancelled => err,
        other => MediaError::decode(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_decode_error_wraps_other_variants() {
        let err = into_decode_error(MediaError::InvalidVideo("No video stream found".into()));
        assert!(matches!(err, MediaError::Decode(ref m) if m.contains("No video stream")));

        let err = into_decode_error(MediaError::decode("bad"));
        assert!(matches!(err, MediaError::Decode(ref m) if m == "bad"));
    }

    #[tokio::test]
    async fn test_open_missing_file_is_decode_error() {
        let config = AnalysisConfig::default();
        let err = FfmpegFrameSource::open("/no/such/original.webm", &config)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MediaError::Decode(_)));
    }
}
