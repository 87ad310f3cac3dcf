//! Frame stream abstractions.
//!
//! The job controller only talks to these traits; [`crate::backend::FfmpegBackend`]
//! is the production implementation.

use async_trait::async_trait;
use image::RgbImage;
use std::path::Path;

use crate::analysis::AnalysisConfig;
use crate::error::{MediaError, MediaResult};

/// A decoded frame. Lives only for one pipeline step.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Sequence index, starting at 0
    pub index: u64,
    /// Presentation time in seconds (`index / fps`)
    pub timestamp: f64,
    /// Pixels at analysis resolution
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, fps: f64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp: index as f64 / fps,
            image,
        }
    }
}

/// What a source knows before the first frame is read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    /// Analysis width
    pub width: u32,
    /// Analysis height
    pub height: u32,
    /// Width of the recording
    pub source_width: u32,
    /// Height of the recording
    pub source_height: u32,
    /// Constant output frame rate
    pub fps: f64,
    /// Best-effort frame count
    pub estimated_frames: u64,
}

/// Output parameters for the heatmap video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinkSpec {
    /// Width of frames handed to the sink
    pub width: u32,
    /// Height of frames handed to the sink
    pub height: u32,
    /// Width of the encoded video
    pub output_width: u32,
    /// Height of the encoded video
    pub output_height: u32,
    pub fps: f64,
}

impl SinkSpec {
    /// Encode at the recording's resolution and frame rate.
    pub fn matching(info: &SourceInfo) -> Self {
        Self {
            width: info.width,
            height: info.height,
            output_width: even(info.source_width),
            output_height: even(info.source_height),
            fps: info.fps,
        }
    }
}

/// Lazy, finite, forward-only frame sequence.
#[async_trait]
pub trait FrameSource: Send {
    fn info(&self) -> &SourceInfo;

    /// Next frame, or `None` once the stream is exhausted.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;
}

/// Consumer of rendered frames.
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, image: &RgbImage) -> MediaResult<()>;

    /// Flush and close the output. Returns the number of frames written.
    async fn finish(self: Box<Self>) -> MediaResult<u64>;

    /// Stop without producing valid output.
    async fn abort(self: Box<Self>);
}

/// Opens frame sources and sinks.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn open_source(
        &self,
        path: &Path,
        config: &AnalysisConfig,
    ) -> MediaResult<Box<dyn FrameSource>>;

    async fn create_sink(&self, path: &Path, spec: &SinkSpec) -> MediaResult<Box<dyn FrameSink>>;
}

/// Downscaled analysis size preserving aspect ratio, both sides even.
pub fn analysis_dimensions(
    source_width: u32,
    source_height: u32,
    analysis_width: u32,
) -> MediaResult<(u32, u32)> {
    if source_width == 0 || source_height == 0 {
        return Err(MediaError::InvalidVideo(format!(
            "Invalid source dimensions {}x{}",
            source_width, source_height
        )));
    }
    let width = even(analysis_width.min(source_width));
    let height = (source_height as f64 * width as f64 / source_width as f64).round() as u32;
    Ok((width, even(height)))
}

fn even(v: u32) -> u32 {
    (v & !1).max(2)
}
