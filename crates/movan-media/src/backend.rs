//! Production [`MediaBackend`] built on the FFmpeg CLI.

use async_trait::async_trait;
use std::path::Path;

use crate::analysis::AnalysisConfig;
use crate::decoder::FfmpegFrameSource;
use crate::encoder::{EncoderSettings, FfmpegHeatmapEncoder};
use crate::error::MediaResult;
use crate::frame::{FrameSink, FrameSource, MediaBackend, SinkSpec};

/// Decodes with `ffmpeg ... -f rawvideo -` and encodes with `ffmpeg -i - ... webm`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    encoder: EncoderSettings,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn open_source(
        &self,
        path: &Path,
        config: &AnalysisConfig,
    ) -> MediaResult<Box<dyn FrameSource>> {
        let source = FfmpegFrameSource::open(path, config).await?;
        Ok(Box::new(source))
    }

    async fn create_sink(&self, path: &Path, spec: &SinkSpec) -> MediaResult<Box<dyn FrameSink>> {
        let sink = FfmpegHeatmapEncoder::create(path, spec, &self.encoder)?;
        Ok(Box::new(sink))
    }
}
