#![deny(unreachable_patterns)]
//! Frame I/O and movement analysis for recorded sessions.
//!
//! This crate provides:
//! - FFprobe metadata with fallbacks for browser-recorded WebM
//! - A streaming FFmpeg frame source and heatmap encoder
//! - Motion, zone, timeline, repetition and heatmap stages
//! - Atomic file writes for session documents

pub mod analysis;
pub mod backend;
pub mod command;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod fs_utils;
pub mod probe;

pub use analysis::{AnalysisConfig, FramePipeline, HeatmapStyle, Preprocess};
pub use backend::FfmpegBackend;
pub use command::{check_ffmpeg, check_ffprobe, has_encoder, FfmpegCommand};
pub use decoder::FfmpegFrameSource;
pub use encoder::{EncoderSettings, FfmpegHeatmapEncoder};
pub use error::{MediaError, MediaResult};
pub use frame::{Frame, FrameSink, FrameSource, MediaBackend, SinkSpec, SourceInfo};
pub use probe::{probe_video, VideoInfo};
