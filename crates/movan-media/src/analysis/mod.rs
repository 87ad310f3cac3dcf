//! Movement analysis stages.
//!
//! Everything here is pure computation over in-memory frames; the FFmpeg
//! plumbing lives in [`crate::decoder`] and [`crate::encoder`].
//!
//! ```text
//! Frame -> MotionEstimator -> MotionField -+-> ZoneAggregator -> TimelineBuilder
//!                                          +-> HeatmapRenderer -> RgbImage
//! ```

pub mod config;
pub mod heatmap;
pub mod motion;
pub mod pipeline;
pub mod repetition;
pub mod timeline;
pub mod zones;

pub use config::{AnalysisConfig, HeatmapStyle, Preprocess, RepetitionConfig, BLOCK_GRID};
pub use heatmap::{colorize, HeatmapRenderer};
pub use motion::{MotionEstimator, MotionField};
pub use pipeline::FramePipeline;
pub use timeline::{Timeline, TimelineBuilder};
pub use zones::ZoneAggregator;
