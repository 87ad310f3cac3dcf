//! Per-frame driver for all analysis stages.

use image::RgbImage;
use movan_models::{round_to, AnalyticsRecord, Resolution};
use tracing::debug;

use super::config::AnalysisConfig;
use super::heatmap::HeatmapRenderer;
use super::motion::MotionEstimator;
use super::repetition;
use super::timeline::TimelineBuilder;
use super::zones::ZoneAggregator;
use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, SourceInfo};

/// Runs motion, zones, timeline and heatmap for one recording, frame by frame.
///
/// Frames must be fed in order. Memory use is independent of length apart
/// from the sampled timelines.
pub struct FramePipeline {
    config: AnalysisConfig,
    info: SourceInfo,
    motion: MotionEstimator,
    zones: ZoneAggregator,
    timeline: TimelineBuilder,
    sample_step: f64,
    heatmap: HeatmapRenderer,
    frames: u64,
}

impl FramePipeline {
    pub fn new(config: &AnalysisConfig, info: &SourceInfo) -> Self {
        let interval = config.sample_interval(info.fps);
        Self {
            config: config.clone(),
            info: *info,
            motion: MotionEstimator::new(config),
            zones: ZoneAggregator::new(),
            timeline: TimelineBuilder::new(info.fps, interval),
            sample_step: interval as f64 / info.fps,
            heatmap: HeatmapRenderer::new(info.width, info.height, config),
            frames: 0,
        }
    }

    /// Analyze one frame and return its heatmap frame.
    pub fn process(&mut self, frame: &Frame) -> MediaResult<RgbImage> {
        if frame.index != self.frames {
            return Err(MediaError::internal(format!(
                "Frame {} out of order, expected {}",
                frame.index, self.frames
            )));
        }

        let field = self.motion.estimate(&frame.image)?;
        let zones = self.zones.observe(&field);
        self.timeline
            .push(frame.index, field.intensity, field.has_predecessor, zones);
        let rendered = self.heatmap.render(&field, &frame.image)?;

        self.frames += 1;
        Ok(rendered)
    }

    /// Frames processed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Compute the final analytics.
    pub fn finish(self) -> AnalyticsRecord {
        let timeline = self.timeline.finish();
        let intensity = timeline.intensity;
        let repetition = repetition::analyze(
            &timeline.counted,
            self.sample_step,
            &self.config.repetition,
        );

        debug!(
            "Analysis finished: {} frames, {} timeline points, {} cycles",
            self.frames,
            timeline.points.len(),
            repetition.cycle_count
        );

        AnalyticsRecord {
            duration_seconds: round_to(self.frames as f64 / self.info.fps, 2),
            total_frames: self.frames,
            fps: round_to(self.info.fps, 3),
            resolution: Resolution {
                width: self.info.source_width,
                height: self.info.source_height,
            },
            analysis_resolution: Resolution {
                width: self.info.width,
                height: self.info.height,
            },
            intensity,
            repetition,
            hot_zones: self.zones.hot_zones(),
            active_area_percent: self.zones.active_area_percent(),
            timeline: timeline.points,
            zone_timeline: timeline.zone_points,
        }
    }
}
