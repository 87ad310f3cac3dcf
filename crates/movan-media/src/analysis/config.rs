//! Configuration for the analysis stages.
//!
//! The defaults reproduce what the web playback view was tuned against:
//! a 320px wide analysis image, a noise floor of 25 grey levels and a
//! heatmap trail that fades over roughly a second at 30 fps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side length of the square block grid the motion field is pooled into.
///
/// A multiple of 3 so that each zone covers exactly `BLOCK_GRID / 3` blocks
/// per axis.
pub const BLOCK_GRID: usize = 24;

/// How a frame is reduced to one channel before differencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocess {
    /// Luma only
    #[default]
    Grayscale,
    /// Edge magnitude of a 4-bit quantized luma image
    Sobel,
}

impl Preprocess {
    pub fn as_str(&self) -> &'static str {
        match self {
            Preprocess::Grayscale => "grayscale",
            Preprocess::Sobel => "sobel",
        }
    }
}

impl fmt::Display for Preprocess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preprocess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grayscale" | "gray" | "luma" => Ok(Preprocess::Grayscale),
            "sobel" | "edges" => Ok(Preprocess::Sobel),
            other => Err(format!("unknown preprocess mode: {}", other)),
        }
    }
}

/// Background the heatmap is drawn over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatmapStyle {
    /// Gradient over black
    #[default]
    Black,
    /// Gradient alpha-blended over the grayscale recording
    Overlay,
}

impl HeatmapStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeatmapStyle::Black => "black",
            HeatmapStyle::Overlay => "overlay",
        }
    }
}

impl fmt::Display for HeatmapStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeatmapStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "black" => Ok(HeatmapStyle::Black),
            "overlay" => Ok(HeatmapStyle::Overlay),
            other => Err(format!("unknown heatmap style: {}", other)),
        }
    }
}

/// Parameters of the periodicity estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepetitionConfig {
    /// Shortest series (seconds) a frequency is reported for.
    pub min_duration_secs: f64,

    /// Fewest samples a frequency is reported for.
    pub min_samples: usize,

    /// The strongest spectral bin must be at least this many times the
    /// mean bin magnitude.
    pub noise_floor: f64,

    /// A local maximum counts as a cycle when it rises above
    /// `min + prominence * (max - min)`.
    pub prominence: f64,

    /// Series whose range is at or below this are treated as flat.
    pub flat_range: f64,
}

impl Default for RepetitionConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 4.0,
            min_samples: 10,
            noise_floor: 3.0,
            prominence: 0.5,
            flat_range: 1e-3,
        }
    }
}

/// Configuration shared by every analysis stage of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Width frames are downscaled to before analysis (pixels).
    ///
    /// Height follows the source aspect ratio. Sources narrower than this
    /// are analyzed at native width.
    pub analysis_width: u32,

    /// Single-channel reduction applied before differencing.
    pub preprocess: Preprocess,

    /// Gaussian blur sigma applied after preprocessing (0 = off).
    pub blur_sigma: f32,

    /// Per-pixel differences below this (0-255) are treated as noise.
    pub noise_threshold: u8,

    /// Timeline samples per second.
    pub timeline_hz: f64,

    /// Heatmap accumulator decay per frame (0-1).
    pub heatmap_decay: f32,

    pub heatmap_style: HeatmapStyle,

    /// Weight of the heatmap over the recording in [`HeatmapStyle::Overlay`].
    pub overlay_alpha: f32,

    pub repetition: RepetitionConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analysis_width: 320,
            preprocess: Preprocess::Grayscale,
            blur_sigma: 0.0,
            noise_threshold: 25,
            timeline_hz: 10.0,
            heatmap_decay: 0.95,
            heatmap_style: HeatmapStyle::Black,
            overlay_alpha: 0.6,
            repetition: RepetitionConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Builder-style setter for the analysis width (at least 24 pixels).
    pub fn with_analysis_width(mut self, width: u32) -> Self {
        self.analysis_width = width.max(BLOCK_GRID as u32);
        self
    }

    pub fn with_preprocess(mut self, preprocess: Preprocess) -> Self {
        self.preprocess = preprocess;
        self
    }

    pub fn with_blur_sigma(mut self, sigma: f32) -> Self {
        self.blur_sigma = sigma.max(0.0);
        self
    }

    pub fn with_noise_threshold(mut self, threshold: u8) -> Self {
        self.noise_threshold = threshold;
        self
    }

    pub fn with_timeline_hz(mut self, hz: f64) -> Self {
        if hz.is_finite() && hz > 0.0 {
            self.timeline_hz = hz;
        }
        self
    }

    pub fn with_heatmap_decay(mut self, decay: f32) -> Self {
        self.heatmap_decay = decay.clamp(0.0, 1.0);
        self
    }

    pub fn with_heatmap_style(mut self, style: HeatmapStyle) -> Self {
        self.heatmap_style = style;
        self
    }

    pub fn with_overlay_alpha(mut self, alpha: f32) -> Self {
        self.overlay_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    /// Frames between timeline samples at `fps`.
    pub fn sample_interval(&self, fps: f64) -> u64 {
        ((fps / self.timeline_hz).round() as u64).max(1)
    }
}
