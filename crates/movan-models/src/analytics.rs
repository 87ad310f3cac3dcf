//! The `analytics.json` payload consumed by the playback view.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One cell of the 3x3 spatial grid, in row-major order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ZoneCode {
    Tl,
    Tc,
    Tr,
    Ml,
    Mc,
    Mr,
    Bl,
    Bc,
    Br,
}

impl ZoneCode {
    /// All zones, row-major (top-left first).
    pub const ALL: [ZoneCode; 9] = [
        ZoneCode::Tl,
        ZoneCode::Tc,
        ZoneCode::Tr,
        ZoneCode::Ml,
        ZoneCode::Mc,
        ZoneCode::Mr,
        ZoneCode::Bl,
        ZoneCode::Bc,
        ZoneCode::Br,
    ];

    /// Zone at grid column `col` and row `row` (both 0..3).
    pub fn from_grid(col: usize, row: usize) -> Option<Self> {
        if col < 3 && row < 3 {
            Some(Self::ALL[row * 3 + col])
        } else {
            None
        }
    }

    /// Row-major index (0..9).
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneCode::Tl => "tl",
            ZoneCode::Tc => "tc",
            ZoneCode::Tr => "tr",
            ZoneCode::Ml => "ml",
            ZoneCode::Mc => "mc",
            ZoneCode::Mr => "mr",
            ZoneCode::Bl => "bl",
            ZoneCode::Bc => "bc",
            ZoneCode::Br => "br",
        }
    }
}

impl fmt::Display for ZoneCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Zone code to percentage (0-100). Ordered, so serialization is stable.
pub type ZoneMap = BTreeMap<ZoneCode, f64>;

/// Round `value` to `decimals` places (half away from zero).
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// One point of the scalar intensity series: the mean over the frames
/// since the previous point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimelinePoint {
    /// Seconds from the start of the recording
    pub time: f64,
    /// Mean thresholded frame difference (0-255 scale)
    pub intensity: f64,
}

/// Zone percentages over the frames since the previous point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ZoneTimelinePoint {
    pub time: f64,
    pub zones: ZoneMap,
}

/// Aggregate intensity statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct IntensitySummary {
    pub average: f64,
    pub peak: f64,
    /// Time of the first sample reaching `peak`
    pub peak_time: f64,
}

/// Periodicity of the movement.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct RepetitionStats {
    pub cycle_count: u32,
    pub cycles_per_minute: Option<f64>,
    pub dominant_frequency_hz: Option<f64>,
    /// 1 - coefficient of variation of peak intervals, in [0, 1]
    pub rhythm_regularity: Option<f64>,
}

/// Frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Complete analytics for one session. Written once, when the job completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalyticsRecord {
    /// Length of the recording, `total_frames / fps`. Timelines end at the
    /// start of the last frame, one frame period earlier.
    pub duration_seconds: f64,
    pub total_frames: u64,
    pub fps: f64,
    /// Resolution of the source recording
    pub resolution: Resolution,
    /// Resolution the motion field was computed at
    pub analysis_resolution: Resolution,
    pub intensity: IntensitySummary,
    pub repetition: RepetitionStats,
    /// Time-aggregated zone activity, busiest zone = 100
    pub hot_zones: ZoneMap,
    /// Share of the frame (percent) that saw sustained movement
    pub active_area_percent: f64,
    pub timeline: Vec<TimelinePoint>,
    pub zone_timeline: Vec<ZoneTimelinePoint>,
}

impl AnalyticsRecord {
    /// Zone with the highest aggregate activity, if any moved at all.
    ///
    /// Ties resolve to the first zone in row-major order.
    pub fn dominant_zone(&self) -> Option<ZoneCode> {
        let mut best: Option<(ZoneCode, f64)> = None;
        for zone in ZoneCode::ALL {
            let value = self.hot_zones.get(&zone).copied().unwrap_or(0.0);
            if value > 0.0 && best.map_or(true, |(_, v)| value > v) {
                best = Some((zone, value));
            }
        }
        best.map(|(zone, _)| zone)
    }
}
