//! 3x3 spatial zone aggregation.

use movan_models::{round_to, ZoneCode, ZoneMap};

use super::config::BLOCK_GRID;
use super::motion::MotionField;

/// Blocks per zone along each axis.
const BLOCKS_PER_ZONE: usize = BLOCK_GRID / 3;

/// A block counts towards the active area when its aggregate exceeds this
/// fraction of the busiest block.
const ACTIVE_BLOCK_FRACTION: f64 = 0.1;

/// Sum a block field into the nine zones, row-major.
pub fn zone_sums(field: &MotionField) -> [f64; 9] {
    sum_blocks(&field.blocks)
}

fn sum_blocks(blocks: &[f64]) -> [f64; 9] {
    let mut sums = [0.0; 9];
    for by in 0..BLOCK_GRID {
        for bx in 0..BLOCK_GRID {
            let zone = (by / BLOCKS_PER_ZONE) * 3 + bx / BLOCKS_PER_ZONE;
            sums[zone] += blocks[by * BLOCK_GRID + bx];
        }
    }
    sums
}

/// Scale zone sums so the busiest zone reads 100, one decimal.
///
/// All zones read 0 when nothing moved.
pub fn normalize(sums: &[f64; 9]) -> ZoneMap {
    let max = sums.iter().copied().fold(0.0, f64::max);
    ZoneCode::ALL
        .iter()
        .map(|zone| {
            let value = if max > 0.0 {
                round_to(100.0 * sums[zone.index()] / max, 1)
            } else {
                0.0
            };
            (*zone, value)
        })
        .collect()
}

/// Per-frame zone percentages plus whole-recording aggregates.
#[derive(Debug, Clone)]
pub struct ZoneAggregator {
    block_totals: Vec<f64>,
    frames: u64,
}

impl Default for ZoneAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneAggregator {
    pub fn new() -> Self {
        Self {
            block_totals: vec![0.0; BLOCK_GRID * BLOCK_GRID],
            frames: 0,
        }
    }

    /// Record one frame and return its raw zone sums.
    ///
    /// Frames without a predecessor are reported (all zero) but not
    /// accumulated.
    pub fn observe(&mut self, field: &MotionField) -> [f64; 9] {
        if field.has_predecessor {
            for (total, block) in self.block_totals.iter_mut().zip(&field.blocks) {
                *total += block;
            }
            self.frames += 1;
        }
        zone_sums(field)
    }

    /// Frames that contributed to the aggregates.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Time-aggregated zone activity, busiest zone = 100.
    pub fn hot_zones(&self) -> ZoneMap {
        normalize(&sum_blocks(&self.block_totals))
    }

    /// Percentage of blocks with sustained movement, one decimal.
    pub fn active_area_percent(&self) -> f64 {
        let max = self.block_totals.iter().copied().fold(0.0, f64::max);
        if max <= 0.0 {
            return 0.0;
        }
        let active = self
            .block_totals
            .iter()
            .filter(|b| **b > max * ACTIVE_BLOCK_FRACTION)
            .count();
        round_to(100.0 * active as f64 / self.block_totals.len() as f64, 1)
    }
}
