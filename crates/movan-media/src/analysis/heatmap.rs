//! Decaying motion heatmap.
//!
//! Every pixel keeps `acc = acc * decay + motion`. Each output frame is the
//! accumulator min-max normalized and mapped through an inferno-like gradient.

use image::{Rgb, RgbImage};

use super::config::{AnalysisConfig, HeatmapStyle};
use super::motion::MotionField;
use crate::error::{MediaError, MediaResult};

#[derive(Debug, Clone, Copy, PartialEq)]
struct ColorStop {
    at: f32,
    color: [u8; 3],
}

const INFERNO: [ColorStop; 5] = [
    ColorStop { at: 0.0, color: [0, 0, 4] },
    ColorStop { at: 0.25, color: [87, 16, 110] },
    ColorStop { at: 0.5, color: [188, 55, 84] },
    ColorStop { at: 0.75, color: [249, 142, 9] },
    ColorStop { at: 1.0, color: [252, 255, 164] },
];

/// Color of a normalized value in `[0, 1]`.
pub fn colorize(value: f32) -> [u8; 3] {
    let clamped = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
    for window in INFERNO.windows(2) {
        let (start, end) = (window[0], window[1]);
        if clamped <= end.at {
            let t = (clamped - start.at) / (end.at - start.at);
            return lerp(start.color, end.color, t);
        }
    }
    INFERNO[INFERNO.len() - 1].color
}

fn lerp(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])]
}

/// Stateful renderer; one per job.
pub struct HeatmapRenderer {
    width: u32,
    height: u32,
    accumulator: Vec<f32>,
    decay: f32,
    style: HeatmapStyle,
    overlay_alpha: f32,
}

impl HeatmapRenderer {
    pub fn new(width: u32, height: u32, config: &AnalysisConfig) -> Self {
        Self {
            width,
            height,
            accumulator: vec![0.0; width as usize * height as usize],
            decay: config.heatmap_decay,
            style: config.heatmap_style,
            overlay_alpha: config.overlay_alpha,
        }
    }

    /// Fold `field` into the accumulator and draw the next output frame.
    ///
    /// `frame` is only read in [`HeatmapStyle::Overlay`].
    pub fn render(&mut self, field: &MotionField, frame: &RgbImage) -> MediaResult<RgbImage> {
        if (field.width, field.height) != (self.width, self.height)
            || frame.dimensions() != (self.width, self.height)
        {
            return Err(MediaError::internal(format!(
                "Heatmap is {}x{} but got field {}x{} and frame {}x{}",
                self.width,
                self.height,
                field.width,
                field.height,
                frame.width(),
                frame.height()
            )));
        }

        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for (acc, motion) in self.accumulator.iter_mut().zip(&field.pixels) {
            *acc = *acc * self.decay + *motion as f32;
            lo = lo.min(*acc);
            hi = hi.max(*acc);
        }
        let range = hi - lo;

        let mut out = RgbImage::new(self.width, self.height);
        for (i, (pixel, src)) in out.pixels_mut().zip(frame.pixels()).enumerate() {
            let value = if range > 0.0 {
                (self.accumulator[i] - lo) / range
            } else {
                0.0
            };
            let color = colorize(value);
            *pixel = match self.style {
                HeatmapStyle::Black => Rgb(color),
                HeatmapStyle::Overlay => Rgb(blend(luma(src), color, self.overlay_alpha)),
            };
        }
        Ok(out)
    }
}

fn luma(p: &Rgb<u8>) -> u8 {
    let [r, g, b] = p.0;
    ((2126 * r as u32 + 7152 * g as u32 + 722 * b as u32) / 10000) as u8
}

fn blend(base: u8, color: [u8; 3], alpha: f32) -> [u8; 3] {
    let mix = |c: u8| (base as f32 * (1.0 - alpha) + c as f32 * alpha).round() as u8;
    [mix(color[0]), mix(color[1]), mix(color[2])]
}
