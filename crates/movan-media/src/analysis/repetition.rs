//! Periodicity of the intensity series.
//!
//! The counted timeline points are resampled onto the sampling grid, then:
//! - the dominant frequency is the strongest bin of a direct DFT of the
//!   mean-removed series
//! - cycles are local maxima rising above a prominence threshold
//! - regularity is `1 - cv` of the intervals between those maxima

use movan_models::{round_to, RepetitionStats, TimelinePoint};

use super::config::RepetitionConfig;

/// A series resampled at a constant step.
#[derive(Debug, Clone)]
struct UniformSeries {
    values: Vec<f64>,
    step: f64,
}

impl UniformSeries {
    /// Linear interpolation of `points` onto a grid of `step` seconds
    /// starting at the first point.
    ///
    /// The grid stops at the last whole step, so a short trailing gap
    /// does not stretch the spacing of the rest.
    fn resample(points: &[TimelinePoint], step: f64) -> Option<Self> {
        let n = points.len();
        if n < 2 || step <= 0.0 {
            return None;
        }
        let start = points[0].time;
        let span = points[n - 1].time - start;
        if span <= 0.0 {
            return None;
        }
        let len = (span / step + 1e-6).floor() as usize + 1;
        if len < 2 {
            return None;
        }

        let mut values = Vec::with_capacity(len);
        let mut j = 0;
        for i in 0..len {
            let t = start + step * i as f64;
            while j + 2 < n && points[j + 1].time < t {
                j += 1;
            }
            let (a, b) = (points[j], points[(j + 1).min(n - 1)]);
            let value = if b.time > a.time {
                let w = ((t - a.time) / (b.time - a.time)).clamp(0.0, 1.0);
                a.intensity + (b.intensity - a.intensity) * w
            } else {
                a.intensity
            };
            values.push(value);
        }
        Some(Self { values, step })
    }

    fn duration(&self) -> f64 {
        self.step * (self.values.len() - 1) as f64
    }

    fn range(&self) -> (f64, f64) {
        self.values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            })
    }
}

/// Analyze the counted timeline points of one recording, sampled every
/// `step` seconds.
pub fn analyze(
    points: &[TimelinePoint],
    step: f64,
    config: &RepetitionConfig,
) -> RepetitionStats {
    let Some(series) = UniformSeries::resample(points, step) else {
        return RepetitionStats::default();
    };

    let peaks = find_peaks(&series.values, config);
    let frequency = dominant_frequency(&series, config).map(|f| round_to(f, 3));

    RepetitionStats {
        cycle_count: peaks.len() as u32,
        cycles_per_minute: frequency.map(|f| round_to(f * 60.0, 1)),
        dominant_frequency_hz: frequency,
        rhythm_regularity: regularity(&peaks, series.step).map(|r| round_to(r, 2)),
    }
}

/// Indices of local maxima above `min + prominence * (max - min)`.
fn find_peaks(values: &[f64], config: &RepetitionConfig) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    if hi - lo <= config.flat_range {
        return Vec::new();
    }
    let floor = lo + config.prominence * (hi - lo);

    (1..values.len() - 1)
        .filter(|&i| values[i] > values[i - 1] && values[i] >= values[i + 1] && values[i] > floor)
        .collect()
}

/// Strongest DFT bin in Hz, or `None` when no frequency stands out.
fn dominant_frequency(series: &UniformSeries, config: &RepetitionConfig) -> Option<f64> {
    let n = series.values.len();
    if n < config.min_samples || series.duration() < config.min_duration_secs {
        return None;
    }
    let (lo, hi) = series.range();
    if hi - lo <= config.flat_range {
        return None;
    }

    let mean = series.values.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = series.values.iter().map(|v| v - mean).collect();

    let magnitudes: Vec<f64> = (1..=n / 2).map(|k| bin_magnitude(&centered, k)).collect();
    let mut best = 0;
    for (i, m) in magnitudes.iter().enumerate() {
        if *m > magnitudes[best] {
            best = i;
        }
    }
    let mean_magnitude = magnitudes.iter().sum::<f64>() / magnitudes.len() as f64;
    if mean_magnitude <= 0.0 || magnitudes[best] < config.noise_floor * mean_magnitude {
        return None;
    }

    let k = (best + 1) as f64;
    Some(k / (n as f64 * series.step))
}

fn bin_magnitude(values: &[f64], k: usize) -> f64 {
    let n = values.len() as f64;
    let (mut re, mut im) = (0.0, 0.0);
    for (t, v) in values.iter().enumerate() {
        let angle = -2.0 * std::f64::consts::PI * k as f64 * t as f64 / n;
        re += v * angle.cos();
        im += v * angle.sin();
    }
    (re * re + im * im).sqrt()
}

/// `clamp(1 - std/mean, 0, 1)` of peak-to-peak intervals; needs 3 peaks.
fn regularity(peaks: &[usize], step: f64) -> Option<f64> {
    if peaks.len() < 3 {
        return None;
    }
    let intervals: Vec<f64> = peaks
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 * step)
        .collect();
    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    if mean <= 0.0 {
        return None;
    }
    let variance =
        intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
    Some((1.0 - variance.sqrt() / mean).clamp(0.0, 1.0))
}
