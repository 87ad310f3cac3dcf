//! Sampled intensity and zone timelines.
//!
//! Every frame lands in the window of the next sampled frame, so a timeline
//! point is the mean over its window rather than one instantaneous
//! difference. Summary statistics are kept per frame.

use movan_models::{round_to, IntensitySummary, TimelinePoint, ZoneTimelinePoint};

use super::zones::normalize;

/// Frames accumulated since the previous timeline point.
#[derive(Debug, Clone, Default)]
struct Window {
    intensity: f64,
    zones: [f64; 9],
    counted: u64,
}

impl Window {
    fn add(&mut self, intensity: f64, zone_sums: &[f64; 9]) {
        self.intensity += intensity;
        for (total, sum) in self.zones.iter_mut().zip(zone_sums) {
            *total += sum;
        }
        self.counted += 1;
    }

    fn mean(&self) -> f64 {
        if self.counted == 0 {
            0.0
        } else {
            self.intensity / self.counted as f64
        }
    }
}

/// Finished timelines of one recording.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub points: Vec<TimelinePoint>,
    pub zone_points: Vec<ZoneTimelinePoint>,
    /// Points whose window held at least one frame with a predecessor;
    /// input to repetition analysis
    pub counted: Vec<TimelinePoint>,
    /// Average, peak and time of first peak over every frame with a
    /// predecessor
    pub intensity: IntensitySummary,
}

/// Collects one point per `interval` frames plus the final frame.
#[derive(Debug)]
pub struct TimelineBuilder {
    fps: f64,
    interval: u64,
    timeline: Timeline,
    window: Window,
    last_index: Option<u64>,
    pending_tail: bool,
    last_time: Option<f64>,
    total: f64,
    frames: u64,
    peak: Option<(f64, u64)>,
}

impl TimelineBuilder {
    pub fn new(fps: f64, interval: u64) -> Self {
        Self {
            fps,
            interval: interval.max(1),
            timeline: Timeline::default(),
            window: Window::default(),
            last_index: None,
            pending_tail: false,
            last_time: None,
            total: 0.0,
            frames: 0,
            peak: None,
        }
    }

    /// Add frame `index` with its intensity and raw zone sums.
    pub fn push(
        &mut self,
        index: u64,
        intensity: f64,
        has_predecessor: bool,
        zone_sums: [f64; 9],
    ) {
        if has_predecessor {
            self.window.add(intensity, &zone_sums);
            self.total += intensity;
            self.frames += 1;
            if self.peak.map_or(true, |(peak, _)| intensity > peak) {
                self.peak = Some((intensity, index));
            }
        }
        self.last_index = Some(index);

        if index % self.interval == 0 {
            self.pending_tail = false;
            self.close(index);
        } else {
            self.pending_tail = true;
        }
    }

    /// Number of points recorded so far.
    pub fn len(&self) -> usize {
        self.timeline.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.points.is_empty()
    }

    /// Emit the current window as a point at frame `index`.
    ///
    /// A window whose rounded time collides with the previous point is
    /// merged into the next one.
    fn close(&mut self, index: u64) {
        let time = round_to(index as f64 / self.fps, 2);
        if self.last_time.is_some_and(|last| time <= last) {
            return;
        }
        self.last_time = Some(time);

        let window = std::mem::take(&mut self.window);
        let point = TimelinePoint {
            time,
            intensity: round_to(window.mean(), 2),
        };
        self.timeline.points.push(point);
        self.timeline.zone_points.push(ZoneTimelinePoint {
            time,
            zones: normalize(&window.zones),
        });
        if window.counted > 0 {
            self.timeline.counted.push(point);
        }
    }

    fn summary(&self) -> IntensitySummary {
        let Some((peak, peak_index)) = self.peak else {
            return IntensitySummary::default();
        };
        let peak = round_to(peak, 2);
        IntensitySummary {
            average: round_to(self.total / self.frames as f64, 2),
            peak,
            peak_time: if peak > 0.0 {
                round_to(peak_index as f64 / self.fps, 2)
            } else {
                0.0
            },
        }
    }

    pub fn finish(mut self) -> Timeline {
        if self.pending_tail {
            if let Some(index) = self.last_index {
                self.close(index);
            }
        }
        self.timeline.intensity = self.summary();
        self.timeline
    }
}
