//! Clock and timing utilities for export timestamps.
//!
//! Exported frames live on a constant-rate timeline that starts at zero:
//! frame `i` is presented at `i * 1_000_000 / fps` microseconds no matter
//! where it came from in the source. This module provides:
//! - Export timestamp and frame-count arithmetic
//! - Wall-clock progress timing for ETA estimates

use std::time::Instant;

/// Tolerance applied before rounding frame counts up, so that values such as
/// `0.1 * 30.0 = 3.0000000000000004` do not produce an extra frame.
const FRAME_COUNT_EPSILON: f64 = 1e-6;

/// Constant frame-rate clock for the export timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    fps: f64,
}

impl FrameClock {
    /// Create a clock for the given output frame rate.
    ///
    /// Non-finite or non-positive rates are clamped to 1 fps.
    pub fn new(fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 1.0 };
        Self { fps }
    }

    /// Frames per second.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Duration of one output frame in microseconds.
    pub fn frame_duration_us(&self) -> f64 {
        1_000_000.0 / self.fps
    }

    /// Presentation timestamp of an output frame in microseconds.
    pub fn export_timestamp_us(&self, frame_index: u64) -> i64 {
        (frame_index as f64 * self.frame_duration_us()).round() as i64
    }

    /// Number of output frames covering `duration_secs`, rounded up.
    pub fn frame_count(&self, duration_secs: f64) -> u64 {
        frame_count(duration_secs, self.fps)
    }
}

/// `ceil(duration_secs * fps)` with a small tolerance against float noise.
pub fn frame_count(duration_secs: f64, fps: f64) -> u64 {
    if !(duration_secs > 0.0) || !(fps > 0.0) {
        return 0;
    }
    (duration_secs * fps - FRAME_COUNT_EPSILON).ceil().max(0.0) as u64
}

/// Convert milliseconds to seconds.
pub fn ms_to_secs(ms: f64) -> f64 {
    ms / 1_000.0
}

/// Convert microseconds to seconds.
pub fn us_to_secs(us: i64) -> f64 {
    us as f64 / 1_000_000.0
}

/// Convert seconds to microseconds.
pub fn secs_to_us(secs: f64) -> i64 {
    (secs * 1_000_000.0).round() as i64
}

/// Wall-clock stopwatch for an export run, used for ETA reporting.
#[derive(Debug, Clone)]
pub struct ExportStopwatch {
    started: Instant,
}

impl ExportStopwatch {
    /// Start timing now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Seconds elapsed since start.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Estimated seconds remaining after `done` of `total` units.
    pub fn eta_secs(&self, done: u64, total: u64) -> f64 {
        estimate_remaining_secs(self.elapsed_secs(), done, total)
    }
}

/// Linear ETA: average time per finished unit times the units left.
pub fn estimate_remaining_secs(elapsed_secs: f64, done: u64, total: u64) -> f64 {
    if done == 0 || done >= total {
        return 0.0;
    }
    elapsed_secs / done as f64 * (total - done) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_timestamps() {
        let clock = FrameClock::new(30.0);
        assert_eq!(clock.export_timestamp_us(0), 0);
        assert_eq!(clock.export_timestamp_us(1), 33_333);
        assert_eq!(clock.export_timestamp_us(30), 1_000_000);
    }

    #[test]
    fn test_frame_count_rounds_up() {
        assert_eq!(frame_count(10.0, 30.0), 300);
        assert_eq!(frame_count(8.0, 30.0), 240);
        assert_eq!(frame_count(0.5, 24.0), 12);
        assert_eq!(frame_count(0.51, 24.0), 13);
    }

    #[test]
    fn test_frame_count_ignores_float_noise() {
        assert_eq!(frame_count(0.1, 30.0), 3);
        assert_eq!(frame_count(0.7, 30.0), 21);
    }

    #[test]
    fn test_frame_count_degenerate_inputs() {
        assert_eq!(frame_count(0.0, 30.0), 0);
        assert_eq!(frame_count(-1.0, 30.0), 0);
        assert_eq!(frame_count(f64::NAN, 30.0), 0);
        assert_eq!(FrameClock::new(0.0).fps(), 1.0);
    }

    #[test]
    fn test_eta_estimate() {
        assert_eq!(estimate_remaining_secs(10.0, 0, 100), 0.0);
        assert!((estimate_remaining_secs(10.0, 50, 100) - 10.0).abs() < 1e-9);
        assert_eq!(estimate_remaining_secs(10.0, 100, 100), 0.0);
    }

    #[test]
    fn test_unit_conversions() {
        assert!((ms_to_secs(1_500.0) - 1.5).abs() < 1e-12);
        assert_eq!(secs_to_us(2.0), 2_000_000);
        assert!((us_to_secs(250_000) - 0.25).abs() < 1e-12);
    }
}
