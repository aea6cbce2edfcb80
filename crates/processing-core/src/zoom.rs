//! Zoom camera: dominant-region selection and exponential smoothing.
//!
//! Each rendered frame asks [`ZoomAnimator::step`] for the camera at the
//! frame's source timestamp. The animator computes a target scale/focus from
//! the dominant region and then moves a fixed fraction of the way toward it,
//! snapping once the remaining distance is negligible.

use serde::{Deserialize, Serialize};

use screenreel_project_model::timeline::{ZoomFocus, ZoomRegion};

/// Length of the ramp before a region starts and after it ends (ms).
pub const FADE_WINDOW_MS: f64 = 320.0;

/// Fraction of the remaining distance covered per frame.
pub const SMOOTHING_FACTOR: f64 = 0.12;

/// Distances at or below this snap straight to the target.
pub const MIN_DELTA: f64 = 0.0001;

/// Motion below this intensity does not blur.
pub const MOTION_BLUR_THRESHOLD: f64 = 0.0005;

/// Upper bound on the motion blur radius (px).
pub const MAX_MOTION_BLUR_RADIUS: f64 = 6.0;

const MOTION_BLUR_GAIN: f64 = 120.0;

/// A region together with its strength at some timestamp.
#[derive(Debug, Clone, Copy)]
pub struct DominantRegion<'a> {
    pub region: &'a ZoomRegion,
    pub strength: f64,
}

/// Where the camera wants to be at a timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomTarget {
    pub scale: f64,
    pub focus: ZoomFocus,
}

/// Smoothed camera after one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomState {
    /// Magnification, `1.0` = unzoomed.
    pub scale: f64,

    /// Normalized canvas point brought to the center.
    pub focus: ZoomFocus,

    /// Largest per-axis change during the last step.
    pub motion_intensity: f64,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            focus: ZoomFocus::CENTER,
            motion_intensity: 0.0,
        }
    }
}

impl ZoomState {
    /// Motion blur radius for this step, zero when `in_motion` is false.
    pub fn motion_blur_radius(&self, in_motion: bool) -> f64 {
        motion_blur_radius(self.motion_intensity, in_motion)
    }
}

fn smoothstep(x: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    x * x * (3.0 - 2.0 * x)
}

/// Strength of `region` at `t_ms`: 1 inside `[start, end]`, easing to 0
/// across [`FADE_WINDOW_MS`] on either side.
pub fn region_strength(region: &ZoomRegion, t_ms: f64) -> f64 {
    if region.contains_ms(t_ms) {
        return 1.0;
    }
    let distance = if t_ms < region.start_ms {
        region.start_ms - t_ms
    } else {
        t_ms - region.end_ms
    };
    if distance >= FADE_WINDOW_MS {
        return 0.0;
    }
    smoothstep(1.0 - distance / FADE_WINDOW_MS)
}

/// The region with the greatest strength at `t_ms`, if any is non-zero.
///
/// Ties keep the earlier region in `regions`.
pub fn find_dominant_region(regions: &[ZoomRegion], t_ms: f64) -> Option<DominantRegion<'_>> {
    let mut best: Option<DominantRegion<'_>> = None;
    for region in regions {
        let strength = region_strength(region, t_ms);
        if strength <= 0.0 {
            continue;
        }
        if best.map_or(true, |b| strength > b.strength) {
            best = Some(DominantRegion { region, strength });
        }
    }
    best
}

/// Target camera at `t_ms` before smoothing.
pub fn zoom_target(regions: &[ZoomRegion], t_ms: f64) -> ZoomTarget {
    match find_dominant_region(regions, t_ms) {
        Some(DominantRegion { region, strength }) => {
            let depth_scale = region.depth.scale();
            let focus = region.focus.clamp_to_scale(depth_scale);
            ZoomTarget {
                scale: 1.0 + (depth_scale - 1.0) * strength,
                focus: ZoomFocus::lerp(ZoomFocus::CENTER, focus, strength),
            }
        }
        None => ZoomTarget {
            scale: 1.0,
            focus: ZoomFocus::CENTER,
        },
    }
}

/// `min(6, intensity * 120)` while in motion and above the noise floor.
pub fn motion_blur_radius(intensity: f64, in_motion: bool) -> f64 {
    if in_motion && intensity > MOTION_BLUR_THRESHOLD {
        (intensity * MOTION_BLUR_GAIN).min(MAX_MOTION_BLUR_RADIUS)
    } else {
        0.0
    }
}

fn approach(current: f64, target: f64) -> f64 {
    let delta = target - current;
    if delta.abs() > MIN_DELTA {
        current + delta * SMOOTHING_FACTOR
    } else {
        target
    }
}

/// Frame-to-frame camera smoother.
#[derive(Debug, Clone)]
pub struct ZoomAnimator {
    regions: Vec<ZoomRegion>,
    state: ZoomState,
    dominant_id: Option<String>,
}

impl ZoomAnimator {
    pub fn new(regions: Vec<ZoomRegion>) -> Self {
        Self {
            regions,
            state: ZoomState::default(),
            dominant_id: None,
        }
    }

    pub fn regions(&self) -> &[ZoomRegion] {
        &self.regions
    }

    /// Current camera without advancing.
    pub fn state(&self) -> ZoomState {
        self.state
    }

    /// Back to an unzoomed, centered camera.
    pub fn reset(&mut self) {
        self.state = ZoomState::default();
        self.dominant_id = None;
    }

    /// Advance one frame toward the target at `t_ms`.
    pub fn step(&mut self, t_ms: f64) -> ZoomState {
        let dominant = find_dominant_region(&self.regions, t_ms).map(|d| d.region.id.clone());
        if dominant != self.dominant_id {
            tracing::trace!(t_ms, region = ?dominant, "Dominant zoom region changed");
            self.dominant_id = dominant;
        }

        let target = zoom_target(&self.regions, t_ms);
        let prev = self.state;

        let scale = approach(prev.scale, target.scale);
        let focus = ZoomFocus::new(
            approach(prev.focus.cx, target.focus.cx),
            approach(prev.focus.cy, target.focus.cy),
        );
        let motion_intensity = (scale - prev.scale)
            .abs()
            .max((focus.cx - prev.focus.cx).abs())
            .max((focus.cy - prev.focus.cy).abs());

        self.state = ZoomState {
            scale,
            focus,
            motion_intensity,
        };
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenreel_project_model::timeline::ZoomDepth;

    fn region(id: &str, start: f64, end: f64, depth: u8, cx: f64, cy: f64) -> ZoomRegion {
        ZoomRegion::new(
            id,
            start,
            end,
            ZoomDepth::new(depth).unwrap(),
            ZoomFocus::new(cx, cy),
        )
    }

    #[test]
    fn test_strength_profile() {
        let r = region("a", 1000.0, 3000.0, 3, 0.5, 0.5);
        assert_eq!(region_strength(&r, 2000.0), 1.0);
        assert_eq!(region_strength(&r, 1000.0), 1.0);
        assert_eq!(region_strength(&r, 3000.0), 1.0);
        assert_eq!(region_strength(&r, 1000.0 - FADE_WINDOW_MS), 0.0);
        assert_eq!(region_strength(&r, 3000.0 + FADE_WINDOW_MS), 0.0);
        let mid_fade = region_strength(&r, 1000.0 - FADE_WINDOW_MS / 2.0);
        assert!((mid_fade - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_dominant_region_prefers_strongest() {
        let regions = vec![
            region("a", 0.0, 1000.0, 1, 0.5, 0.5),
            region("b", 1200.0, 2000.0, 2, 0.5, 0.5),
        ];
        let d = find_dominant_region(&regions, 1150.0).unwrap();
        assert_eq!(d.region.id, "b");
        let d = find_dominant_region(&regions, 1040.0).unwrap();
        assert_eq!(d.region.id, "a");
        assert!(find_dominant_region(&regions, 5000.0).is_none());
    }

    #[test]
    fn test_target_outside_regions_is_identity() {
        let regions = vec![region("a", 1000.0, 3000.0, 3, 0.2, 0.8)];
        let target = zoom_target(&regions, 100.0);
        assert_eq!(target.scale, 1.0);
        assert_eq!(target.focus, ZoomFocus::CENTER);
    }

    #[test]
    fn test_target_inside_region_uses_clamped_focus() {
        let regions = vec![region("a", 1000.0, 3000.0, 3, 0.2, 0.8)];
        let target = zoom_target(&regions, 2000.0);
        assert!((target.scale - 1.8).abs() < 1e-12);
        let margin = 0.5 / 1.8;
        assert!((target.focus.cx - margin).abs() < 1e-12);
        assert!((target.focus.cy - (1.0 - margin)).abs() < 1e-12);
    }

    #[test]
    fn test_animator_snaps_after_settling() {
        let mut animator = ZoomAnimator::new(vec![region("a", 0.0, 10_000.0, 2, 0.5, 0.5)]);
        let first = animator.step(5000.0);
        assert!((first.scale - (1.0 + 0.5 * SMOOTHING_FACTOR)).abs() < 1e-12);
        assert!(first.motion_intensity > 0.0);
        for _ in 0..200 {
            animator.step(5000.0);
        }
        let settled = animator.step(5000.0);
        assert_eq!(settled.scale, 1.5);
        assert_eq!(settled.motion_intensity, 0.0);
    }

    #[test]
    fn test_animator_stays_still_without_regions() {
        let mut animator = ZoomAnimator::new(vec![]);
        for t in 0..30 {
            let state = animator.step(t as f64 * 33.3);
            assert_eq!(state, ZoomState::default());
        }
    }

    #[test]
    fn test_reset() {
        let mut animator = ZoomAnimator::new(vec![region("a", 0.0, 1000.0, 5, 0.5, 0.5)]);
        animator.step(500.0);
        animator.reset();
        assert_eq!(animator.state(), ZoomState::default());
    }

    #[test]
    fn test_motion_blur_radius() {
        assert_eq!(motion_blur_radius(0.01, false), 0.0);
        assert_eq!(motion_blur_radius(0.0004, true), 0.0);
        assert!((motion_blur_radius(0.01, true) - 1.2).abs() < 1e-12);
        assert_eq!(motion_blur_radius(1.0, true), MAX_MOTION_BLUR_RADIUS);
    }
}
