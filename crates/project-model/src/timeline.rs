//! Timeline edits applied at export time.
//!
//! The timeline is produced by the editor and is read-only during export.
//! Zoom regions are non-overlapping by construction upstream and are not
//! re-validated here beyond basic shape checks.

use serde::{Deserialize, Serialize};

use crate::geometry::RectF;

/// Scale factor for each zoom depth, indexed by `depth - 1`.
pub const DEPTH_SCALES: [f64; 5] = [1.25, 1.5, 1.8, 2.2, 3.5];

/// Editing timeline (`timeline.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Schema version.
    pub version: String,

    /// Zoom/pan regions on the source timeline.
    #[serde(default)]
    pub zoom_regions: Vec<ZoomRegion>,

    /// Source crop applied to every frame.
    #[serde(default)]
    pub crop: CropRegion,

    /// Excluded time ranges on the source timeline.
    #[serde(default)]
    pub trims: Vec<TrimRegion>,
}

/// Zoom depth level (1 = subtle, 5 = strongest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ZoomDepth(u8);

/// Normalized zoom focus point on the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomFocus {
    pub cx: f64,
    pub cy: f64,
}

/// A time range during which the view zooms into a focus point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomRegion {
    /// Stable identifier assigned by the editor.
    pub id: String,

    /// Region start on the source timeline (ms).
    pub start_ms: f64,

    /// Region end on the source timeline (ms).
    pub end_ms: f64,

    /// Zoom depth level.
    pub depth: ZoomDepth,

    /// Point that is brought to the canvas center while zoomed.
    #[serde(default = "ZoomFocus::center")]
    pub focus: ZoomFocus,
}

/// Normalized crop rectangle on the source video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Half-open excluded interval `[start_ms, end_ms)` on the source timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRegion {
    pub start_ms: f64,
    pub end_ms: f64,
}

impl Timeline {
    /// Empty timeline: no zoom, full-frame crop, no trims.
    pub fn new() -> Self {
        Self {
            version: "1.0".to_string(),
            zoom_regions: vec![],
            crop: CropRegion::FULL,
            trims: vec![],
        }
    }

    /// Trims ordered by start time.
    pub fn sorted_trims(&self) -> Vec<TrimRegion> {
        let mut trims = self.trims.clone();
        trims.sort_by(|a, b| a.start_ms.total_cmp(&b.start_ms));
        trims
    }

    /// Zoom regions ordered by start time.
    pub fn sorted_zoom_regions(&self) -> Vec<ZoomRegion> {
        let mut regions = self.zoom_regions.clone();
        regions.sort_by(|a, b| a.start_ms.total_cmp(&b.start_ms));
        regions
    }

    /// Check every edit for shape errors.
    pub fn validate(&self) -> Result<(), TimelineError> {
        self.crop.validate()?;
        for region in &self.zoom_regions {
            if !(region.start_ms.is_finite() && region.end_ms.is_finite())
                || region.end_ms <= region.start_ms
            {
                return Err(TimelineError::InvalidZoomRegion {
                    id: region.id.clone(),
                    message: format!(
                        "end ({}) must be after start ({})",
                        region.end_ms, region.start_ms
                    ),
                });
            }
            if !region.focus.is_normalized() {
                return Err(TimelineError::InvalidZoomRegion {
                    id: region.id.clone(),
                    message: format!(
                        "focus ({}, {}) is outside [0, 1]",
                        region.focus.cx, region.focus.cy
                    ),
                });
            }
        }
        for trim in &self.trims {
            if !(trim.start_ms.is_finite() && trim.end_ms.is_finite())
                || trim.start_ms < 0.0
                || trim.end_ms <= trim.start_ms
            {
                return Err(TimelineError::InvalidTrim {
                    start_ms: trim.start_ms,
                    end_ms: trim.end_ms,
                });
            }
        }
        Ok(())
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoomDepth {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(level: u8) -> Result<Self, TimelineError> {
        if (Self::MIN..=Self::MAX).contains(&level) {
            Ok(Self(level))
        } else {
            Err(TimelineError::InvalidDepth(level))
        }
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// Magnification applied when this depth is fully active.
    pub fn scale(self) -> f64 {
        DEPTH_SCALES[(self.0 - 1) as usize]
    }
}

impl TryFrom<u8> for ZoomDepth {
    type Error = TimelineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ZoomDepth> for u8 {
    fn from(depth: ZoomDepth) -> u8 {
        depth.0
    }
}

impl ZoomFocus {
    pub const CENTER: ZoomFocus = ZoomFocus { cx: 0.5, cy: 0.5 };

    pub fn new(cx: f64, cy: f64) -> Self {
        Self { cx, cy }
    }

    fn center() -> Self {
        Self::CENTER
    }

    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.cx) && (0.0..=1.0).contains(&self.cy)
    }

    /// Constrain the focus so a viewport magnified by `scale` stays inside
    /// the frame: each axis is kept within `[0.5 / scale, 1 - 0.5 / scale]`.
    pub fn clamp_to_scale(&self, scale: f64) -> ZoomFocus {
        if !(scale > 1.0) {
            return ZoomFocus::CENTER;
        }
        let margin = 0.5 / scale;
        ZoomFocus {
            cx: self.cx.clamp(margin, 1.0 - margin),
            cy: self.cy.clamp(margin, 1.0 - margin),
        }
    }

    pub fn lerp(a: ZoomFocus, b: ZoomFocus, t: f64) -> ZoomFocus {
        let t = t.clamp(0.0, 1.0);
        ZoomFocus {
            cx: a.cx + (b.cx - a.cx) * t,
            cy: a.cy + (b.cy - a.cy) * t,
        }
    }
}

impl Default for ZoomFocus {
    fn default() -> Self {
        Self::CENTER
    }
}

impl ZoomRegion {
    pub fn new(id: impl Into<String>, start_ms: f64, end_ms: f64, depth: ZoomDepth, focus: ZoomFocus) -> Self {
        Self {
            id: id.into(),
            start_ms,
            end_ms,
            depth,
            focus,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        (self.end_ms - self.start_ms).max(0.0)
    }

    /// Closed-interval containment on the source timeline.
    pub fn contains_ms(&self, t_ms: f64) -> bool {
        t_ms >= self.start_ms && t_ms <= self.end_ms
    }
}

impl CropRegion {
    /// Smallest allowed width or height.
    pub const MIN_EXTENT: f64 = 0.1;

    pub const FULL: CropRegion = CropRegion {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }

    /// Bring an arbitrary rectangle into the valid range.
    ///
    /// Extents are clamped to `[MIN_EXTENT, 1]` first, then the origin is
    /// clamped so the rectangle stays inside the unit square. Non-finite
    /// components fall back to the full-frame value.
    pub fn clamped(&self) -> CropRegion {
        let finite_or = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };
        let width = finite_or(self.width, 1.0).clamp(Self::MIN_EXTENT, 1.0);
        let height = finite_or(self.height, 1.0).clamp(Self::MIN_EXTENT, 1.0);
        CropRegion {
            x: finite_or(self.x, 0.0).clamp(0.0, 1.0 - width),
            y: finite_or(self.y, 0.0).clamp(0.0, 1.0 - height),
            width,
            height,
        }
    }

    pub fn validate(&self) -> Result<(), TimelineError> {
        let tol = 1e-9;
        let fields = [self.x, self.y, self.width, self.height];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(TimelineError::InvalidCrop {
                message: "crop contains a non-finite value".to_string(),
            });
        }
        if self.x < 0.0 || self.y < 0.0 {
            return Err(TimelineError::InvalidCrop {
                message: format!("origin ({}, {}) is negative", self.x, self.y),
            });
        }
        if self.width < Self::MIN_EXTENT - tol || self.height < Self::MIN_EXTENT - tol {
            return Err(TimelineError::InvalidCrop {
                message: format!(
                    "extent {}x{} is below the minimum of {}",
                    self.width,
                    self.height,
                    Self::MIN_EXTENT
                ),
            });
        }
        if self.x + self.width > 1.0 + tol || self.y + self.height > 1.0 + tol {
            return Err(TimelineError::InvalidCrop {
                message: "crop extends past the frame edge".to_string(),
            });
        }
        Ok(())
    }

    /// Crop rectangle in source pixels.
    pub fn to_pixels(&self, source_width: u32, source_height: u32) -> RectF {
        let w = source_width as f64;
        let h = source_height as f64;
        RectF::new(self.x * w, self.y * h, self.width * w, self.height * h)
    }
}

impl Default for CropRegion {
    fn default() -> Self {
        Self::FULL
    }
}

impl TrimRegion {
    pub fn new(start_ms: f64, end_ms: f64) -> Self {
        Self { start_ms, end_ms }
    }

    pub fn duration_ms(&self) -> f64 {
        (self.end_ms - self.start_ms).max(0.0)
    }

    pub fn contains_ms(&self, t_ms: f64) -> bool {
        t_ms >= self.start_ms && t_ms < self.end_ms
    }
}

/// Errors found while validating a timeline.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("Zoom depth {0} is outside 1..=5")]
    InvalidDepth(u8),

    #[error("Invalid crop: {message}")]
    InvalidCrop { message: String },

    #[error("Invalid zoom region {id}: {message}")]
    InvalidZoomRegion { id: String, message: String },

    #[error("Invalid trim [{start_ms}ms, {end_ms}ms)")]
    InvalidTrim { start_ms: f64, end_ms: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(level: u8) -> ZoomDepth {
        ZoomDepth::new(level).unwrap()
    }

    #[test]
    fn test_depth_scale_table() {
        assert_eq!(depth(1).scale(), 1.25);
        assert_eq!(depth(3).scale(), 1.8);
        assert_eq!(depth(5).scale(), 3.5);
        assert!(ZoomDepth::new(0).is_err());
        assert!(ZoomDepth::new(6).is_err());
    }

    #[test]
    fn test_depth_rejected_when_deserializing() {
        let json = r#"{"id":"z","start_ms":0,"end_ms":10,"depth":9}"#;
        assert!(serde_json::from_str::<ZoomRegion>(json).is_err());

        let json = r#"{"id":"z","start_ms":0,"end_ms":10,"depth":2}"#;
        let region: ZoomRegion = serde_json::from_str(json).unwrap();
        assert_eq!(region.focus, ZoomFocus::CENTER);
        assert_eq!(region.depth.level(), 2);
    }

    #[test]
    fn test_focus_clamp_keeps_viewport_inside_frame() {
        let focus = ZoomFocus::new(0.0, 1.0).clamp_to_scale(2.0);
        assert!((focus.cx - 0.25).abs() < 1e-12);
        assert!((focus.cy - 0.75).abs() < 1e-12);

        let unchanged = ZoomFocus::new(0.4, 0.6).clamp_to_scale(2.0);
        assert_eq!(unchanged, ZoomFocus::new(0.4, 0.6));
        assert_eq!(ZoomFocus::new(0.1, 0.9).clamp_to_scale(1.0), ZoomFocus::CENTER);
    }

    #[test]
    fn test_crop_clamped() {
        let crop = CropRegion::new(0.95, -0.2, 0.02, 1.5).clamped();
        assert!((crop.width - CropRegion::MIN_EXTENT).abs() < 1e-12);
        assert_eq!(crop.height, 1.0);
        assert!((crop.x - 0.9).abs() < 1e-12);
        assert_eq!(crop.y, 0.0);
        assert!(crop.validate().is_ok());

        let nan = CropRegion::new(f64::NAN, 0.0, 0.5, 0.5).clamped();
        assert_eq!(nan.x, 0.0);
    }

    #[test]
    fn test_crop_validate() {
        assert!(CropRegion::FULL.validate().is_ok());
        assert!(CropRegion::new(0.5, 0.0, 0.6, 1.0).validate().is_err());
        assert!(CropRegion::new(0.0, 0.0, 0.05, 1.0).validate().is_err());
        assert!(CropRegion::new(-0.1, 0.0, 0.5, 0.5).validate().is_err());
    }

    #[test]
    fn test_crop_to_pixels() {
        let rect = CropRegion::new(0.25, 0.5, 0.5, 0.5).to_pixels(1920, 1080);
        assert_eq!(rect, RectF::new(480.0, 540.0, 960.0, 540.0));
    }

    #[test]
    fn test_timeline_validate() {
        let mut timeline = Timeline::new();
        assert!(timeline.validate().is_ok());

        timeline.trims.push(TrimRegion::new(4000.0, 2000.0));
        assert!(matches!(
            timeline.validate(),
            Err(TimelineError::InvalidTrim { .. })
        ));

        timeline.trims.clear();
        timeline.zoom_regions.push(ZoomRegion::new(
            "z1",
            1000.0,
            3000.0,
            depth(3),
            ZoomFocus::new(1.2, 0.5),
        ));
        assert!(matches!(
            timeline.validate(),
            Err(TimelineError::InvalidZoomRegion { .. })
        ));
    }

    #[test]
    fn test_sorted_trims() {
        let mut timeline = Timeline::new();
        timeline.trims = vec![TrimRegion::new(5000.0, 6000.0), TrimRegion::new(1000.0, 2000.0)];
        let sorted = timeline.sorted_trims();
        assert_eq!(sorted[0].start_ms, 1000.0);
        assert_eq!(sorted[1].start_ms, 5000.0);
    }

    #[test]
    fn test_timeline_defaults_for_sparse_json() {
        let timeline: Timeline = serde_json::from_str(r#"{"version":"1.0"}"#).unwrap();
        assert!(timeline.zoom_regions.is_empty());
        assert!(timeline.crop.is_full());
        assert!(timeline.trims.is_empty());
    }
}
