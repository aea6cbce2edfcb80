//! Placement of the cropped source on the output canvas.
//!
//! The unzoomed layout fits the crop rectangle, aspect preserved, into the
//! canvas minus padding. Zooming moves the whole source image so that the
//! focus point lands on the canvas center and scales the video mask with it.

use screenreel_processing_core::zoom::ZoomState;
use screenreel_project_model::geometry::{Point2D, RectF};
use screenreel_project_model::timeline::CropRegion;

/// Default corner radius as a fraction of the mask's shorter side.
const DEFAULT_RADIUS_FRACTION: f64 = 0.02;

/// Unzoomed placement of the source on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub canvas_width: u32,
    pub canvas_height: u32,

    /// Crop rectangle in source pixels.
    pub crop: RectF,

    /// Visible video area on the canvas (the base mask).
    pub mask: RectF,

    /// Canvas pixels per source pixel.
    pub base_scale: f64,

    /// Canvas position of the source image's top-left corner.
    pub base_offset: Point2D,
}

/// Layout after applying one zoom step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoTransform {
    /// Canvas position of the source image's top-left corner.
    pub origin: Point2D,

    /// Canvas pixels per source pixel.
    pub scale: f64,

    /// Visible video area on the canvas.
    pub mask: RectF,

    /// Mask corner radius in canvas pixels.
    pub radius: f64,
}

impl Layout {
    pub fn compute(
        canvas_width: u32,
        canvas_height: u32,
        source_width: u32,
        source_height: u32,
        crop: &CropRegion,
        padding_percent: f64,
    ) -> Self {
        let cw = canvas_width as f64;
        let ch = canvas_height as f64;
        let pad = padding_percent.clamp(0.0, 40.0) / 100.0;
        let area = RectF::new(cw * pad, ch * pad, cw * (1.0 - 2.0 * pad), ch * (1.0 - 2.0 * pad));

        let crop = crop.clamped().to_pixels(source_width, source_height);
        let aspect = if crop.h > 0.0 { crop.w / crop.h } else { 1.0 };
        let mask = area.fit_aspect(aspect);
        let base_scale = if crop.w > 0.0 { mask.w / crop.w } else { 1.0 };
        let base_offset = Point2D::new(mask.x - crop.x * base_scale, mask.y - crop.y * base_scale);

        Self {
            canvas_width,
            canvas_height,
            crop,
            mask,
            base_scale,
            base_offset,
        }
    }

    /// Apply a zoom state. `border_radius` is the unzoomed corner radius.
    pub fn transform(&self, zoom: &ZoomState, border_radius: Option<f64>) -> VideoTransform {
        let z = if zoom.scale.is_finite() && zoom.scale > 0.0 {
            zoom.scale
        } else {
            1.0
        };
        let center = Point2D::new(self.canvas_width as f64 / 2.0, self.canvas_height as f64 / 2.0);
        let focus = Point2D::new(
            zoom.focus.cx * self.canvas_width as f64,
            zoom.focus.cy * self.canvas_height as f64,
        );

        let origin = Point2D::new(
            center.x - (focus.x - self.base_offset.x) * z,
            center.y - (focus.y - self.base_offset.y) * z,
        );
        let mask = self.mask.scaled_and_offset(
            z,
            origin.x - self.base_offset.x,
            origin.y - self.base_offset.y,
        );
        let radius = match border_radius {
            Some(r) if r >= 0.0 => r * z,
            _ => mask.w.min(mask.h) * DEFAULT_RADIUS_FRACTION,
        };

        VideoTransform {
            origin,
            scale: self.base_scale * z,
            mask,
            radius,
        }
    }
}

impl VideoTransform {
    /// Source pixel coordinate under a canvas position.
    pub fn to_source(&self, x: f64, y: f64) -> Point2D {
        Point2D::new((x - self.origin.x) / self.scale, (y - self.origin.y) / self.scale)
    }
}
