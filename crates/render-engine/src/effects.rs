//! Pixel effects used by the compositor.

use image::imageops;
use image::{GrayImage, Luma, Rgba, RgbaImage};

use screenreel_project_model::geometry::RectF;

/// Shadow vertical offset and blur, relative to the mask's shorter side.
const SHADOW_OFFSET_FRACTION: f64 = 0.012;
const SHADOW_BLUR_FRACTION: f64 = 0.035;

/// Coverage of pixel `(x, y)` by a rounded rectangle, in `[0, 1]`, with a
/// one-pixel anti-aliased edge.
pub fn rounded_rect_coverage(x: f64, y: f64, rect: &RectF, radius: f64) -> f64 {
    let px = x + 0.5;
    let py = y + 0.5;
    let half_w = rect.w / 2.0;
    let half_h = rect.h / 2.0;
    let r = radius.clamp(0.0, half_w.min(half_h));
    let c = rect.center();

    // Signed distance to the rounded box.
    let qx = (px - c.x).abs() - (half_w - r);
    let qy = (py - c.y).abs() - (half_h - r);
    let outside = (qx.max(0.0).powi(2) + qy.max(0.0).powi(2)).sqrt();
    let inside = qx.max(qy).min(0.0);
    let distance = outside + inside - r;

    (0.5 - distance).clamp(0.0, 1.0)
}

/// Source-over blend of `src` onto `dst` with an extra opacity factor.
#[inline]
pub fn blend_pixel(dst: &mut Rgba<u8>, src: Rgba<u8>, opacity: f64) {
    let a = src.0[3] as f64 / 255.0 * opacity.clamp(0.0, 1.0);
    if a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let d = dst.0[c] as f64;
        dst.0[c] = (d + (src.0[c] as f64 - d) * a).round() as u8;
    }
    dst.0[3] = 255;
}

/// Soft drop shadow under a rounded video rectangle.
///
/// The alpha mask is rendered once per distinct rectangle; while the camera
/// holds still every frame reuses it.
#[derive(Debug, Default)]
pub struct ShadowCache {
    key: Option<(RectF, f64)>,
    alpha: Option<GrayImage>,
}

impl ShadowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Darken `canvas` under `rect`.
    pub fn apply(&mut self, canvas: &mut RgbaImage, rect: &RectF, radius: f64, intensity: f64) {
        if intensity <= 0.0 || rect.is_empty() {
            return;
        }
        let key = (*rect, radius);
        if self.key != Some(key) || self.alpha.is_none() {
            self.alpha = Some(shadow_alpha(canvas.width(), canvas.height(), rect, radius));
            self.key = Some(key);
        }
        let Some(alpha) = &self.alpha else {
            return;
        };

        let strength = intensity.clamp(0.0, 1.0);
        for (pixel, a) in canvas.pixels_mut().zip(alpha.pixels()) {
            if a.0[0] > 0 {
                blend_pixel(pixel, Rgba([0, 0, 0, a.0[0]]), strength);
            }
        }
    }
}

fn shadow_alpha(width: u32, height: u32, rect: &RectF, radius: f64) -> GrayImage {
    let short = rect.w.min(rect.h);
    let offset = short * SHADOW_OFFSET_FRACTION;
    let sigma = (short * SHADOW_BLUR_FRACTION).max(1.0) as f32;
    let shifted = RectF::new(rect.x, rect.y + offset, rect.w, rect.h);

    let mut mask = GrayImage::new(width, height);
    let Some(bounds) = shifted.intersect(&RectF::new(0.0, 0.0, width as f64, height as f64)) else {
        return imageops::blur(&mask, sigma);
    };
    let x0 = bounds.x.floor() as u32;
    let y0 = bounds.y.floor() as u32;
    let x1 = (bounds.right().ceil() as u32).min(width);
    let y1 = (bounds.bottom().ceil() as u32).min(height);
    for y in y0..y1 {
        for x in x0..x1 {
            let cov = rounded_rect_coverage(x as f64, y as f64, &shifted, radius);
            mask.put_pixel(x, y, Luma([(cov * 255.0).round() as u8]));
        }
    }
    imageops::blur(&mask, sigma)
}

/// Gaussian blur standing in for directional motion blur. `radius` is the
/// blur radius in pixels; zero leaves the image untouched.
pub fn motion_blur(image: &RgbaImage, radius: f64) -> Option<RgbaImage> {
    if !(radius > 0.0) {
        return None;
    }
    Some(imageops::blur(image, (radius / 2.0) as f32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_inside_outside() {
        let rect = RectF::new(10.0, 10.0, 100.0, 50.0);
        assert_eq!(rounded_rect_coverage(50.0, 30.0, &rect, 8.0), 1.0);
        assert_eq!(rounded_rect_coverage(5.0, 30.0, &rect, 8.0), 0.0);
        // The sharp corner pixel is cut away by the radius.
        assert_eq!(rounded_rect_coverage(10.0, 10.0, &rect, 8.0), 0.0);
        // Without a radius the corner pixel is covered.
        assert_eq!(rounded_rect_coverage(10.0, 10.0, &rect, 0.0), 1.0);
    }

    #[test]
    fn test_edge_is_antialiased() {
        let rect = RectF::new(10.25, 0.0, 20.0, 20.0);
        let c = rounded_rect_coverage(10.0, 10.0, &rect, 0.0);
        assert!(c > 0.0 && c < 1.0, "coverage {c}");
    }

    #[test]
    fn test_blend_pixel() {
        let mut dst = Rgba([200, 200, 200, 255]);
        blend_pixel(&mut dst, Rgba([0, 0, 0, 255]), 0.5);
        assert_eq!(dst.0, [100, 100, 100, 255]);

        let mut untouched = Rgba([1, 2, 3, 255]);
        blend_pixel(&mut untouched, Rgba([255, 255, 255, 0]), 1.0);
        assert_eq!(untouched.0, [1, 2, 3, 255]);
    }

    #[test]
    fn test_shadow_darkens_below_rect_only() {
        let mut canvas = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        let rect = RectF::new(30.0, 30.0, 40.0, 40.0);
        let mut cache = ShadowCache::new();
        cache.apply(&mut canvas, &rect, 4.0, 0.8);
        assert!(canvas.get_pixel(50, 50).0[0] < 200);
        assert_eq!(canvas.get_pixel(2, 2).0[0], 255);
        assert!(cache.alpha.is_some());
    }

    #[test]
    fn test_motion_blur_zero_radius() {
        let img = RgbaImage::new(4, 4);
        assert!(motion_blur(&img, 0.0).is_none());
        assert!(motion_blur(&img, 3.0).is_some());
    }
}
