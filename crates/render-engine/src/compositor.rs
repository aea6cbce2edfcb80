//! Frame compositor: background, shadow, zoomed video and mask.
//!
//! One [`FrameRenderer`] is built per export. It owns the pre-rendered
//! background and the zoom animator, so frames must be rendered in export
//! order.

use std::path::PathBuf;

use image::{Rgba, RgbaImage};

use screenreel_common::error::{ScreenreelError, ScreenreelResult};
use screenreel_media_engine::types::{DecodedFrame, RenderedFrame};
use screenreel_processing_core::zoom::{ZoomAnimator, ZoomState};
use screenreel_project_model::geometry::RectF;
use screenreel_project_model::project::CanvasStyle;
use screenreel_project_model::timeline::{CropRegion, ZoomRegion};

use crate::background::render_background;
use crate::effects::{blend_pixel, motion_blur, rounded_rect_coverage, ShadowCache};
use crate::layout::{Layout, VideoTransform};

/// Inputs for a [`FrameRenderer`].
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Output canvas size.
    pub width: u32,
    pub height: u32,

    /// Probed source size.
    pub source_width: u32,
    pub source_height: u32,

    pub style: CanvasStyle,
    pub crop: CropRegion,
    pub zoom_regions: Vec<ZoomRegion>,

    /// Directory relative wallpaper paths are resolved against.
    pub asset_dir: Option<PathBuf>,
}

/// Per-export compositor.
pub struct FrameRenderer {
    layout: Layout,
    style: CanvasStyle,
    background: RgbaImage,
    animator: ZoomAnimator,
    shadow: ShadowCache,
    source_width: u32,
    source_height: u32,
}

impl FrameRenderer {
    pub fn new(config: RendererConfig) -> ScreenreelResult<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(ScreenreelError::render(format!(
                "invalid output size {}x{}",
                config.width, config.height
            )));
        }
        if config.source_width == 0 || config.source_height == 0 {
            return Err(ScreenreelError::render("source has no dimensions"));
        }

        let layout = Layout::compute(
            config.width,
            config.height,
            config.source_width,
            config.source_height,
            &config.crop,
            config.style.padding_percent,
        );
        let background = render_background(
            &config.style.background,
            config.width,
            config.height,
            config.style.blur_background,
            config.asset_dir.as_deref(),
        )?;

        tracing::debug!(
            width = config.width,
            height = config.height,
            mask = ?layout.mask,
            zoom_regions = config.zoom_regions.len(),
            "Frame renderer ready"
        );

        Ok(Self {
            layout,
            style: config.style,
            background,
            animator: ZoomAnimator::new(config.zoom_regions),
            shadow: ShadowCache::new(),
            source_width: config.source_width,
            source_height: config.source_height,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Camera state after the most recent frame.
    pub fn zoom_state(&self) -> ZoomState {
        self.animator.state()
    }

    /// Composite one decoded frame.
    ///
    /// The zoom is evaluated at the frame's source timestamp; the output is
    /// stamped with the export timestamp.
    pub fn render(
        &mut self,
        frame: &DecodedFrame,
        export_timestamp_us: i64,
        duration_us: i64,
    ) -> ScreenreelResult<RenderedFrame> {
        let zoom = self.animator.step(frame.timestamp_us as f64 / 1000.0);
        let transform = self.layout.transform(&zoom, self.style.border_radius);

        let mut canvas = self.background.clone();
        if self.style.shadow {
            self.shadow.apply(
                &mut canvas,
                &transform.mask,
                transform.radius,
                self.style.shadow_intensity,
            );
        }

        let blur_radius = if self.style.motion_blur {
            zoom.motion_blur_radius(true)
        } else {
            0.0
        };

        if blur_radius > 0.0 {
            let mut layer = RgbaImage::new(canvas.width(), canvas.height());
            self.draw_video(&mut layer, frame, &transform, |dst, src, cov| {
                *dst = Rgba([src.0[0], src.0[1], src.0[2], (cov * 255.0).round() as u8]);
            });
            let layer = motion_blur(&layer, blur_radius).unwrap_or(layer);
            for (dst, src) in canvas.pixels_mut().zip(layer.pixels()) {
                blend_pixel(dst, *src, 1.0);
            }
        } else {
            self.draw_video(&mut canvas, frame, &transform, |dst, src, cov| {
                blend_pixel(dst, src, cov);
            });
        }

        Ok(RenderedFrame {
            timestamp_us: export_timestamp_us,
            duration_us,
            image: canvas,
        })
    }

    /// Visit every canvas pixel covered by the video mask with its sampled
    /// source color and mask coverage.
    fn draw_video<F>(
        &self,
        target: &mut RgbaImage,
        frame: &DecodedFrame,
        transform: &VideoTransform,
        mut put: F,
    ) where
        F: FnMut(&mut Rgba<u8>, Rgba<u8>, f64),
    {
        let canvas = RectF::new(0.0, 0.0, target.width() as f64, target.height() as f64);
        let Some(bounds) = transform.mask.intersect(&canvas) else {
            return;
        };

        // Decoders may hand back frames at a different size than probed.
        let fx = frame.width() as f64 / self.source_width as f64;
        let fy = frame.height() as f64 / self.source_height as f64;
        let crop = self.layout.crop;

        let x0 = bounds.x.floor() as u32;
        let y0 = bounds.y.floor() as u32;
        let x1 = (bounds.right().ceil() as u32).min(target.width());
        let y1 = (bounds.bottom().ceil() as u32).min(target.height());

        for y in y0..y1 {
            for x in x0..x1 {
                let coverage = rounded_rect_coverage(x as f64, y as f64, &transform.mask, transform.radius);
                if coverage <= 0.0 {
                    continue;
                }
                let src = transform.to_source(x as f64 + 0.5, y as f64 + 0.5);
                if src.x < crop.x || src.y < crop.y || src.x >= crop.right() || src.y >= crop.bottom() {
                    continue;
                }
                let color = sample_bilinear(&frame.image, src.x * fx - 0.5, src.y * fy - 0.5);
                put(target.get_pixel_mut(x, y), color, coverage);
            }
        }
    }
}

/// Bilinear sample with edge clamping.
fn sample_bilinear(image: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let max_x = image.width().saturating_sub(1) as f64;
    let max_y = image.height().saturating_sub(1) as f64;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let x0 = x.floor();
    let y0 = y.floor();
    let tx = x - x0;
    let ty = y - y0;
    let (x0, y0) = (x0 as u32, y0 as u32);
    let x1 = (x0 + 1).min(max_x as u32);
    let y1 = (y0 + 1).min(max_y as u32);

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f64 + (p10[c] as f64 - p00[c] as f64) * tx;
        let bottom = p01[c] as f64 + (p11[c] as f64 - p01[c] as f64) * tx;
        out[c] = (top + (bottom - top) * ty).round() as u8;
    }
    Rgba(out)
}
