//! Canvas backgrounds, rendered once per export at output resolution.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use screenreel_common::error::{ScreenreelError, ScreenreelResult};
use screenreel_project_model::project::{parse_hex_color, Background};

/// Gaussian sigma for a blurred background, relative to the canvas diagonal.
const BACKGROUND_BLUR_FRACTION: f32 = 0.01;

/// Render `background` at `width` x `height`.
///
/// Image paths are resolved against `base_dir` when relative.
pub fn render_background(
    background: &Background,
    width: u32,
    height: u32,
    blur: bool,
    base_dir: Option<&Path>,
) -> ScreenreelResult<RgbaImage> {
    let mut canvas = match background {
        Background::Solid { color } => {
            let rgb = parse_color(color)?;
            RgbaImage::from_pixel(width, height, Rgba([rgb[0], rgb[1], rgb[2], 255]))
        }
        Background::Gradient { angle_deg, stops } => {
            let stops = stops
                .iter()
                .map(|s| parse_color(s))
                .collect::<ScreenreelResult<Vec<_>>>()?;
            linear_gradient(width, height, *angle_deg, &stops)
        }
        Background::Image { path } => {
            let path = match base_dir {
                Some(dir) if Path::new(path).is_relative() => dir.join(path),
                _ => Path::new(path).to_path_buf(),
            };
            cover_image(&path, width, height)?
        }
    };

    if blur {
        let diagonal = ((width as f32).powi(2) + (height as f32).powi(2)).sqrt();
        canvas = imageops::blur(&canvas, diagonal * BACKGROUND_BLUR_FRACTION);
    }
    Ok(canvas)
}

fn parse_color(value: &str) -> ScreenreelResult<[u8; 3]> {
    parse_hex_color(value)
        .ok_or_else(|| ScreenreelError::render(format!("invalid background color {value:?}")))
}

/// CSS-style linear gradient: 0° runs bottom to top, 90° left to right.
fn linear_gradient(width: u32, height: u32, angle_deg: f64, stops: &[[u8; 3]]) -> RgbaImage {
    let Some(first) = stops.first() else {
        return RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
    };
    if stops.len() == 1 {
        return RgbaImage::from_pixel(width, height, Rgba([first[0], first[1], first[2], 255]));
    }

    let theta = angle_deg.to_radians();
    let (dx, dy) = (theta.sin(), -theta.cos());
    let (w, h) = (width as f64, height as f64);
    // Gradient line length so the corners hit exactly 0 and 1.
    let half_len = (w * dx.abs() + h * dy.abs()) / 2.0;
    let segments = (stops.len() - 1) as f64;

    RgbaImage::from_fn(width, height, |x, y| {
        let px = x as f64 + 0.5 - w / 2.0;
        let py = y as f64 + 0.5 - h / 2.0;
        let t = if half_len > 0.0 {
            ((px * dx + py * dy) / half_len * 0.5 + 0.5).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let pos = t * segments;
        let i = (pos.floor() as usize).min(stops.len() - 2);
        let local = pos - i as f64;
        let (a, b) = (stops[i], stops[i + 1]);
        let mix = |c: usize| (a[c] as f64 + (b[c] as f64 - a[c] as f64) * local).round() as u8;
        Rgba([mix(0), mix(1), mix(2), 255])
    })
}

/// Load an image and scale it to cover the canvas, cropping the overflow.
fn cover_image(path: &Path, width: u32, height: u32) -> ScreenreelResult<RgbaImage> {
    if !path.exists() {
        return Err(ScreenreelError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let source = image::open(path)
        .map_err(|e| {
            ScreenreelError::render(format!("failed to load wallpaper {}: {e}", path.display()))
        })?
        .to_rgba8();
    if source.width() == 0 || source.height() == 0 {
        return Err(ScreenreelError::render(format!(
            "wallpaper {} is empty",
            path.display()
        )));
    }

    let scale = (width as f64 / source.width() as f64).max(height as f64 / source.height() as f64);
    let scaled_w = ((source.width() as f64 * scale).ceil() as u32).max(width);
    let scaled_h = ((source.height() as f64 * scale).ceil() as u32).max(height);
    let scaled = imageops::resize(&source, scaled_w, scaled_h, FilterType::Triangle);

    let x = (scaled_w - width) / 2;
    let y = (scaled_h - height) / 2;
    Ok(imageops::crop_imm(&scaled, x, y, width, height).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid() {
        let bg = render_background(&Background::solid("#102030"), 4, 3, false, None).unwrap();
        assert_eq!(bg.dimensions(), (4, 3));
        assert!(bg.pixels().all(|p| p.0 == [0x10, 0x20, 0x30, 255]));
    }

    #[test]
    fn test_horizontal_gradient_runs_left_to_right() {
        let bg = Background::Gradient {
            angle_deg: 90.0,
            stops: vec!["#000000".into(), "#ffffff".into()],
        };
        let img = render_background(&bg, 100, 10, false, None).unwrap();
        let left = img.get_pixel(0, 5).0[0];
        let mid = img.get_pixel(50, 5).0[0];
        let right = img.get_pixel(99, 5).0[0];
        assert!(left < 5);
        assert!(right > 250);
        assert!((120..=135).contains(&mid));
        // Constant along the other axis.
        assert_eq!(img.get_pixel(30, 0), img.get_pixel(30, 9));
    }

    #[test]
    fn test_invalid_color_is_render_error() {
        let err = render_background(&Background::solid("blue"), 2, 2, false, None).unwrap_err();
        assert!(matches!(err, ScreenreelError::Render { .. }));
    }

    #[test]
    fn test_missing_wallpaper() {
        let bg = Background::Image {
            path: "/nonexistent/wallpaper.png".into(),
        };
        let err = render_background(&bg, 2, 2, false, None).unwrap_err();
        assert!(matches!(err, ScreenreelError::FileNotFound { .. }));
    }

    #[test]
    fn test_wallpaper_covers_canvas() {
        let dir = std::env::temp_dir().join(format!("screenreel-bg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wall.png");
        RgbaImage::from_pixel(20, 10, Rgba([200, 10, 10, 255]))
            .save(&path)
            .unwrap();

        let bg = Background::Image {
            path: "wall.png".into(),
        };
        let img = render_background(&bg, 16, 16, true, Some(&dir)).unwrap();
        assert_eq!(img.dimensions(), (16, 16));
        assert!(img.get_pixel(8, 8).0[0] > 150);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
