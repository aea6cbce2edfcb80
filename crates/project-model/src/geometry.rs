//! Point and rectangle types shared by layout and zoom math.

use serde::{Deserialize, Serialize};

/// A 2D point. Normalized or pixel space depending on the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Linear interpolation between two points.
    pub fn lerp(a: &Point2D, b: &Point2D, t: f64) -> Point2D {
        let t = t.clamp(0.0, 1.0);
        Point2D {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
        }
    }
}

/// An axis-aligned rectangle in floating-point pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl RectF {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// The center point of this rectangle.
    pub fn center(&self) -> Point2D {
        Point2D::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        !(self.w > 0.0 && self.h > 0.0)
    }

    /// Overlapping area of two rectangles, if any.
    pub fn intersect(&self, other: &RectF) -> Option<RectF> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(RectF::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Scale width and height by `factor` and move the origin by `(dx, dy)`.
    pub fn scaled_and_offset(&self, factor: f64, dx: f64, dy: f64) -> RectF {
        RectF::new(self.x + dx, self.y + dy, self.w * factor, self.h * factor)
    }

    /// Largest rectangle with `aspect` (w / h) that fits inside `self`, centered.
    pub fn fit_aspect(&self, aspect: f64) -> RectF {
        if self.is_empty() || !(aspect > 0.0) {
            return *self;
        }
        let (w, h) = if self.w / self.h > aspect {
            (self.h * aspect, self.h)
        } else {
            (self.w, self.w / aspect)
        };
        RectF::new(
            self.x + (self.w - w) / 2.0,
            self.y + (self.h - h) / 2.0,
            w,
            h,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point2d_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(1.0, 0.0);
        assert!((a.distance_to(&b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_point_lerp_clamps_t() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(1.0, 2.0);
        assert_eq!(Point2D::lerp(&a, &b, 2.0), b);
        let mid = Point2D::lerp(&a, &b, 0.5);
        assert!((mid.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_intersect() {
        let a = RectF::new(0.0, 0.0, 10.0, 10.0);
        let b = RectF::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersect(&b), Some(RectF::new(5.0, 5.0, 5.0, 5.0)));
        assert!(a.intersect(&RectF::new(20.0, 0.0, 1.0, 1.0)).is_none());
    }

    #[test]
    fn test_fit_aspect_letterboxes_wide_content() {
        let area = RectF::new(0.0, 0.0, 100.0, 100.0);
        let fitted = area.fit_aspect(2.0);
        assert!((fitted.w - 100.0).abs() < 1e-9);
        assert!((fitted.h - 50.0).abs() < 1e-9);
        assert!((fitted.y - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_aspect_pillarboxes_tall_content() {
        let area = RectF::new(10.0, 0.0, 160.0, 90.0);
        let fitted = area.fit_aspect(1.0);
        assert!((fitted.w - 90.0).abs() < 1e-9);
        assert!((fitted.x - 45.0).abs() < 1e-9);
    }
}
