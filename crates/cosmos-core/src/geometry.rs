//! Axis-aligned page geometry.
//!
//! All boxes are in page-image pixel coordinates with the origin at the
//! top-left corner, so `t < b` for every well-formed box.

use serde::{Deserialize, Serialize};

/// Bounding box with left, top, right, bottom coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub l: f64, // left (x_min)
    pub t: f64, // top (y_min)
    pub r: f64, // right (x_max)
    pub b: f64, // bottom (y_max)
}

impl BBox {
    /// Create a new bounding box
    #[inline]
    #[must_use = "returns a new BBox instance"]
    pub const fn new(l: f64, t: f64, r: f64, b: f64) -> Self {
        Self { l, t, r, b }
    }

    /// Build a box from two arbitrary corners, swapping coordinates so that `l <= r` and `t <= b`
    #[must_use = "returns a new BBox instance"]
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            l: x0.min(x1),
            t: y0.min(y1),
            r: x0.max(x1),
            b: y0.max(y1),
        }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> f64 {
        (self.r - self.l).max(0.0)
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> f64 {
        (self.b - self.t).max(0.0)
    }

    /// Calculate area of the bounding box
    #[inline]
    #[must_use = "returns the bounding box area"]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// True when all coordinates are finite and the box has positive area
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.l, self.t, self.r, self.b].iter().all(|v| v.is_finite())
            && self.r > self.l
            && self.b > self.t
    }

    /// Calculate intersection area with another bbox
    #[inline]
    #[must_use = "returns the intersection area"]
    pub fn intersection_area(&self, other: &Self) -> f64 {
        let x_left = self.l.max(other.l);
        let y_top = self.t.max(other.t);
        let x_right = self.r.min(other.r);
        let y_bottom = self.b.min(other.b);

        let width = (x_right - x_left).max(0.0);
        let height = (y_bottom - y_top).max(0.0);

        width * height
    }

    /// Calculate intersection-over-self ratio
    ///
    /// This is `intersection_area / self.area`, NOT `IoU`. A value of 1.0 means
    /// `self` lies entirely inside `other`.
    #[inline]
    #[must_use = "returns the intersection-over-self ratio"]
    pub fn intersection_over_self(&self, other: &Self) -> f64 {
        let intersection = self.intersection_area(other);
        let self_area = self.area();

        if self_area > 0.0 {
            intersection / self_area
        } else {
            0.0
        }
    }

    /// Calculate Intersection over Union (`IoU`) with another bbox
    #[inline]
    #[must_use = "returns the Intersection over Union value"]
    pub fn iou(&self, other: &Self) -> f64 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Grow the box by `margin` on every side
    #[inline]
    #[must_use = "returns the expanded box"]
    pub fn expand(&self, margin: f64) -> Self {
        Self {
            l: self.l - margin,
            t: self.t - margin,
            r: self.r + margin,
            b: self.b + margin,
        }
    }

    /// Clip the box to `[0, width] x [0, height]`
    #[inline]
    #[must_use = "returns the clipped box"]
    pub fn clip(&self, width: f64, height: f64) -> Self {
        Self {
            l: self.l.clamp(0.0, width),
            t: self.t.clamp(0.0, height),
            r: self.r.clamp(0.0, width),
            b: self.b.clamp(0.0, height),
        }
    }

    #[inline]
    #[must_use]
    pub fn centroid(&self) -> (f64, f64) {
        ((self.l + self.r) / 2.0, (self.t + self.b) / 2.0)
    }

    /// Euclidean distance between the centroids of two boxes
    #[inline]
    #[must_use]
    pub fn centroid_distance(&self, other: &Self) -> f64 {
        let (x0, y0) = self.centroid();
        let (x1, y1) = other.centroid();
        (x1 - x0).hypot(y1 - y0)
    }

    /// Distance from a point to the nearest point of this box (0 when inside)
    #[inline]
    #[must_use]
    pub fn distance_to_point(&self, x: f64, y: f64) -> f64 {
        let dx = (self.l - x).max(0.0).max(x - self.r);
        let dy = (self.t - y).max(0.0).max(y - self.b);
        dx.hypot(dy)
    }

    /// Length of the overlap between the horizontal extents of two boxes
    #[inline]
    #[must_use]
    pub fn horizontal_overlap(&self, other: &Self) -> f64 {
        (self.r.min(other.r) - self.l.max(other.l)).max(0.0)
    }

    /// Integer pixel rectangle `(x, y, width, height)` covering this box inside an image
    ///
    /// Returns `None` when the covered rectangle would be empty.
    #[must_use]
    pub fn pixel_rect(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let clipped = self.clip(f64::from(image_width), f64::from(image_height));
        // Coordinates are clamped to the image, so the casts stay in range
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (x0, y0, x1, y1) = (
            clipped.l.floor() as u32,
            clipped.t.floor() as u32,
            clipped.r.ceil() as u32,
            clipped.b.ceil() as u32,
        );
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}
