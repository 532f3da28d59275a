//! Element geometry as reported by the browser

use serde::{Deserialize, Serialize};

/// Bounding box of a rendered element in CSS pixels, relative to the viewport
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Element occupies visible space
    pub fn is_rendered(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn meets_touch_target(&self, min: f64) -> bool {
        self.width >= min && self.height >= min
    }

    /// Space left of and right of the box within a viewport of the given width
    pub fn horizontal_margins(&self, viewport_width: f64) -> (f64, f64) {
        (self.x, viewport_width - self.right())
    }

    pub fn fits_horizontally(&self, viewport_width: f64, tolerance: f64) -> bool {
        self.width <= viewport_width + tolerance
    }

    /// Vertical gap between this box's bottom edge and the top of `next`.
    /// Negative when the boxes overlap.
    pub fn gap_to(&self, next: &BoundingBox) -> f64 {
        next.y - self.bottom()
    }
}
