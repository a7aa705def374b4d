//! Pixel geometry shared by OCR, vision and the device layer.

use serde::{Deserialize, Serialize};

/// A pixel coordinate on the device screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// An axis-aligned pixel rectangle (left, top, width, height).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub const fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        BoundingBox::new(left, top, right - left, bottom - top)
    }

    /// Center point, rounded down.
    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right()).div_euclid(2),
            (self.top + self.bottom()).div_euclid(2),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_and_center() {
        let a = BoundingBox::new(10, 20, 30, 10);
        let b = BoundingBox::new(50, 18, 20, 16);
        let u = a.union(&b);
        assert_eq!(u, BoundingBox::new(10, 18, 60, 16));
        assert_eq!(u.center(), Point::new(40, 26));
    }

    #[test]
    fn test_center_rounds_down() {
        let b = BoundingBox::new(0, 0, 5, 3);
        assert_eq!(b.center(), Point::new(2, 1));
    }
}
