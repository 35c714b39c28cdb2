//! Bounding-box primitives shared by the layout strategies.
//!
//! Coordinates are integer pixels with the origin in the top-left corner of
//! the page. The OCR service is supposed to return boxes with `top <= bottom`
//! and `left <= right`, but nothing upstream enforces that, so everything
//! here goes through [`BoundingBox::normalized`] first.

use crate::prelude::*;

/// A rectangle on the page, in pixels.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Hash, Serialize)]
pub struct BoundingBox {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
}

impl BoundingBox {
    /// Create a new bounding box.
    #[cfg(test)]
    pub fn new(top: i32, bottom: i32, left: i32, right: i32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /// Return a copy with `top <= bottom` and `left <= right`, swapping
    /// inverted edges.
    pub fn normalized(self) -> Self {
        Self {
            top: self.top.min(self.bottom),
            bottom: self.top.max(self.bottom),
            left: self.left.min(self.right),
            right: self.left.max(self.right),
        }
    }

    /// Vertical distance between the top edges of two boxes.
    pub fn top_distance(&self, other: &Self) -> i64 {
        (i64::from(self.top) - i64::from(other.top)).abs()
    }

    /// Horizontal distance between the left edges of two boxes.
    pub fn left_distance(&self, other: &Self) -> i64 {
        (i64::from(self.left) - i64::from(other.left)).abs()
    }

    /// Do two boxes start on the same visual line?
    pub fn same_line(&self, other: &Self, line_distance: f64) -> bool {
        self.top_distance(other) as f64 <= line_distance
    }

    /// Are two boxes close enough to belong to the same visual group?
    ///
    /// The left edges must be within `epsilon_x`, and one box must end
    /// within `epsilon_y` of where the other starts (in either direction).
    pub fn is_neighbor(&self, other: &Self, epsilon_x: i32, epsilon_y: i32) -> bool {
        let epsilon_x = i64::from(epsilon_x);
        let epsilon_y = i64::from(epsilon_y);
        if self.left_distance(other) > epsilon_x {
            return false;
        }
        let top_to_bottom = (i64::from(self.top) - i64::from(other.bottom)).abs();
        let bottom_to_top = (i64::from(self.bottom) - i64::from(other.top)).abs();
        top_to_bottom <= epsilon_y || bottom_to_top <= epsilon_y
    }

    /// The smallest box containing every box in `boxes`, or `None` if there
    /// are none.
    pub fn union<'a>(boxes: impl IntoIterator<Item = &'a BoundingBox>) -> Option<Self> {
        boxes.into_iter().map(|b| b.normalized()).reduce(|acc, b| Self {
            top: acc.top.min(b.top),
            bottom: acc.bottom.max(b.bottom),
            left: acc.left.min(b.left),
            right: acc.right.max(b.right),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_swaps_inverted_edges() {
        let bb = BoundingBox::new(50, 10, 30, 5).normalized();
        assert_eq!(bb, BoundingBox::new(10, 50, 5, 30));
    }

    #[test]
    fn neighbors_need_aligned_left_edges() {
        let a = BoundingBox::new(0, 20, 100, 300);
        let below = BoundingBox::new(25, 45, 103, 280);
        let shifted = BoundingBox::new(25, 45, 120, 280);
        assert!(a.is_neighbor(&below, 5, 200));
        assert!(!a.is_neighbor(&shifted, 5, 200));
    }

    #[test]
    fn neighbors_need_vertical_proximity() {
        let a = BoundingBox::new(0, 20, 0, 100);
        let far = BoundingBox::new(500, 520, 0, 100);
        assert!(!a.is_neighbor(&far, 5, 200));
        assert!(far.is_neighbor(&BoundingBox::new(320, 330, 2, 80), 5, 200));
    }

    #[test]
    fn same_line_is_inclusive() {
        let a = BoundingBox::new(0, 10, 0, 10);
        assert!(a.same_line(&BoundingBox::new(10, 20, 50, 60), 10.0));
        assert!(!a.same_line(&BoundingBox::new(11, 20, 50, 60), 10.0));
    }

    #[test]
    fn union_covers_all_boxes() {
        let boxes = [
            BoundingBox::new(10, 20, 5, 50),
            BoundingBox::new(0, 15, 30, 60),
            BoundingBox::new(40, 30, 70, 65),
        ];
        assert_eq!(
            BoundingBox::union(&boxes),
            Some(BoundingBox::new(0, 40, 5, 70))
        );
        assert_eq!(BoundingBox::union(&[]), None);
    }
}
