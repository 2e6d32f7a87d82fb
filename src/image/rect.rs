use std::{cmp, fmt};

use crate::resolution::Resolution;

/// An axis-aligned rectangle.
///
/// This rectangle type uses (signed) integer pixel coordinates and is meant to be used with the
/// [`crate::image`] module. A face bounding box is stored as a [`Rect`] in `(x, y, w, h)` form.
///
/// Rectangles are allowed to have zero height and/or width.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl Rect {
    /// Creates a rectangle extending downwards and right from a point.
    #[inline]
    pub fn from_top_left(top_left_x: i32, top_left_y: i32, width: u32, height: u32) -> Self {
        Self {
            x: top_left_x,
            y: top_left_y,
            width,
            height,
        }
    }

    /// Creates a rectangle from two opposing corner points (both inclusive).
    pub fn from_corners(top_left: (i32, i32), bottom_right: (i32, i32)) -> Self {
        Self::span_inner(top_left.0, top_left.1, bottom_right.0, bottom_right.1)
    }

    /// Computes the (axis-aligned) bounding rectangle that encompasses `points`.
    ///
    /// Returns `None` if `points` is an empty iterator.
    pub fn bounding<I: IntoIterator<Item = (i32, i32)>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();

        let (x, y) = iter.next()?;
        let (mut x_min, mut x_max, mut y_min, mut y_max) = (x, x, y, y);

        for (x, y) in iter {
            x_min = cmp::min(x_min, x);
            x_max = cmp::max(x_max, x);
            y_min = cmp::min(y_min, y);
            y_max = cmp::max(y_max, y);
        }

        Some(Self::span_inner(x_min, y_min, x_max, y_max))
    }

    fn span_inner(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        assert!(x_min <= x_max, "x_min={}, x_max={}", x_min, x_max);
        assert!(y_min <= y_max, "y_min={}, y_max={}", y_min, y_max);
        Self {
            x: x_min,
            y: y_min,
            width: (x_max - x_min + 1) as u32,
            height: (y_max - y_min + 1) as u32,
        }
    }

    /// Returns the X coordinate of the left side of the rectangle.
    #[inline]
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Returns the Y coordinate of the top side of the rectangle.
    #[inline]
    pub fn y(&self) -> i32 {
        self.y
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the number of pixels covered by this rectangle.
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns the `(x, y, w, h)` tuple describing this rectangle.
    #[inline]
    pub fn to_xywh(&self) -> (i32, i32, u32, u32) {
        (self.x, self.y, self.width, self.height)
    }

    /// Returns whether the pixel at `(x, y)` lies inside of `self`.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && i64::from(x) < i64::from(self.x) + i64::from(self.width)
            && i64::from(y) < i64::from(self.y) + i64::from(self.height)
    }

    /// Grows this rectangle by adding a margin relative to width and height.
    ///
    /// `amount` is the relative amount of the rectangles width and height to add to each side.
    #[must_use]
    pub fn grow_rel(&self, amount: f32) -> Self {
        let dw = (self.width as f32 * amount).round() as i32;
        let dh = (self.height as f32 * amount).round() as i32;
        Self {
            x: self.x - dw,
            y: self.y - dh,
            width: (self.width as i32 + 2 * dw).max(0) as u32,
            height: (self.height as i32 + 2 * dh).max(0) as u32,
        }
    }

    /// Clamps `self` to the area of an image with resolution `res`.
    ///
    /// Returns `None` if the rectangle lies entirely outside of the image.
    pub fn clamp_to(&self, res: Resolution) -> Option<Self> {
        let x_min = cmp::max(i64::from(self.x), 0);
        let y_min = cmp::max(i64::from(self.y), 0);
        let x_end = cmp::min(
            i64::from(self.x) + i64::from(self.width),
            i64::from(res.width()),
        );
        let y_end = cmp::min(
            i64::from(self.y) + i64::from(self.height),
            i64::from(res.height()),
        );

        if x_min >= x_end || y_min >= y_end {
            return None;
        }

        Some(Self {
            x: x_min as i32,
            y: y_min as i32,
            width: (x_end - x_min) as u32,
            height: (y_end - y_min) as u32,
        })
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect @ ({},{})/{}x{}",
            self.x, self.y, self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_and_bounding() {
        let rect = Rect::from_corners((1, 2), (3, 2));
        assert_eq!(rect.to_xywh(), (1, 2, 3, 1));

        let rect = Rect::bounding([(4, 5), (1, 9), (2, 2)]).unwrap();
        assert_eq!(rect.to_xywh(), (1, 2, 4, 8));
        assert_eq!(Rect::bounding(std::iter::empty()), None);
    }

    #[test]
    fn contains() {
        let rect = Rect::from_top_left(0, 0, 2, 2);
        assert!(rect.contains(0, 0));
        assert!(rect.contains(1, 1));
        assert!(!rect.contains(2, 1));
        assert!(!rect.contains(-1, 0));
    }

    #[test]
    fn clamp() {
        let res = Resolution::new(10, 10);
        let rect = Rect::from_top_left(-5, 8, 10, 10).clamp_to(res).unwrap();
        assert_eq!(rect.to_xywh(), (0, 8, 5, 2));
        assert_eq!(Rect::from_top_left(10, 0, 5, 5).clamp_to(res), None);
    }

    #[test]
    fn grow() {
        let rect = Rect::from_top_left(10, 10, 10, 20).grow_rel(0.5);
        assert_eq!(rect.to_xywh(), (5, 0, 20, 40));
    }
}
