//! Binary pixel masks.

use std::fmt;

use anyhow::ensure;

use crate::{image::Rect, resolution::Resolution};

/// A binary per-pixel mask.
///
/// Every entry is either 0 (pixel excluded) or 1 (pixel included).
#[derive(Clone, PartialEq, Eq)]
pub struct Mask {
    res: Resolution,
    data: Vec<u8>,
}

impl Mask {
    /// Creates a mask of resolution `res` that excludes every pixel.
    pub fn empty(res: Resolution) -> Self {
        Self {
            res,
            data: vec![0; res.num_pixels() as usize],
        }
    }

    /// Creates a mask by evaluating `f` for every pixel coordinate.
    pub fn from_fn(res: Resolution, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity(res.num_pixels() as usize);
        for y in 0..res.height() {
            for x in 0..res.width() {
                data.push(u8::from(f(x, y)));
            }
        }
        Self { res, data }
    }

    /// Creates a mask that includes all pixels inside `rect`.
    pub fn from_rect(res: Resolution, rect: Rect) -> Self {
        Self::from_fn(res, |x, y| rect.contains(x as i32, y as i32))
    }

    /// Creates a mask by thresholding a row-major confidence map.
    ///
    /// A pixel is included if its confidence is strictly greater than `threshold`.
    pub fn from_confidence(
        res: Resolution,
        confidences: &[f32],
        threshold: f32,
    ) -> anyhow::Result<Self> {
        ensure!(
            confidences.len() as u64 == res.num_pixels(),
            "confidence map has {} entries, expected {} for {}",
            confidences.len(),
            res.num_pixels(),
            res,
        );
        Ok(Self {
            res,
            data: confidences
                .iter()
                .map(|&c| u8::from(c > threshold))
                .collect(),
        })
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.res
    }

    /// Returns whether the pixel at `(x, y)` is included in the mask.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this mask.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        assert!(x < self.res.width() && y < self.res.height());
        self.data[(y * self.res.width() + x) as usize] != 0
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        assert!(x < self.res.width() && y < self.res.height());
        self.data[(y * self.res.width() + x) as usize] = u8::from(value);
    }

    /// Returns the number of included pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// Returns `true` if no pixel is included.
    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Returns the raw mask values (0 or 1) in row-major order.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns the inverse of this mask.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            res: self.res,
            data: self.data.iter().map(|&v| u8::from(v == 0)).collect(),
        }
    }

    /// Resizes the mask to `res` using nearest neighbor sampling.
    pub fn resize(&self, res: Resolution) -> Self {
        if res == self.res {
            return self.clone();
        }
        if self.res.num_pixels() == 0 {
            return Self::empty(res);
        }

        let sx = self.res.width() as f32 / res.width() as f32;
        let sy = self.res.height() as f32 / res.height() as f32;
        Self::from_fn(res, |x, y| {
            let src_x = (((x as f32 + 0.5) * sx) as u32).min(self.res.width() - 1);
            let src_y = (((y as f32 + 0.5) * sy) as u32).min(self.res.height() - 1);
            self.get(src_x, src_y)
        })
    }

    /// Computes the bounding rectangle of all included pixels.
    ///
    /// Returns `None` if the mask is empty.
    pub fn bounding_rect(&self) -> Option<Rect> {
        Rect::bounding(self.included())
    }

    /// Returns an iterator over the coordinates of all included pixels.
    pub fn included(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        let w = self.res.width() as usize;
        self.data
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0)
            .map(move |(i, _)| ((i % w) as i32, (i / w) as i32))
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mask({}, {} set)", self.res, self.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_strict() {
        let mask =
            Mask::from_confidence(Resolution::new(2, 2), &[0.2, 0.5, 0.51, 1.0], 0.5).unwrap();
        assert_eq!(mask.as_slice(), &[0, 0, 1, 1]);
        assert_eq!(mask.count(), 2);
        assert!(mask.get(0, 1));
        assert!(!mask.get(1, 0));
    }

    #[test]
    fn confidence_size_mismatch() {
        assert!(Mask::from_confidence(Resolution::new(2, 2), &[0.0; 3], 0.5).is_err());
    }

    #[test]
    fn rect_mask_and_bounds() {
        let rect = Rect::from_top_left(1, 1, 2, 3);
        let mask = Mask::from_rect(Resolution::new(5, 5), rect);
        assert_eq!(mask.count(), 6);
        assert_eq!(mask.bounding_rect(), Some(rect));
        assert_eq!(mask.inverted().count(), 19);
        assert_eq!(Mask::empty(Resolution::new(3, 3)).bounding_rect(), None);
    }

    #[test]
    fn resize_nearest() {
        let mask = Mask::from_fn(Resolution::new(2, 2), |x, y| x == 1 && y == 1);
        let big = mask.resize(Resolution::new(4, 4));
        assert_eq!(big.count(), 4);
        assert!(big.get(2, 2) && big.get(3, 3));
        assert!(!big.get(1, 1));

        let small = big.resize(Resolution::new(2, 2));
        assert_eq!(small, mask);
    }
}
