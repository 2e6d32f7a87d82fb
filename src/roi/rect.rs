//! Fixed rectangular region of interest.

use anyhow::{bail, ensure};

use super::RoiDetector;
use crate::{containers::RegionOfInterest, image::Image, mask::Mask};

/// An [`RoiDetector`] that uses a fixed rectangle, specified relative to the frame size, as the
/// face region.
///
/// This is useful when the subject keeps still in front of the camera, or when no segmentation
/// model is available. The background mask covers everything outside of the face rectangle grown
/// by a relative margin.
#[derive(Debug, Clone)]
pub struct RectDetector {
    /// Relative `(x, y, w, h)` in range 0.0 to 1.0.
    rel: [f32; 4],
    bg_margin: Option<f32>,
}

impl Default for RectDetector {
    /// Uses the centered area covering 40% of the frame width and 50% of its height.
    fn default() -> Self {
        Self {
            rel: [0.3, 0.25, 0.4, 0.5],
            bg_margin: Some(0.25),
        }
    }
}

impl RectDetector {
    /// Creates a detector using the rectangle at relative position `(x, y)` with relative size
    /// `(w, h)`.
    ///
    /// Returns an error if the rectangle is empty or does not lie within the frame.
    pub fn relative(x: f32, y: f32, w: f32, h: f32) -> anyhow::Result<Self> {
        ensure!(
            w > 0.0 && h > 0.0,
            "ROI rectangle must not be empty (got {w}x{h})"
        );
        ensure!(
            x >= 0.0 && y >= 0.0 && x + w <= 1.0 && y + h <= 1.0,
            "ROI rectangle ({x}, {y}, {w}, {h}) exceeds the frame"
        );
        Ok(Self {
            rel: [x, y, w, h],
            ..Self::default()
        })
    }

    /// Sets the relative margin around the face rectangle that is excluded from the background.
    ///
    /// Passing `None` disables the background mask.
    pub fn with_bg_margin(mut self, margin: Option<f32>) -> Self {
        self.bg_margin = margin;
        self
    }
}

impl RoiDetector for RectDetector {
    fn detect(&mut self, frame: &Image) -> anyhow::Result<RegionOfInterest> {
        let res = frame.resolution();
        let [x, y, w, h] = self.rel;
        let (fw, fh) = (res.width() as f32, res.height() as f32);
        let rect = crate::image::Rect::from_top_left(
            (x * fw).round() as i32,
            (y * fh).round() as i32,
            ((w * fw).round() as u32).max(1),
            ((h * fh).round() as u32).max(1),
        );
        let Some(rect) = rect.clamp_to(res) else {
            bail!("ROI rectangle lies outside of the {res} frame");
        };

        let mut roi = RegionOfInterest::new(Mask::from_rect(res, rect), frame.clone())?
            .with_face_rect(rect);
        if let Some(margin) = self.bg_margin {
            let bg = Mask::from_rect(res, rect.grow_rel(margin)).inverted();
            roi = roi.with_bg_mask(bg)?;
        }
        Ok(roi)
    }
}

#[cfg(test)]
mod tests {
    use crate::image::Rect;

    use super::*;

    #[test]
    fn default_rect() {
        let frame = Image::new(100, 100);
        let roi = RectDetector::default().detect(&frame).unwrap();
        assert_eq!(roi.face_rect(), Some(Rect::from_top_left(30, 25, 40, 50)));
        assert_eq!(roi.mask().count(), 40 * 50);

        // grown by 10 and 13 pixels per side (rounded)
        let bg = roi.bg_mask().unwrap();
        assert!(bg.get(0, 0));
        assert!(!bg.get(25, 20));
        assert!(!bg.get(50, 50));
    }

    #[test]
    fn invalid_rects() {
        assert!(RectDetector::relative(0.5, 0.5, 0.6, 0.1).is_err());
        assert!(RectDetector::relative(0.0, 0.0, 0.0, 0.5).is_err());
        assert!(RectDetector::relative(0.0, 0.0, 1.0, 1.0).is_ok());
    }

    #[test]
    fn without_background() {
        let frame = Image::new(10, 10);
        let mut det = RectDetector::relative(0.0, 0.0, 0.5, 0.5)
            .unwrap()
            .with_bg_margin(None);
        let roi = det.detect(&frame).unwrap();
        assert!(roi.bg_mask().is_none());
        assert_eq!(roi.mask().count(), 25);
    }
}
