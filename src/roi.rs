//! Region of interest detection.
//!
//! An [`RoiDetector`] finds the facial skin pixels (and, optionally, the background pixels) of a
//! video frame and returns them as a [`RegionOfInterest`].

pub mod rect;
pub mod selfie;

pub use rect::RectDetector;
pub use selfie::SelfieDetector;

use crate::{containers::RegionOfInterest, image::Image};

/// Trait for types that can locate the region of interest in a video frame.
pub trait RoiDetector: Send {
    /// Identifies the face skin region (and background, if supported) in the given frame.
    fn detect(&mut self, frame: &Image) -> anyhow::Result<RegionOfInterest>;
}

impl<D: RoiDetector + ?Sized> RoiDetector for Box<D> {
    fn detect(&mut self, frame: &Image) -> anyhow::Result<RegionOfInterest> {
        (**self).detect(frame)
    }
}
