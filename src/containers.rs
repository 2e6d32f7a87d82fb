//! Containers passed between the stages of the rPPG pipeline.
//!
//! All of these are plain values that are created once per video frame.

use std::fmt;

use anyhow::{bail, ensure};

use crate::{
    image::{Image, Rect},
    mask::Mask,
    processor::mean_color,
};

/// Defines the region of interest (and background) in a video frame.
#[derive(Debug, Clone)]
pub struct RegionOfInterest {
    mask: Mask,
    base_image: Image,
    bg_mask: Option<Mask>,
    face_rect: Option<Rect>,
}

impl RegionOfInterest {
    /// Creates a region of interest from a skin mask and the frame it was computed on.
    ///
    /// Returns an error if `mask` does not have the same resolution as `base_image`.
    pub fn new(mask: Mask, base_image: Image) -> anyhow::Result<Self> {
        ensure!(
            mask.resolution() == base_image.resolution(),
            "ROI mask resolution {} does not match image resolution {}",
            mask.resolution(),
            base_image.resolution(),
        );
        Ok(Self {
            mask,
            base_image,
            bg_mask: None,
            face_rect: None,
        })
    }

    /// Attaches a background mask.
    ///
    /// Returns an error if `bg_mask` does not have the same resolution as the base image.
    pub fn with_bg_mask(mut self, bg_mask: Mask) -> anyhow::Result<Self> {
        ensure!(
            bg_mask.resolution() == self.base_image.resolution(),
            "background mask resolution {} does not match image resolution {}",
            bg_mask.resolution(),
            self.base_image.resolution(),
        );
        self.bg_mask = Some(bg_mask);
        Ok(self)
    }

    /// Attaches the bounding box of the detected face.
    pub fn with_face_rect(mut self, face_rect: Rect) -> Self {
        self.face_rect = Some(face_rect);
        self
    }

    #[inline]
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    #[inline]
    pub fn base_image(&self) -> &Image {
        &self.base_image
    }

    #[inline]
    pub fn bg_mask(&self) -> Option<&Mask> {
        self.bg_mask.as_ref()
    }

    /// Returns the bounding box of the detected face, if the detector provided one.
    #[inline]
    pub fn face_rect(&self) -> Option<Rect> {
        self.face_rect
    }

    /// Computes the mean color of the region of interest.
    pub fn mean_color(&self) -> Color {
        mean_color(&self.base_image, &self.mask)
    }

    /// Computes the mean color of the background, or [`Color::null`] if there is no background
    /// mask.
    pub fn bg_mean_color(&self) -> Color {
        match &self.bg_mask {
            Some(bg) => mean_color(&self.base_image, bg),
            None => Color::null(),
        }
    }
}

/// A color in RGB(A) format with floating-point channels.
///
/// Channel values produced by spatial pooling are in range 0.0 to 255.0.
#[derive(Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// Creates an opaque color.
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates the "empty" color, whose color channels are NaN.
    pub const fn null() -> Self {
        Self::rgb(f32::NAN, f32::NAN, f32::NAN)
    }

    /// Returns `true` if any color channel is NaN.
    pub fn is_null(&self) -> bool {
        self.r.is_nan() || self.g.is_nan() || self.b.is_nan()
    }

    /// Converts this color to a `[r, g, b, a]` array.
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Interprets a slice of 3 (`[r, g, b]`) or 4 (`[r, g, b, a]`) values as a [`Color`].
    pub fn from_slice(values: &[f32]) -> anyhow::Result<Self> {
        match *values {
            [r, g, b] => Ok(Self::rgb(r, g, b)),
            [r, g, b, a] => Ok(Self::rgba(r, g, b, a)),
            _ => bail!(
                "cannot interpret {:?} as a color (expected 3 or 4 values)",
                values
            ),
        }
    }
}

impl From<[f32; 3]> for Color {
    fn from([r, g, b]: [f32; 3]) -> Self {
        Self::rgb(r, g, b)
    }
}

impl From<[f32; 4]> for Color {
    fn from([r, g, b, a]: [f32; 4]) -> Self {
        Self::rgba(r, g, b, a)
    }
}

impl From<Color> for [f32; 4] {
    fn from(c: Color) -> Self {
        c.to_array()
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Color({:.2}, {:.2}, {:.2}, {:.2})",
            self.r, self.g, self.b, self.a
        )
    }
}

/// The output of the rPPG pipeline for a single frame.
#[derive(Debug, Clone)]
pub struct RppgResult {
    /// Output value of the rPPG signal extractor.
    pub value: f32,
    /// Region of interest identified in the frame.
    pub roi: RegionOfInterest,
    /// Mean color of the ROI.
    pub roi_mean: Color,
    /// Mean color of the background.
    pub bg_mean: Color,
    /// Heart rate estimate in frames per beat (NaN if there is none yet).
    pub hr: f32,
}

impl RppgResult {
    pub fn new(value: f32, roi: RegionOfInterest, roi_mean: Color, bg_mean: Color) -> Self {
        Self {
            value,
            roi,
            roi_mean,
            bg_mean,
            hr: f32::NAN,
        }
    }

    pub fn to_array(&self) -> [f32; 1] {
        [self.value]
    }

    /// Converts the heart rate estimate to beats per minute, given the video frame rate.
    pub fn hr_bpm(&self, fps: f32) -> f32 {
        crate::hr::frames_per_beat_to_bpm(self.hr, fps)
    }
}
