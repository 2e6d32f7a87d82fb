//! Face skin detection with the multiclass selfie segmentation network.
//!
//! The network classifies every pixel of a 256x256 input into one of six classes: background,
//! hair, body skin, face skin, clothes, and other accessories. Only the background and face skin
//! confidences are used here.
//!
//! The model is not bundled with this crate. An ONNX export of the MediaPipe
//! `selfie_multiclass_256x256` model has to be loaded via [`SelfieDetector::load`].
//!
//! Inference runs on the CPU and is slow (on the order of 100ms per frame), so this detector is
//! best suited for offline processing.

use std::path::Path;

use anyhow::{bail, ensure};

use super::RoiDetector;
use crate::{
    containers::RegionOfInterest,
    image::Image,
    mask::Mask,
    nn::{tensor::Tensor, Cnn, CnnInputShape, ColorMapper, NeuralNetwork},
    resolution::Resolution,
    timer::Timer,
};

/// Index of the background class in the network output.
pub const BACKGROUND_CLASS: usize = 0;

/// Index of the face skin class in the network output.
pub const FACE_SKIN_CLASS: usize = 3;

const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Face detector based on the multiclass selfie segmentation network.
pub struct SelfieDetector {
    cnn: Cnn,
    output_layout: CnnInputShape,
    confidence: f32,
    t_infer: Timer,
}

impl SelfieDetector {
    /// Loads the segmentation network from an ONNX file.
    pub fn load<P: AsRef<Path>>(model_path: P) -> anyhow::Result<Self> {
        let path = model_path.as_ref();
        log::info!("loading selfie segmentation model from '{}'", path.display());
        Self::from_network(NeuralNetwork::load(path)?)
    }

    /// Creates a detector from an already loaded segmentation network.
    ///
    /// The network must take a single `[1, H, W, 3]` image input with values in range 0.0 to 1.0,
    /// and output its class confidences in the same channels-last layout.
    pub fn from_network(nn: NeuralNetwork) -> anyhow::Result<Self> {
        let cnn = Cnn::new(nn, CnnInputShape::NHWC, ColorMapper::linear(0.0..=1.0))?;
        Ok(Self {
            cnn,
            output_layout: CnnInputShape::NHWC,
            confidence: DEFAULT_CONFIDENCE,
            t_infer: Timer::new("segmentation"),
        })
    }

    /// Sets the minimum class confidence for a pixel to be included in a mask.
    ///
    /// # Panics
    ///
    /// Panics if `confidence` is not between 0.0 and 1.0.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        assert!(
            (0.0..=1.0).contains(&confidence),
            "invalid confidence threshold {confidence}"
        );
        self.confidence = confidence;
        self
    }

    #[inline]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Returns the inference timer.
    pub fn timer(&self) -> &Timer {
        &self.t_infer
    }
}

impl RoiDetector for SelfieDetector {
    fn detect(&mut self, frame: &Image) -> anyhow::Result<RegionOfInterest> {
        let outputs = self.t_infer.time(|| self.cnn.estimate(frame))?;
        let masks = SegmentationMasks::from_outputs(outputs.iter(), self.output_layout)?;
        roi_from_segmentation(&masks, frame, self.confidence)
    }
}

/// Per-class confidence maps produced by a segmentation network.
#[derive(Debug, Clone)]
pub struct SegmentationMasks {
    res: Resolution,
    /// One row-major confidence map per class.
    classes: Vec<Vec<f32>>,
}

impl SegmentationMasks {
    /// Extracts the confidence maps from the first output of a segmentation network.
    ///
    /// Any further outputs are ignored.
    pub fn from_outputs<'a, I>(outputs: I, layout: CnnInputShape) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = &'a Tensor>,
    {
        let Some(tensor) = outputs.into_iter().next() else {
            bail!("segmentation network produced no outputs");
        };
        Self::from_tensor(tensor, layout)
    }

    /// Splits a network output into per-class confidence maps.
    ///
    /// `layout` names the dimension order of `tensor`: [`CnnInputShape::NHWC`] for
    /// `[1, H, W, C]` outputs and [`CnnInputShape::NCHW`] for `[1, C, H, W]` outputs.
    pub fn from_tensor(tensor: &Tensor, layout: CnnInputShape) -> anyhow::Result<Self> {
        let &[1, d1, d2, d3] = tensor.shape() else {
            bail!(
                "unexpected segmentation output shape {:?}",
                tensor.shape()
            );
        };

        let channels_last = match layout {
            CnnInputShape::NHWC => true,
            CnnInputShape::NCHW => false,
        };
        let (h, w, c) = if channels_last {
            (d1, d2, d3)
        } else {
            (d2, d3, d1)
        };
        ensure!(
            c > FACE_SKIN_CLASS,
            "segmentation output has {c} classes, need at least {}",
            FACE_SKIN_CLASS + 1
        );

        let data = tensor.as_slice();
        let classes = (0..c)
            .map(|class| {
                if channels_last {
                    data.iter().skip(class).step_by(c).copied().collect()
                } else {
                    data[class * h * w..(class + 1) * h * w].to_vec()
                }
            })
            .collect();

        Ok(Self {
            res: Resolution::new(w.try_into()?, h.try_into()?),
            classes,
        })
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.res
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Returns the confidence map of class `class`.
    ///
    /// # Panics
    ///
    /// Panics if `class` is out of range.
    pub fn class(&self, class: usize) -> &[f32] {
        &self.classes[class]
    }
}

/// Builds the region of interest for `frame` from segmentation results.
///
/// The masks are thresholded at network resolution and then scaled to the frame's resolution. The
/// face bounding box is derived from the face skin mask.
pub fn roi_from_segmentation(
    masks: &SegmentationMasks,
    frame: &Image,
    confidence: f32,
) -> anyhow::Result<RegionOfInterest> {
    let res = frame.resolution();
    let face = Mask::from_confidence(masks.res, masks.class(FACE_SKIN_CLASS), confidence)?
        .resize(res);
    let bg = Mask::from_confidence(masks.res, masks.class(BACKGROUND_CLASS), confidence)?
        .resize(res);

    let face_rect = face.bounding_rect();
    if face_rect.is_none() {
        log::trace!("no face skin pixels above confidence {confidence}");
    }

    let mut roi = RegionOfInterest::new(face, frame.clone())?.with_bg_mask(bg)?;
    if let Some(rect) = face_rect {
        roi = roi.with_face_rect(rect);
    }
    Ok(roi)
}

#[cfg(test)]
mod tests {
    use crate::image::Rect;

    use super::*;

    /// Builds a 4x4 segmentation with face skin in the top left quadrant and background
    /// everywhere else.
    fn segmentation_value(y: usize, x: usize, class: usize) -> f32 {
        let face = y < 2 && x < 2;
        match class {
            FACE_SKIN_CLASS if face => 0.9,
            BACKGROUND_CLASS if !face => 0.8,
            _ => 0.02,
        }
    }

    fn channels_last() -> Tensor {
        Tensor::from_array_shape_fn([1, 4, 4, 6], |[_, y, x, c]| segmentation_value(y, x, c))
    }

    #[test]
    fn channels_last_layout() {
        let masks = SegmentationMasks::from_tensor(&channels_last(), CnnInputShape::NHWC).unwrap();
        assert_eq!(masks.resolution(), Resolution::new(4, 4));
        assert_eq!(masks.num_classes(), 6);
        assert_eq!(masks.class(FACE_SKIN_CLASS)[0], 0.9);
        assert_eq!(masks.class(FACE_SKIN_CLASS)[2], 0.02);
    }

    #[test]
    fn channels_first_layout() {
        let tensor = Tensor::from_array_shape_fn([1, 6, 4, 4], |[_, c, y, x]| {
            segmentation_value(y, x, c)
        });
        let masks = SegmentationMasks::from_tensor(&tensor, CnnInputShape::NCHW).unwrap();
        assert_eq!(masks.resolution(), Resolution::new(4, 4));
        assert_eq!(masks.num_classes(), 6);
        assert_eq!(masks.class(BACKGROUND_CLASS)[15], 0.8);
        assert_eq!(masks.class(BACKGROUND_CLASS)[0], 0.02);
    }

    #[test]
    fn rejects_bad_shapes() {
        let tensor = Tensor::from_iter(&[1, 2, 2, 2], [0.0; 8]);
        assert!(SegmentationMasks::from_tensor(&tensor, CnnInputShape::NHWC).is_err());
        assert!(SegmentationMasks::from_tensor(&tensor, CnnInputShape::NCHW).is_err());
        let tensor = Tensor::from_iter(&[4, 4], [0.0; 16]);
        assert!(SegmentationMasks::from_tensor(&tensor, CnnInputShape::NHWC).is_err());
    }

    #[test]
    fn first_output_used() {
        let second = Tensor::from_iter(&[1, 2], [0.0; 2]);
        let masks =
            SegmentationMasks::from_outputs([&channels_last(), &second], CnnInputShape::NHWC)
                .unwrap();
        assert_eq!(masks.resolution(), Resolution::new(4, 4));
        assert_eq!(masks.class(FACE_SKIN_CLASS)[0], 0.9);

        let none: [&Tensor; 0] = [];
        assert!(SegmentationMasks::from_outputs(none, CnnInputShape::NHWC).is_err());
    }

    #[test]
    fn roi_scaled_to_frame() {
        let masks = SegmentationMasks::from_tensor(&channels_last(), CnnInputShape::NHWC).unwrap();
        let frame = Image::new(8, 8);

        let roi = roi_from_segmentation(&masks, &frame, 0.5).unwrap();
        assert_eq!(roi.mask().resolution(), Resolution::new(8, 8));
        assert_eq!(roi.mask().count(), 16);
        assert_eq!(roi.bg_mask().unwrap().count(), 48);
        assert_eq!(roi.face_rect(), Some(Rect::from_top_left(0, 0, 4, 4)));

        let roi = roi_from_segmentation(&masks, &frame, 0.95).unwrap();
        assert!(roi.mask().is_empty());
        assert_eq!(roi.face_rect(), None);
    }
}
