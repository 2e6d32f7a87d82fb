//! rPPG signal extraction.
//!
//! A [`Processor`] turns the region of interest of each frame into a single signal value. Most
//! processors start by averaging the ROI's pixel colors ([`spatial_pooling`]) and then combine the
//! color channels in some way.

mod chrom;
mod config;

use std::{borrow::Cow, fmt};

use itertools::Itertools;

pub use chrom::{ChromMethod, ChromProcessor};
pub use config::ProcessorConfig;

use crate::{
    containers::{Color, RegionOfInterest},
    filter::{Filter, SimpleFilter},
    image::Image,
    mask::Mask,
    num::nanmean,
};

/// Computes the mean color of all pixels of `image` that are included in `mask`.
///
/// Channel values are in range 0.0 to 255.0 and the alpha channel is always 1.0. Returns
/// [`Color::null`] if the mask is empty.
///
/// # Panics
///
/// Panics if `image` and `mask` have different resolutions.
pub fn mean_color(image: &Image, mask: &Mask) -> Color {
    assert_eq!(
        image.resolution(),
        mask.resolution(),
        "mask does not match image"
    );

    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for (pixel, &m) in image.data().chunks_exact(4).zip_eq(mask.as_slice()) {
        if m != 0 {
            sum[0] += u64::from(pixel[0]);
            sum[1] += u64::from(pixel[1]);
            sum[2] += u64::from(pixel[2]);
            count += 1;
        }
    }

    if count == 0 {
        return Color::null();
    }
    let [r, g, b] = sum.map(|s| (s as f64 / count as f64) as f32);
    Color::rgb(r, g, b)
}

/// Averages the color channels over the region of interest.
///
/// If `history` is given, the pooled channels are appended to it.
pub fn spatial_pooling(roi: &RegionOfInterest, history: Option<&mut RgbHistory>) -> Color {
    let color = roi.mean_color();
    if let Some(history) = history {
        history.push(color);
    }
    color
}

/// Computes the mean of the last `winsize` values of `xs`, ignoring NaN values.
///
/// A `winsize` of 0 averages all of `xs`, like a window larger than `xs` does. Returns NaN if `xs`
/// is empty or the window holds only NaN values.
pub fn moving_average_update(xs: &[f32], winsize: usize) -> f32 {
    if xs.is_empty() {
        return f32::NAN;
    }
    let start = match winsize {
        0 => 0,
        n => xs.len().saturating_sub(n),
    };
    nanmean(&xs[start..])
}

/// Recorded history of pooled color channels.
#[derive(Debug, Default, Clone)]
pub struct RgbHistory {
    pub rs: Vec<f32>,
    pub gs: Vec<f32>,
    pub bs: Vec<f32>,
    limit: Option<usize>,
}

impl RgbHistory {
    /// Creates an empty history that keeps every value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty history that keeps only the `limit` most recent values.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn push(&mut self, color: Color) {
        self.rs.push(color.r);
        self.gs.push(color.g);
        self.bs.push(color.b);

        if let Some(limit) = self.limit {
            for channel in [&mut self.rs, &mut self.gs, &mut self.bs] {
                if channel.len() > limit {
                    channel.drain(..channel.len() - limit);
                }
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rs.is_empty()
    }

    pub fn clear(&mut self) {
        self.rs.clear();
        self.gs.clear();
        self.bs.clear();
    }
}

/// Trait for rPPG signal extractors.
pub trait Processor: Send {
    /// Returns a human-readable name for this processor.
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("Processor")
    }

    /// Computes the signal value for the region of interest of the current frame.
    ///
    /// Returns NaN if no value can be computed for the frame.
    fn calculate(&mut self, roi: &RegionOfInterest) -> f32;

    /// Discards all accumulated history.
    fn reset(&mut self) {}
}

impl<P: Processor + ?Sized> Processor for Box<P> {
    fn name(&self) -> Cow<'_, str> {
        (**self).name()
    }

    fn calculate(&mut self, roi: &RegionOfInterest) -> f32 {
        (**self).calculate(roi)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

impl fmt::Display for dyn Processor + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A processor that never produces a value.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProcessor;

impl Processor for NullProcessor {
    fn calculate(&mut self, _roi: &RegionOfInterest) -> f32 {
        f32::NAN
    }
}

/// Uses the mean green channel of the ROI as the signal.
///
/// Hemoglobin absorbs green light most strongly, so the green channel carries the largest share
/// of the pulse signal.
#[derive(Debug, Default, Clone)]
pub struct GreenProcessor {
    history: Option<RgbHistory>,
}

impl GreenProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the processor record all pooled colors.
    pub fn recording_rgb(mut self) -> Self {
        self.history = Some(RgbHistory::new());
        self
    }

    /// Returns the recorded colors, if recording is enabled.
    pub fn rgb_history(&self) -> Option<&RgbHistory> {
        self.history.as_ref()
    }
}

impl Processor for GreenProcessor {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("GreenChannel")
    }

    fn calculate(&mut self, roi: &RegionOfInterest) -> f32 {
        spatial_pooling(roi, self.history.as_mut()).g
    }

    fn reset(&mut self) {
        if let Some(history) = &mut self.history {
            history.clear();
        }
    }
}

/// Wraps a [`Processor`] and records every value it calculates.
#[derive(Debug, Clone)]
pub struct Recorded<P> {
    inner: P,
    vs: Vec<f32>,
}

impl<P: Processor> Recorded<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            vs: Vec::new(),
        }
    }

    /// Returns all values calculated since construction or the last reset.
    pub fn values(&self) -> &[f32] {
        &self.vs
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: Processor> Processor for Recorded<P> {
    fn name(&self) -> Cow<'_, str> {
        self.inner.name()
    }

    fn calculate(&mut self, roi: &RegionOfInterest) -> f32 {
        let v = self.inner.calculate(roi);
        self.vs.push(v);
        v
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.vs.clear();
    }
}

/// Applies a [`Filter`] to the output of another [`Processor`].
///
/// NaN values bypass the filter so that frames without a measurement do not affect its state.
pub struct FilteredProcessor<P, F: Filter<f32>> {
    inner: P,
    filter: SimpleFilter<F>,
}

impl<P: Processor, F: Filter<f32>> FilteredProcessor<P, F> {
    pub fn new(inner: P, filter: F) -> Self {
        Self {
            inner,
            filter: SimpleFilter::new(filter),
        }
    }
}

impl<P, F> Processor for FilteredProcessor<P, F>
where
    P: Processor,
    F: Filter<f32> + Send,
    F::State: Send,
{
    fn name(&self) -> Cow<'_, str> {
        Cow::Owned(format!("Filtered{}", self.inner.name()))
    }

    fn calculate(&mut self, roi: &RegionOfInterest) -> f32 {
        let v = self.inner.calculate(roi);
        if v.is_nan() {
            return v;
        }
        self.filter.filter(v)
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.filter.reset();
    }
}
