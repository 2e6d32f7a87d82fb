//! The rPPG pipeline.

use crate::{
    containers::RppgResult,
    hr::{HrCalculator, PeakBasedHrCalculator},
    image::Image,
    processor::{ChromProcessor, Processor},
    roi::{RectDetector, RoiDetector},
    timer::Timer,
};

/// Extracts the pulse signal and heart rate from a sequence of video frames.
///
/// Every frame passes through the [`RoiDetector`], then the [`Processor`] turns the region of
/// interest into a signal value, which is finally fed to the [`HrCalculator`].
pub struct Rppg {
    roi_detector: Box<dyn RoiDetector>,
    processor: Box<dyn Processor>,
    hr_calculator: Box<dyn HrCalculator>,
    t_detect: Timer,
    t_process: Timer,
}

impl Rppg {
    pub fn new<D, P, H>(roi_detector: D, processor: P, hr_calculator: H) -> Self
    where
        D: RoiDetector + 'static,
        P: Processor + 'static,
        H: HrCalculator + 'static,
    {
        Self {
            roi_detector: Box::new(roi_detector),
            processor: Box::new(processor),
            hr_calculator: Box::new(hr_calculator),
            t_detect: Timer::new("detect"),
            t_process: Timer::new("process"),
        }
    }

    /// Creates a pipeline for video at `fps` frames per second that doesn't need a segmentation
    /// model.
    ///
    /// It uses a fixed [`RectDetector`], the [`ChromProcessor`] and a
    /// [`PeakBasedHrCalculator`].
    pub fn for_fps(fps: f32) -> Self {
        Self::new(
            RectDetector::default(),
            ChromProcessor::default(),
            PeakBasedHrCalculator::for_fps(fps),
        )
    }

    /// Returns the signal processor in use.
    pub fn processor(&self) -> &dyn Processor {
        &*self.processor
    }

    /// Processes the next video frame.
    ///
    /// Returns an error if the ROI detector fails. In that case the frame does not contribute to
    /// the signal history.
    pub fn process_frame(&mut self, frame: &Image) -> anyhow::Result<RppgResult> {
        let roi = self.t_detect.time(|| self.roi_detector.detect(frame))?;

        let _guard = self.t_process.start();
        let value = self.processor.calculate(&roi);
        let roi_mean = roi.mean_color();
        let bg_mean = roi.bg_mean_color();
        let mut result = RppgResult::new(value, roi, roi_mean, bg_mean);
        result.hr = self.hr_calculator.update(value);
        Ok(result)
    }

    /// Processes all frames of a recorded video.
    ///
    /// Stops at the first frame that fails to load or process.
    pub fn process_frames<I>(&mut self, frames: I) -> anyhow::Result<Vec<RppgResult>>
    where
        I: IntoIterator<Item = anyhow::Result<Image>>,
    {
        let frames = frames.into_iter();
        let mut results = Vec::with_capacity(frames.size_hint().0);
        for frame in frames {
            results.push(self.process_frame(&frame?)?);
        }
        Ok(results)
    }

    /// Discards the signal history of the processor and heart rate estimator.
    pub fn reset(&mut self) {
        log::debug!("resetting {}", self.processor);
        self.processor.reset();
        self.hr_calculator.reset();
    }

    /// Returns profiling timers for ROI detection and signal processing.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_detect, &self.t_process].into_iter()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        containers::RegionOfInterest, image::Pixel, processor::GreenProcessor,
        resolution::Resolution,
    };

    fn frame(g: u8) -> Image {
        Image::from_fn(Resolution::new(20, 20), |_, _| Pixel::from_rgb8(150, g, 90))
    }

    #[test]
    fn single_frame() {
        let mut rppg = Rppg::new(
            RectDetector::default(),
            GreenProcessor::new(),
            PeakBasedHrCalculator::new(10, 1, 1),
        );
        let result = rppg.process_frame(&frame(77)).unwrap();
        assert_eq!(result.value, 77.0);
        assert_relative_eq!(result.roi_mean.r, 150.0);
        assert_relative_eq!(result.bg_mean.b, 90.0);
        assert!(result.hr.is_nan());
        assert_eq!(result.roi.base_image().resolution(), Resolution::new(20, 20));
        assert_eq!(rppg.processor().name(), "GreenChannel");
        assert!(rppg.timers().all(|t| t.count() == 1));
    }

    #[test]
    fn periodic_signal() {
        // square wave with a period of 8 frames
        let frames = (0..64).map(|i| Ok(frame(if i % 8 < 4 { 100 } else { 104 })));
        let mut rppg = Rppg::new(
            RectDetector::default(),
            GreenProcessor::new(),
            PeakBasedHrCalculator::new(32, 2, 1),
        );
        let results = rppg.process_frames(frames).unwrap();
        assert_eq!(results.len(), 64);
        assert_eq!(results.last().unwrap().hr, 8.0);
        assert_relative_eq!(results.last().unwrap().hr_bpm(30.0), 225.0);

        rppg.reset();
        assert!(rppg.process_frame(&frame(100)).unwrap().hr.is_nan());
    }

    struct FailingDetector;

    impl RoiDetector for FailingDetector {
        fn detect(&mut self, _frame: &Image) -> anyhow::Result<RegionOfInterest> {
            bail!("no face")
        }
    }

    #[test]
    fn detector_errors_propagate() {
        let mut rppg = Rppg::new(
            FailingDetector,
            GreenProcessor::new(),
            PeakBasedHrCalculator::new(10, 1, 1),
        );
        let err = rppg.process_frame(&frame(0)).unwrap_err();
        assert_eq!(err.to_string(), "no face");

        let frames = [Ok(frame(0)), Err(anyhow::anyhow!("unreadable"))];
        assert!(Rppg::for_fps(30.0).process_frames(frames).is_err());
    }
}
