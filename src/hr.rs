//! Heart rate estimation from the rPPG signal.
//!
//! Heart rates are expressed in *frames per beat*, which does not depend on knowing the exact
//! frame rate of the video. Use [`frames_per_beat_to_bpm`] to convert to beats per minute.

use std::collections::VecDeque;

use itertools::Itertools;

use crate::num::{nanmedian, TotalF32};

/// Converts a heart period in frames per beat to beats per minute.
///
/// NaN inputs (no estimate) result in NaN.
pub fn frames_per_beat_to_bpm(frames_per_beat: f32, fps: f32) -> f32 {
    60.0 * fps / frames_per_beat
}

/// Trait for heart rate estimators fed with one signal value per frame.
pub trait HrCalculator: Send {
    /// Adds the signal value of a new frame and returns the current heart rate estimate in frames
    /// per beat, or NaN if there is none.
    fn update(&mut self, value: f32) -> f32;

    /// Discards all accumulated signal history.
    fn reset(&mut self);
}

impl<H: HrCalculator + ?Sized> HrCalculator for Box<H> {
    fn update(&mut self, value: f32) -> f32 {
        (**self).update(value)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Estimates the heart rate from the median distance between peaks in the signal.
#[derive(Debug, Clone)]
pub struct PeakBasedHrCalculator {
    window_size: usize,
    distance: usize,
    update_interval: usize,
    values: VecDeque<f32>,
    frames_since_update: usize,
    hr: f32,
}

impl PeakBasedHrCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size` is the number of most recent frames searched for peaks.
    /// - `distance` is the minimum number of frames between two peaks.
    /// - `update_interval` is the number of frames between two estimates.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is smaller than 2 or `update_interval` is 0.
    pub fn new(window_size: usize, distance: usize, update_interval: usize) -> Self {
        assert!(window_size >= 2, "HR window must hold at least 2 frames");
        assert!(update_interval > 0, "HR update interval must be positive");
        Self {
            window_size,
            distance,
            update_interval,
            values: VecDeque::with_capacity(window_size + 1),
            frames_since_update: 0,
            hr: f32::NAN,
        }
    }

    /// Creates a calculator suitable for video at `fps` frames per second.
    ///
    /// It searches the last 10 seconds for peaks at most 200 beats per minute apart and updates
    /// its estimate once per second.
    pub fn for_fps(fps: f32) -> Self {
        let window_size = ((fps * 10.0).round() as usize).max(2);
        let distance = (fps * 60.0 / 200.0).floor() as usize;
        let update_interval = (fps.round() as usize).max(1);
        Self::new(window_size, distance, update_interval)
    }

    /// Returns the last heart rate estimate in frames per beat.
    #[inline]
    pub fn hr(&self) -> f32 {
        self.hr
    }

    fn estimate(&mut self) -> f32 {
        let peaks = find_peaks(self.values.make_contiguous(), self.distance);
        if peaks.len() < 2 {
            log::trace!("only {} peaks in HR window", peaks.len());
            return f32::NAN;
        }

        let intervals = peaks
            .iter()
            .tuple_windows()
            .map(|(a, b)| (b - a) as f32)
            .collect::<Vec<_>>();
        nanmedian(&intervals)
    }
}

impl HrCalculator for PeakBasedHrCalculator {
    fn update(&mut self, value: f32) -> f32 {
        self.values.push_back(value);
        if self.values.len() > self.window_size {
            self.values.pop_front();
        }

        self.frames_since_update += 1;
        if self.values.len() >= self.window_size / 2
            && self.frames_since_update >= self.update_interval
        {
            self.frames_since_update = 0;
            self.hr = self.estimate();
        }
        self.hr
    }

    fn reset(&mut self) {
        self.values.clear();
        self.frames_since_update = 0;
        self.hr = f32::NAN;
    }
}

/// Finds the indices of local maxima in `xs`, in ascending order.
///
/// A peak is a value, or a run of equal values, with smaller neighbors on both sides. Runs are
/// reported at their middle index (rounded down). Values at either end and NaN values are never
/// peaks. Peaks closer than `distance` samples to a higher peak are discarded.
pub fn find_peaks(xs: &[f32], distance: usize) -> Vec<usize> {
    let mut candidates = Vec::new();
    let mut i = 1;
    while i + 1 < xs.len() {
        if xs[i] > xs[i - 1] {
            let mut end = i;
            while end + 1 < xs.len() && xs[end + 1] == xs[i] {
                end += 1;
            }
            if end + 1 < xs.len() && xs[end + 1] < xs[i] {
                candidates.push((i + end) / 2);
            }
            i = end + 1;
        } else {
            i += 1;
        }
    }
    if distance <= 1 {
        return candidates;
    }

    let mut kept: Vec<usize> = Vec::with_capacity(candidates.len());
    for i in candidates
        .into_iter()
        .sorted_by_key(|&i| std::cmp::Reverse(TotalF32(xs[i])))
    {
        if kept.iter().all(|&k| k.abs_diff(i) >= distance) {
            kept.push(i);
        }
    }
    kept.sort_unstable();
    kept
}

#[cfg(test)]
mod tests {
    use std::f32::consts::TAU;

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn peaks() {
        assert_eq!(find_peaks(&[0.0, 1.0, 0.0, 2.0, 0.0], 1), [1, 3]);
        assert_eq!(find_peaks(&[0.0, 1.0, 0.0, 2.0, 0.0], 3), [3]);
        assert_eq!(find_peaks(&[0.0, 2.0, 2.0, 0.0], 1), [1]);
        assert_eq!(find_peaks(&[0.0, 2.0, 2.0, 2.0, 0.0], 1), [2]);
        assert_eq!(find_peaks(&[0.0, 1.0, 1.0, 2.0, 0.0], 1), [3], "rising step");
        assert_eq!(find_peaks(&[0.0, 1.0, 1.0], 1), Vec::<usize>::new());
        assert_eq!(find_peaks(&[3.0, 1.0, 2.0], 1), Vec::<usize>::new());
        assert_eq!(
            find_peaks(&[0.0, f32::NAN, 0.0, 1.0, 0.0], 1),
            [3],
            "NaN is not a peak"
        );
    }

    #[test]
    fn sine_period() {
        let period = 20.0;
        let mut calc = PeakBasedHrCalculator::new(200, 5, 1);
        let mut hr = f32::NAN;
        for i in 0..300 {
            hr = calc.update((TAU * i as f32 / period).sin());
        }
        assert_relative_eq!(hr, period);
        assert_relative_eq!(frames_per_beat_to_bpm(hr, 30.0), 90.0);
    }

    #[test]
    fn waits_for_half_window() {
        let mut calc = PeakBasedHrCalculator::new(100, 2, 1);
        for i in 0..49 {
            assert!(calc.update((i % 10) as f32).is_nan());
        }
        assert!(!calc.update(0.0).is_nan());
    }

    #[test]
    fn update_interval_holds_estimate() {
        let mut calc = PeakBasedHrCalculator::new(40, 2, 10);
        let signal = |i: usize| if i % 8 == 4 { 1.0 } else { 0.0 };
        let mut estimates = Vec::new();
        for i in 0..40 {
            estimates.push(calc.update(signal(i)));
        }
        assert!(estimates[..19].iter().all(|v| v.is_nan()));
        assert_eq!(estimates[19], 8.0);
        assert_eq!(estimates[25], 8.0);

        calc.reset();
        assert!(calc.hr().is_nan());
        assert!(calc.update(1.0).is_nan());
    }

    #[test]
    fn fps_defaults() {
        let calc = PeakBasedHrCalculator::for_fps(30.0);
        assert_eq!(calc.window_size, 300);
        assert_eq!(calc.distance, 9);
        assert_eq!(calc.update_interval, 30);
    }

    #[test]
    fn noise_only() {
        let mut calc = PeakBasedHrCalculator::new(10, 1, 1);
        for _ in 0..10 {
            calc.update(f32::NAN);
        }
        assert!(calc.hr().is_nan());
    }
}
