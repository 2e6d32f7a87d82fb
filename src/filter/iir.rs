//! Infinite impulse response (IIR) filters.

use std::f64::consts::PI;

use anyhow::{bail, ensure};

use super::Filter;

/// A linear digital filter defined by its transfer function coefficients.
///
/// `b` holds the numerator (feedforward) and `a` the denominator (feedback) coefficients, in order
/// of increasing delay. The filter is evaluated in transposed direct form II, sample by sample.
///
/// NaN inputs are passed through as NaN without touching the filter state, so gaps in a signal
/// do not poison all later output.
#[derive(Debug, Clone)]
pub struct DigitalFilter {
    b: Vec<f64>,
    a: Vec<f64>,
}

impl DigitalFilter {
    /// Creates a filter from transfer function coefficients.
    ///
    /// The coefficients are normalized so that `a[0] == 1`. Returns an error if either coefficient
    /// list is empty or `a[0]` is zero.
    pub fn new(b: &[f64], a: &[f64]) -> anyhow::Result<Self> {
        ensure!(!b.is_empty(), "filter numerator must not be empty");
        ensure!(!a.is_empty(), "filter denominator must not be empty");
        let a0 = a[0];
        if a0 == 0.0 || !a0.is_finite() {
            bail!("first denominator coefficient must be finite and non-zero, got {a0}");
        }

        let order = b.len().max(a.len());
        let norm = |coeffs: &[f64]| {
            let mut out = coeffs.iter().map(|c| c / a0).collect::<Vec<_>>();
            out.resize(order, 0.0);
            out
        };

        Ok(Self {
            b: norm(b),
            a: norm(a),
        })
    }

    /// Designs a second-order band-pass filter passing frequencies between `low_hz` and `high_hz`.
    ///
    /// `fs` is the sampling rate of the signal, which for video is the frame rate. The filter has
    /// unit gain at the geometric center of the pass band.
    pub fn bandpass(low_hz: f64, high_hz: f64, fs: f64) -> anyhow::Result<Self> {
        ensure!(fs > 0.0, "sampling rate must be positive, got {fs}");
        ensure!(
            0.0 < low_hz && low_hz < high_hz && high_hz < fs / 2.0,
            "invalid pass band {low_hz}..{high_hz} Hz for sampling rate {fs} Hz"
        );

        let f0 = (low_hz * high_hz).sqrt();
        let q = f0 / (high_hz - low_hz);
        let w0 = 2.0 * PI * f0 / fs;
        let alpha = w0.sin() / (2.0 * q);

        Self::new(
            &[alpha, 0.0, -alpha],
            &[1.0 + alpha, -2.0 * w0.cos(), 1.0 - alpha],
        )
    }

    /// Returns the normalized numerator coefficients.
    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Returns the normalized denominator coefficients (`a[0]` is always 1).
    pub fn a(&self) -> &[f64] {
        &self.a
    }
}

/// Delay line of a [`DigitalFilter`].
#[derive(Debug, Default, Clone)]
pub struct DigitalFilterState {
    z: Vec<f64>,
}

impl Filter<f32> for DigitalFilter {
    type State = DigitalFilterState;

    fn filter(&self, state: &mut Self::State, value: f32) -> f32 {
        if value.is_nan() {
            return f32::NAN;
        }

        let n = self.b.len();
        if state.z.len() != n {
            state.z = vec![0.0; n];
        }

        let x = f64::from(value);
        let y = self.b[0] * x + state.z[0];
        for i in 1..n {
            let next = if i + 1 < n { state.z[i] } else { 0.0 };
            state.z[i - 1] = self.b[i] * x - self.a[i] * y + next;
        }

        y as f32
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::filter::SimpleFilter;

    use super::*;

    #[test]
    fn normalizes_coefficients() {
        let filter = DigitalFilter::new(&[2.0], &[2.0, 1.0]).unwrap();
        assert_eq!(filter.b(), &[1.0, 0.0]);
        assert_eq!(filter.a(), &[1.0, 0.5]);

        assert!(DigitalFilter::new(&[], &[1.0]).is_err());
        assert!(DigitalFilter::new(&[1.0], &[0.0, 1.0]).is_err());
    }

    #[test]
    fn fir_and_iir_response() {
        // y[n] = 0.5 x[n] + 0.5 x[n-1]
        let mut fir = SimpleFilter::new(DigitalFilter::new(&[0.5, 0.5], &[1.0]).unwrap());
        assert_eq!(fir.filter(2.0), 1.0);
        assert_eq!(fir.filter(4.0), 3.0);
        assert_eq!(fir.filter(0.0), 2.0);

        // y[n] = x[n] + 0.5 y[n-1]
        let mut iir = SimpleFilter::new(DigitalFilter::new(&[1.0], &[1.0, -0.5]).unwrap());
        assert_eq!(iir.filter(1.0), 1.0);
        assert_eq!(iir.filter(0.0), 0.5);
        assert_eq!(iir.filter(0.0), 0.25);
    }

    #[test]
    fn nan_does_not_poison_state() {
        let mut iir = SimpleFilter::new(DigitalFilter::new(&[1.0], &[1.0, -0.5]).unwrap());
        assert_eq!(iir.filter(1.0), 1.0);
        assert!(iir.filter(f32::NAN).is_nan());
        assert_eq!(iir.filter(0.0), 0.5);
    }

    #[test]
    fn bandpass_rejects_dc_and_passes_center() {
        let (low, high, fs) = (0.7, 3.5, 30.0);
        assert!(DigitalFilter::bandpass(high, low, fs).is_err());
        assert!(DigitalFilter::bandpass(low, 20.0, fs).is_err());

        let bp = DigitalFilter::bandpass(low, high, fs).unwrap();

        let mut dc = SimpleFilter::new(bp.clone());
        let mut last = 0.0;
        for _ in 0..600 {
            last = dc.filter(1.0);
        }
        assert!(last.abs() < 1e-3, "{last}");

        let f0 = (low * high).sqrt();
        let mut tone = SimpleFilter::new(bp);
        let out = (0..900)
            .map(|n| tone.filter((2.0 * PI * f0 * n as f64 / fs).sin() as f32))
            .collect::<Vec<_>>();
        let peak = out[600..].iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert_relative_eq!(peak, 1.0, epsilon = 0.05);
    }
}
