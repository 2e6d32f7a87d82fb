//! Chrominance-based signal extraction.
//!
//! See de Haan & Jeanne, "Robust Pulse Rate From Chrominance-Based rPPG" (IEEE TBME, 2013).
//!
//! The color channels are normalized by their moving average and projected onto two chrominance
//! axes, `X = 3R - 2G` and `Y = 1.5R + G - 1.5B`, which cancel out most specular reflection
//! changes. The signal is then either the ratio of both or `X - αY` with `α` chosen to cancel the
//! remaining motion component.

use std::{borrow::Cow, fmt, str::FromStr};

use anyhow::bail;

use super::{moving_average_update, spatial_pooling, Processor, RgbHistory};
use crate::{containers::RegionOfInterest, num::nanstd};

const DEFAULT_WINSIZE: usize = 45;

/// How the chrominance signals are combined into the output value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromMethod {
    /// `mean(X) / mean(Y) - 1` over the window.
    #[default]
    XOverY,
    /// `X - αY`, where `α` is the ratio of the standard deviations of `X` and `Y` over the
    /// window.
    Fixed,
}

impl FromStr for ChromMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xovery" => Ok(Self::XOverY),
            "fixed" => Ok(Self::Fixed),
            _ => bail!("unknown chrom method '{s}' (expected 'xovery' or 'fixed')"),
        }
    }
}

impl fmt::Display for ChromMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::XOverY => "xovery",
            Self::Fixed => "fixed",
        })
    }
}

/// Chrominance-based rPPG processor.
#[derive(Debug, Clone)]
pub struct ChromProcessor {
    winsize: usize,
    method: ChromMethod,
    rgb: RgbHistory,
    xs: Vec<f32>,
    ys: Vec<f32>,
}

impl Default for ChromProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_WINSIZE, ChromMethod::default())
    }
}

impl ChromProcessor {
    /// Creates a processor averaging over the last `winsize` frames.
    ///
    /// # Panics
    ///
    /// Panics if `winsize` is 0.
    pub fn new(winsize: usize, method: ChromMethod) -> Self {
        assert!(winsize > 0, "chrom window must not be empty");
        Self {
            winsize,
            method,
            rgb: RgbHistory::with_limit(winsize),
            xs: Vec::with_capacity(winsize + 1),
            ys: Vec::with_capacity(winsize + 1),
        }
    }

    #[inline]
    pub fn winsize(&self) -> usize {
        self.winsize
    }

    #[inline]
    pub fn method(&self) -> ChromMethod {
        self.method
    }

    fn push_xy(&mut self, x: f32, y: f32) {
        self.xs.push(x);
        self.ys.push(y);
        if self.xs.len() > self.winsize {
            self.xs.remove(0);
            self.ys.remove(0);
        }
    }
}

impl Processor for ChromProcessor {
    fn name(&self) -> Cow<'_, str> {
        Cow::Owned(format!("Chrom({})", self.method))
    }

    fn calculate(&mut self, roi: &RegionOfInterest) -> f32 {
        let color = spatial_pooling(roi, Some(&mut self.rgb));
        if color.is_null() {
            self.push_xy(f32::NAN, f32::NAN);
            return f32::NAN;
        }

        let rn = color.r / moving_average_update(&self.rgb.rs, self.winsize);
        let gn = color.g / moving_average_update(&self.rgb.gs, self.winsize);
        let bn = color.b / moving_average_update(&self.rgb.bs, self.winsize);

        let x = 3.0 * rn - 2.0 * gn;
        let y = 1.5 * rn + gn - 1.5 * bn;
        self.push_xy(x, y);

        match self.method {
            ChromMethod::XOverY => {
                moving_average_update(&self.xs, self.winsize)
                    / moving_average_update(&self.ys, self.winsize)
                    - 1.0
            }
            ChromMethod::Fixed => {
                let sy = nanstd(&self.ys);
                let alpha = if sy > 0.0 { nanstd(&self.xs) / sy } else { 0.0 };
                x - alpha * y
            }
        }
    }

    fn reset(&mut self) {
        self.rgb.clear();
        self.xs.clear();
        self.ys.clear();
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::processor::tests::{empty_roi, solid_roi};

    #[test]
    fn parse_method() {
        assert_eq!("fixed".parse::<ChromMethod>().unwrap(), ChromMethod::Fixed);
        assert_eq!("xovery".parse::<ChromMethod>().unwrap(), ChromMethod::XOverY);
        assert!("pos".parse::<ChromMethod>().is_err());
    }

    #[test]
    fn constant_skin_gives_constant_signal() {
        let mut xovery = ChromProcessor::new(10, ChromMethod::XOverY);
        let mut fixed = ChromProcessor::new(10, ChromMethod::Fixed);
        for _ in 0..20 {
            let roi = solid_roi(180, 120, 90);
            // normalized channels are all 1, so X = 1 and Y = 1
            assert_relative_eq!(xovery.calculate(&roi), 0.0, epsilon = 1e-5);
            assert_relative_eq!(fixed.calculate(&roi), 1.0, epsilon = 1e-5);
        }
        assert_eq!(fixed.name(), "Chrom(fixed)");
    }

    #[test]
    fn follows_green_pulse() {
        let mut chrom = ChromProcessor::new(30, ChromMethod::Fixed);
        let values = (0..90)
            .map(|i| {
                let g = if (i / 5) % 2 == 0 { 120 } else { 124 };
                chrom.calculate(&solid_roi(180, g, 90))
            })
            .collect::<Vec<_>>();

        // more green means a smaller X, so the signal dips while green is high
        let low_green = values[60..65].iter().sum::<f32>() / 5.0;
        let high_green = values[65..70].iter().sum::<f32>() / 5.0;
        assert!(high_green < low_green, "{high_green} {low_green}");
    }

    #[test]
    fn missing_frames() {
        let mut chrom = ChromProcessor::default();
        assert!(chrom.calculate(&empty_roi()).is_nan());
        assert!(!chrom.calculate(&solid_roi(180, 120, 90)).is_nan());
        assert!(chrom.calculate(&empty_roi()).is_nan());
        assert!(!chrom.calculate(&solid_roi(180, 120, 90)).is_nan());

        chrom.reset();
        assert!(chrom.xs.is_empty());
    }
}
