//! Utilities for numerics.
//!
//! The statistics helpers in here ignore NaN values, which are used throughout the crate to mark
//! frames without a usable measurement.

use std::cmp::Ordering;

/// An `f32` that implements [`Ord`] according to the IEEE 754 totalOrder predicate.
#[derive(Debug, Clone, Copy)]
pub struct TotalF32(pub f32);

impl PartialEq for TotalF32 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TotalF32 {}

impl PartialOrd for TotalF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Computes the mean of all non-NaN values in `xs`.
///
/// Returns NaN if `xs` contains no non-NaN values.
pub fn nanmean(xs: &[f32]) -> f32 {
    let (sum, count) = xs
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0f64, 0usize), |(sum, count), &v| {
            (sum + f64::from(v), count + 1)
        });
    if count == 0 {
        f32::NAN
    } else {
        (sum / count as f64) as f32
    }
}

/// Computes the (population) standard deviation of all non-NaN values in `xs`.
///
/// Returns NaN if `xs` contains no non-NaN values.
pub fn nanstd(xs: &[f32]) -> f32 {
    let mean = nanmean(xs);
    if mean.is_nan() {
        return f32::NAN;
    }
    let var = nanmean(
        &xs.iter()
            .filter(|v| !v.is_nan())
            .map(|&v| (v - mean) * (v - mean))
            .collect::<Vec<_>>(),
    );
    var.sqrt()
}

/// Computes the median of all non-NaN values in `xs`.
///
/// Returns NaN if `xs` contains no non-NaN values.
pub fn nanmedian(xs: &[f32]) -> f32 {
    let mut sorted = xs
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .map(TotalF32)
        .collect::<Vec<_>>();
    if sorted.is_empty() {
        return f32::NAN;
    }
    sorted.sort();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1].0 + sorted[mid].0) / 2.0
    } else {
        sorted[mid].0
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn mean_ignores_nan() {
        assert!(nanmean(&[]).is_nan());
        assert!(nanmean(&[f32::NAN, f32::NAN]).is_nan());
        assert_eq!(nanmean(&[1.0, f32::NAN, 3.0]), 2.0);
    }

    #[test]
    fn std() {
        assert_relative_eq!(nanstd(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0);
        assert_eq!(nanstd(&[3.0, f32::NAN]), 0.0);
        assert!(nanstd(&[f32::NAN]).is_nan());
    }

    #[test]
    fn median() {
        assert_eq!(nanmedian(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(nanmedian(&[4.0, 1.0, f32::NAN, 2.0, 3.0]), 2.5);
        assert!(nanmedian(&[]).is_nan());
    }

    #[test]
    fn total_order() {
        let mut v = [TotalF32(1.0), TotalF32(-1.0), TotalF32(0.5)];
        v.sort();
        assert_eq!(v.map(|t| t.0), [-1.0, 0.5, 1.0]);
    }
}
