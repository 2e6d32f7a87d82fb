//! Simple moving average.

use std::collections::VecDeque;

use super::Filter;
use crate::num::nanmean;

/// Moving Average over a fixed history of values (FIR filter).
///
/// All values are weighted equally. NaN values occupy a slot in the history but do not contribute
/// to the average, so the output is NaN only while the whole window is NaN.
#[derive(Debug, Clone, Copy)]
pub struct MovingAvg {
    /// Max. number of values to keep in the history.
    history_size: usize,
}

impl MovingAvg {
    /// Creates a new moving average calculator that averages the last `history_size` values.
    ///
    /// # Panics
    ///
    /// This method will panic if `history_size` is 0.
    pub fn new(history_size: usize) -> Self {
        assert!(history_size > 0, "moving average window must not be empty");
        Self { history_size }
    }

    #[inline]
    pub fn history_size(&self) -> usize {
        self.history_size
    }
}

/// Filter state for [`MovingAvg`].
#[derive(Debug, Default, Clone)]
pub struct MovingAvgState {
    history: VecDeque<f32>,
}

impl Filter<f32> for MovingAvg {
    type State = MovingAvgState;

    fn filter(&self, state: &mut Self::State, value: f32) -> f32 {
        state.history.push_back(value);
        if state.history.len() > self.history_size {
            state.history.pop_front();
        }

        nanmean(state.history.make_contiguous())
    }
}

#[cfg(test)]
mod tests {
    use crate::filter::SimpleFilter;

    use super::*;

    #[test]
    fn test_moving_avg() {
        let mut moving_avg = SimpleFilter::new(MovingAvg::new(2));
        assert_eq!(moving_avg.filter(1.0), 1.0);
        assert_eq!(moving_avg.filter(1.0), 1.0);
        assert_eq!(moving_avg.filter(0.0), 0.5);
        assert_eq!(moving_avg.filter(0.0), 0.0);
    }

    #[test]
    fn skips_nan() {
        let mut moving_avg = SimpleFilter::new(MovingAvg::new(3));
        assert!(moving_avg.filter(f32::NAN).is_nan());
        assert_eq!(moving_avg.filter(2.0), 2.0);
        assert_eq!(moving_avg.filter(4.0), 3.0);
        assert_eq!(moving_avg.filter(f32::NAN), 3.0);
        assert_eq!(moving_avg.filter(f32::NAN), 4.0);
        assert!(moving_avg.filter(f32::NAN).is_nan());
    }
}
