//! Signal filtering and smoothing.
//!
//! Filters are split into an immutable configuration object implementing [`Filter`] and a mutable
//! [`Filter::State`]. This allows sharing one filter configuration between many signals. Use
//! [`SimpleFilter`] to bundle both when only a single signal needs filtering.

pub mod ema;
pub mod iir;
pub mod moving;

pub use ema::Ema;
pub use iir::DigitalFilter;
pub use moving::MovingAvg;

/// A filter for values of type `V`.
pub trait Filter<V> {
    /// The per-signal state of the filter.
    ///
    /// The [`Default`] value is the state right after construction, without any history.
    type State: Default;

    /// Pushes a new value through the filter, returning the filtered value.
    fn filter(&self, state: &mut Self::State, value: V) -> V;
}

impl<V, F: Filter<V> + ?Sized> Filter<V> for &F {
    type State = F::State;

    fn filter(&self, state: &mut Self::State, value: V) -> V {
        (**self).filter(state, value)
    }
}

/// A [`Filter`] on `f32` values bundled with its state.
pub struct SimpleFilter<F: Filter<f32>> {
    filter: F,
    state: F::State,
}

impl<F: Filter<f32>> SimpleFilter<F> {
    pub fn new(filter: F) -> Self {
        Self {
            filter,
            state: F::State::default(),
        }
    }

    /// Adds a new value to the filter, returning the filtered value.
    pub fn filter(&mut self, value: f32) -> f32 {
        self.filter.filter(&mut self.state, value)
    }

    /// Resets the accumulated history of the filter to the state just after construction.
    pub fn reset(&mut self) {
        self.state = F::State::default();
    }

    /// Returns a reference to the wrapped filter configuration.
    pub fn inner(&self) -> &F {
        &self.filter
    }
}

impl<F: Filter<f32> + Clone> Clone for SimpleFilter<F>
where
    F::State: Clone,
{
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            state: self.state.clone(),
        }
    }
}
