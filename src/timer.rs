//! Performance measurement tools.

use std::{
    fmt, mem,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::filter::{
    ema::{Ema, EmaState},
    Filter,
};

const EMA_ALPHA: f32 = 0.3;

/// A timer that can measure and average the time an operation takes.
///
/// Collected timings are averaged and reset when the timer is displayed using `{}`
/// ([`std::fmt::Display`]).
pub struct Timer {
    name: &'static str,
    ema: Ema,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    ema_state: EmaState,
    /// The current average time in seconds.
    avg: f32,
    /// The number of time measurements that contributed to the current `avg`.
    count: usize,
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ema: Ema::new(EMA_ALPHA),
            state: Mutex::default(),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is measured and recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    /// Returns the averaged duration recorded since the timer was last displayed.
    pub fn average(&self) -> Duration {
        Duration::from_secs_f32(self.lock().avg)
    }

    /// Returns the number of measurements recorded since the timer was last displayed.
    pub fn count(&self) -> usize {
        self.lock().count
    }

    fn stop(&self, start: Instant) {
        let duration = start.elapsed();
        let mut state = self.lock();
        let state = &mut *state;
        state.avg = self
            .ema
            .filter(&mut state.ema_state, duration.as_secs_f32());
        state.count += 1;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock can only leave a stale average behind.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut state = self.lock();
        let State { avg, count, .. } = mem::take(&mut *state);
        let avg_ms = avg * 1000.0;

        write!(f, "{}: {count}x{avg_ms:.01}ms", self.name)
    }
}

/// Cloning a timer resets its collected timings.
impl Clone for Timer {
    fn clone(&self) -> Self {
        Self::new(self.name)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.stop(self.start);
    }
}

/// Counts processed frames and logs the frame rate once per second.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
    fps: Option<f32>,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
            fps: None,
        }
    }

    /// Returns the frame rate measured over the last full second, if one has passed.
    #[inline]
    pub fn fps(&self) -> Option<f32> {
        self.fps
    }

    /// Advances the frame counter by 1 and logs FPS if one second has passed.
    pub fn tick(&mut self) {
        self.tick_with(std::iter::empty::<&Timer>());
    }

    /// Advances the frame counter by 1 and logs FPS and the given timers if one second has
    /// passed.
    ///
    /// Displaying the timers resets them.
    pub fn tick_with<'a, I: IntoIterator<Item = &'a Timer>>(&mut self, timers: I) {
        self.frames += 1;
        let elapsed = self.start.elapsed();
        if elapsed > Duration::from_secs(1) {
            let fps = self.frames as f32 / elapsed.as_secs_f32();
            let timers = timers
                .into_iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>();
            if timers.is_empty() {
                log::debug!("{}: {:.1} FPS", self.name, fps);
            } else {
                log::debug!("{}: {:.1} FPS ({})", self.name, fps, timers.join(", "));
            }

            self.fps = Some(fps);
            self.frames = 0;
            self.start = Instant::now();
        }
    }
}
