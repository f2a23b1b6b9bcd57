//! A run clock and the ticker used to pace ramp-up.
//!
//! [`Clock`] measures the elapsed time of a run. It starts stopped, is started
//! when the first job is generated and stopped once the last result has been
//! collected, so `elapsed()` afterwards is the run duration.
//!
//! ```ignore
//! let clock = Clock::new_stopped();
//! clock.start();
//! let mut ticker = clock.ticker(Duration::from_millis(10));
//! ticker.tick().await; // 10ms after start
//! ticker.tick().await; // 20ms after start
//! clock.stop();
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{self, Duration, Instant};

/// A shareable clock that measures elapsed time between `start` and `stop`.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    inner: Arc<Mutex<State>>,
}

#[derive(Debug, Clone, Copy, Default)]
enum State {
    #[default]
    Stopped,
    Running(Instant),
    Finished(Duration),
}

impl Clock {
    /// Creates a clock that has not started yet.
    pub fn new_stopped() -> Self {
        Self::default()
    }

    /// Starts the clock. Has no effect once started or finished.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        if let State::Stopped = *inner {
            *inner = State::Running(Instant::now());
        }
    }

    /// Stops the clock and freezes the elapsed time.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if let State::Running(start) = *inner {
            *inner = State::Finished(start.elapsed());
        }
    }

    /// Elapsed time since `start`, or the frozen duration after `stop`.
    pub fn elapsed(&self) -> Duration {
        match *self.inner.lock() {
            State::Stopped => Duration::ZERO,
            State::Running(start) => start.elapsed(),
            State::Finished(elapsed) => elapsed,
        }
    }

    /// Sleeps until the clock reads at least `deadline`.
    ///
    /// Returns immediately if the deadline has passed.
    pub async fn sleep_until(&self, deadline: Duration) {
        loop {
            let now = self.elapsed();
            if deadline <= now {
                return;
            }
            time::sleep(deadline - now).await;
        }
    }

    /// Creates a [`Ticker`] firing every `interval` of clock time.
    pub fn ticker(&self, interval: Duration) -> Ticker {
        Ticker::new(self.clone(), interval)
    }
}

/// Fires at fixed offsets from the clock's start.
///
/// Ticks are scheduled at `interval`, `2 * interval`, ... so a late tick does
/// not push back the following ones.
#[derive(Debug, Clone)]
pub struct Ticker {
    clock: Clock,
    interval: Duration,
    next_tick: Duration,
}

impl Ticker {
    /// Creates a ticker whose first tick fires after `interval`.
    pub fn new(clock: Clock, interval: Duration) -> Self {
        Self { clock, interval, next_tick: interval }
    }

    /// Waits for the next tick.
    pub async fn tick(&mut self) {
        self.clock.sleep_until(self.next_tick).await;
        self.next_tick += self.interval;
    }
}
