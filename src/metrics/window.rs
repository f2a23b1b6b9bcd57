//! Sliding window of per-interval operation counts.
//!
//! The window holds a fixed number of buckets, newest first. Each record
//! shifts the window forward by every whole bucket interval that elapsed
//! since the last shift (dropping the oldest buckets) and then increments the
//! newest bucket. The rate is always taken over the full window span:
//! `sum(buckets) / (bucket_count * bucket_size)`.

use std::collections::VecDeque;

use tokio::time::{Duration, Instant};

/// A fixed-size ring of operation counts.
#[derive(Clone, Debug)]
pub struct SlidingWindow {
    buckets: VecDeque<u64>,
    bucket_size: Duration,
    last_shift: Instant,
}

impl SlidingWindow {
    /// Creates a window of `buckets` buckets, each `bucket_size` long, anchored at `now`.
    ///
    /// A zero bucket count or size is raised to one bucket of one millisecond.
    pub fn new(buckets: usize, bucket_size: Duration, now: Instant) -> Self {
        let buckets = buckets.max(1);
        Self {
            buckets: VecDeque::from(vec![0; buckets]),
            bucket_size: bucket_size.max(Duration::from_millis(1)),
            last_shift: now,
        }
    }

    /// Counts one operation completed at `now`.
    pub fn record(&mut self, now: Instant) {
        self.advance(now);
        if let Some(newest) = self.buckets.front_mut() {
            *newest += 1;
        }
    }

    /// Shifts the window forward by every whole interval elapsed up to `now`.
    pub fn advance(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_shift);
        let shifts = elapsed.as_nanos() / self.bucket_size.as_nanos();
        if shifts == 0 {
            return;
        }

        let rotations = shifts.min(self.buckets.len() as u128) as usize;
        for _ in 0..rotations {
            self.buckets.pop_back();
            self.buckets.push_front(0);
        }

        let step = self.bucket_size.as_nanos() * shifts;
        self.last_shift += Duration::from_nanos(u64::try_from(step).unwrap_or(u64::MAX));
    }

    /// Operations per second over the full window span.
    pub fn rate(&self) -> f64 {
        let span = self.buckets.len() as f64 * self.bucket_size.as_secs_f64();
        self.sum() as f64 / span
    }

    /// Total operations currently held in the window.
    pub fn sum(&self) -> u64 {
        self.buckets.iter().sum()
    }

    /// Bucket counts, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &u64> {
        self.buckets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn counts_in_newest_bucket_until_a_second_elapses() {
        let t0 = Instant::now();
        let mut win = SlidingWindow::new(4, secs(1.0), t0);
        win.record(t0);
        win.record(t0 + secs(0.5));
        win.record(t0 + secs(0.999));
        assert_eq!(win.iter().copied().collect::<Vec<_>>(), vec![3, 0, 0, 0]);

        win.record(t0 + secs(1.2));
        assert_eq!(win.iter().copied().collect::<Vec<_>>(), vec![1, 3, 0, 0]);
    }

    #[test]
    fn shifts_once_per_whole_elapsed_interval() {
        let t0 = Instant::now();
        let mut win = SlidingWindow::new(4, secs(1.0), t0);
        win.record(t0);
        win.record(t0 + secs(2.5));
        assert_eq!(win.iter().copied().collect::<Vec<_>>(), vec![1, 0, 1, 0]);

        // the anchor moved by whole seconds only, so 3.1s is the next bucket
        win.record(t0 + secs(3.1));
        assert_eq!(win.iter().copied().collect::<Vec<_>>(), vec![1, 1, 0, 1]);
    }

    #[test]
    fn long_gap_drops_every_bucket() {
        let t0 = Instant::now();
        let mut win = SlidingWindow::new(3, secs(1.0), t0);
        for _ in 0..5 {
            win.record(t0);
        }
        win.record(t0 + secs(100.0));
        assert_eq!(win.sum(), 1);
    }

    #[test]
    fn rate_divides_by_full_window_span() {
        let t0 = Instant::now();
        let mut win = SlidingWindow::new(60, secs(1.0), t0);
        for _ in 0..120 {
            win.record(t0);
        }
        assert!((win.rate() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_sizes_are_raised() {
        let t0 = Instant::now();
        let mut win = SlidingWindow::new(0, Duration::ZERO, t0);
        win.record(t0);
        assert_eq!(win.iter().count(), 1);
        assert!((win.rate() - 1000.0).abs() < 1e-6);
    }
}
