//! Bounded sample retention and the percentile estimator.
use std::{cmp::Ordering, collections::VecDeque};

/// Percentiles reported for latency and numeric protocol stats.
pub const PERCENTAGES: [f64; 4] = [50.0, 90.0, 95.0, 99.0];

/// A FIFO buffer that keeps only the most recent `cap` samples.
#[derive(Clone, Debug)]
pub struct SampleBuffer<T> {
    cap: usize,
    buf: VecDeque<T>,
}

impl<T: Copy + PartialOrd> SampleBuffer<T> {
    /// Creates an empty buffer holding at most `cap` samples.
    pub fn new(cap: usize) -> Self {
        Self { cap, buf: VecDeque::with_capacity(cap.min(1024)) }
    }

    /// Appends a sample, evicting the oldest one when full.
    pub fn push(&mut self, sample: T) {
        if self.cap == 0 {
            return;
        }
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drops every retained sample.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    /// A sorted copy of the retained samples.
    pub fn sorted(&self) -> Vec<T> {
        let mut v: Vec<T> = self.buf.iter().copied().collect();
        v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        v
    }
}

/// Nearest-rank percentile without interpolation:
/// `sorted[clamp(floor(N * p / 100), 0, N - 1)]`.
///
/// `sorted` must be in ascending order. Returns `None` when it is empty.
pub fn percentile<T: Copy>(sorted: &[T], p: f64) -> Option<T> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    // a negative or NaN index saturates to 0 in the cast
    let idx = (n as f64 * p / 100.0).floor() as usize;
    sorted.get(idx.min(n - 1)).copied()
}
