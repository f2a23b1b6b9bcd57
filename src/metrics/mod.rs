//! Thread-safe aggregation of operation results.
//!
//! [`MetricsAggregator`] owns every counter of a run: totals, latency
//! extremes, a bounded latency sample buffer used for percentiles, a sliding
//! window for the current request rate, per-key protocol sub-stats and the
//! error distribution. All of it lives behind one read/write lock; writers go
//! through [`record`](MetricsAggregator::record) and readers get a deep copy
//! through [`snapshot`](MetricsAggregator::snapshot).
//!
//! # Key Types
//!
//! - [`MetricsAggregator`] - The shared aggregator.
//! - [`MetricsSnapshot`] - An immutable copy for reporters.
//! - [`SlidingWindow`] - Per-second operation counts.
//! - [`SampleBuffer`] - FIFO bounded sample retention, see [`percentile`].

mod counter;
mod protocol;
mod samples;
mod snapshot;
mod window;

pub use protocol::{KeyStats, NumericSummary, ProtocolStats};
pub use samples::{PERCENTAGES, SampleBuffer, percentile};
pub use snapshot::{LatencySummary, MetricsSnapshot};
pub use window::SlidingWindow;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::{Duration, Instant};

use crate::operation::OperationResult;
use counter::Counter;

/// Default number of latency samples retained for percentiles.
pub const DEFAULT_SAMPLE_CAP: usize = 10_000;

/// Default number of samples retained per protocol metadata key.
pub const DEFAULT_KEY_SAMPLE_CAP: usize = 1_000;

/// Default number of distinct error messages tracked before folding new ones together.
pub const DEFAULT_ERROR_CAP: usize = 100;

/// Bucket counting failures whose message arrived after the error cap was reached.
pub const OTHER_ERRORS: &str = "other errors";

/// Sizing of the aggregator's bounded buffers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricsOpts {
    /// Latency samples retained for percentiles.
    pub sample_cap: usize,
    /// Samples retained per numeric protocol key.
    pub key_sample_cap: usize,
    /// Number of buckets in the rate window.
    pub window_buckets: usize,
    /// Width of each rate window bucket.
    pub bucket_size: Duration,
    /// Distinct error messages counted individually; later ones go to [`OTHER_ERRORS`].
    pub error_cap: usize,
}

impl Default for MetricsOpts {
    fn default() -> Self {
        Self {
            sample_cap: DEFAULT_SAMPLE_CAP,
            key_sample_cap: DEFAULT_KEY_SAMPLE_CAP,
            window_buckets: 60,
            bucket_size: Duration::from_secs(1),
            error_cap: DEFAULT_ERROR_CAP,
        }
    }
}

struct MetricsState {
    counter: Counter,
    samples: SampleBuffer<Duration>,
    window: SlidingWindow,
    protocol: ProtocolStats,
    errors: HashMap<String, u64>,
    start_time: DateTime<Utc>,
    started: Instant,
    finished: Option<Duration>,
}

impl MetricsState {
    fn new(opts: &MetricsOpts) -> Self {
        let started = Instant::now();
        Self {
            counter: Counter::default(),
            samples: SampleBuffer::new(opts.sample_cap),
            window: SlidingWindow::new(opts.window_buckets, opts.bucket_size, started),
            protocol: ProtocolStats::new(opts.key_sample_cap),
            errors: HashMap::new(),
            start_time: Utc::now(),
            started,
            finished: None,
        }
    }
}

/// Shared aggregator of operation results.
pub struct MetricsAggregator {
    opts: MetricsOpts,
    state: RwLock<MetricsState>,
}

impl MetricsAggregator {
    /// Creates an aggregator whose start time is now.
    pub fn new(opts: MetricsOpts) -> Self {
        let state = RwLock::new(MetricsState::new(&opts));
        Self { opts, state }
    }

    /// Folds one result into the aggregated metrics.
    pub fn record(&self, result: &OperationResult) {
        let now = Instant::now();
        let mut state = self.state.write();

        state.counter += result;
        state.samples.push(result.duration);
        state.window.record(now);
        if !result.metadata.is_empty() {
            state.protocol.record(&result.metadata);
        }
        if !result.success {
            let mut msg = result.error.as_deref().unwrap_or("unknown error");
            if state.errors.len() >= self.opts.error_cap && !state.errors.contains_key(msg) {
                msg = OTHER_ERRORS;
            }
            *state.errors.entry(msg.to_string()).or_default() += 1;
        }
    }

    /// Marks the end of recording. Later snapshots report this as the end time.
    pub fn finish(&self) {
        let mut state = self.state.write();
        if state.finished.is_none() {
            let elapsed = state.started.elapsed();
            state.finished = Some(elapsed);
        }
    }

    /// Clears everything and restarts the start time.
    ///
    /// Not serialized against concurrent [`record`](Self::record) calls: the
    /// caller must make sure none are in flight.
    pub fn reset(&self) {
        *self.state.write() = MetricsState::new(&self.opts);
    }

    /// Number of results recorded so far.
    pub fn total(&self) -> u64 {
        self.state.read().counter.total
    }

    /// An immutable deep copy of the current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.read();
        let counter = &state.counter;

        let sorted = state.samples.sorted();
        let [p50, p90, p95, p99] = PERCENTAGES.map(|p| percentile(&sorted, p).unwrap_or_default());
        let latency = LatencySummary {
            avg: counter.mean(),
            min: counter.min.unwrap_or_default(),
            max: counter.max,
            p50,
            p90,
            p95,
            p99,
        };

        let duration = state.finished.unwrap_or_else(|| state.started.elapsed());
        let end_time = state.start_time
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        let throughput = match duration.as_secs_f64() {
            secs if secs > 0.0 => counter.total as f64 / secs,
            _ => 0.0,
        };

        MetricsSnapshot {
            total: counter.total,
            success: counter.success,
            failed: counter.failed,
            reads: counter.reads,
            writes: counter.writes,
            latency,
            error_rate: counter.error_rate(),
            rps: state.window.rate(),
            throughput,
            start_time: state.start_time,
            end_time,
            duration,
            errors: state.errors.iter().map(|(k, &v)| (k.clone(), v)).collect(),
            protocol: state.protocol.snapshot(),
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(MetricsOpts::default())
    }
}
