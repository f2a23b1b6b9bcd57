//! Run configuration consumed by the engine.
//!
//! The engine only reads configuration through [`BenchmarkConfig`]; how the
//! values were assembled (CLI, files, environment) is up to the caller.
//! [`BenchOpts`] is the plain implementation used by [`cli`](crate::cli) and tests.
use std::time::Duration;

use crate::{
    error::{EngineError, Result},
    metrics::MetricsOpts,
    resilience::{BreakerConfig, RetryConfig},
};

/// Default upper bound on the number of concurrent workers.
pub const DEFAULT_WORKER_CEILING: u32 = 1000;

/// Read-only view of the per-run benchmark parameters.
pub trait BenchmarkConfig: Send + Sync {
    /// Number of jobs to generate. `0` generates nothing.
    fn total(&self) -> u64;

    /// Requested number of concurrent workers.
    fn parallels(&self) -> u32;

    /// Bound on job generation, if any.
    fn duration(&self) -> Option<Duration>;

    /// Advisory per-operation timeout forwarded to the adapter.
    fn timeout(&self) -> Option<Duration>;

    /// Period over which the `total` jobs are spread out. `None` or zero issues jobs as fast as possible.
    fn ramp_up(&self) -> Option<Duration>;
}

/// Core options for a benchmark run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenchOpts {
    /// Number of jobs to generate.
    pub total: u64,
    /// Number of concurrent workers.
    pub parallels: u32,
    /// Stop generating jobs after this duration.
    pub duration: Option<Duration>,
    /// Advisory per-operation timeout.
    pub timeout: Option<Duration>,
    /// Spread job generation evenly over this period.
    pub ramp_up: Option<Duration>,
}

impl Default for BenchOpts {
    fn default() -> Self {
        Self { total: 1, parallels: 1, duration: None, timeout: None, ramp_up: None }
    }
}

impl BenchOpts {
    /// Copies the values out of any [`BenchmarkConfig`].
    pub fn from_config(config: &dyn BenchmarkConfig) -> Self {
        Self {
            total: config.total(),
            parallels: config.parallels(),
            duration: config.duration(),
            timeout: config.timeout(),
            ramp_up: config.ramp_up(),
        }
    }
}

impl BenchmarkConfig for BenchOpts {
    fn total(&self) -> u64 {
        self.total
    }

    fn parallels(&self) -> u32 {
        self.parallels
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn ramp_up(&self) -> Option<Duration> {
        self.ramp_up
    }
}

/// Engine-level tuning that outlives a single run.
#[derive(Clone, Debug)]
pub struct EngineOpts {
    /// Upper bound on the number of workers regardless of the requested parallelism.
    pub worker_ceiling: u32,
    /// Capacity of the job queue. Defaults to twice the worker count.
    pub job_queue_capacity: Option<usize>,
    /// Capacity of the result queue.
    pub result_queue_capacity: usize,
    /// Lower bound on the ramp-up tick interval.
    pub min_ramp_interval: Duration,
    /// Run the adapter health check before generating jobs.
    pub health_check: bool,
    /// Metrics aggregation options.
    pub metrics: MetricsOpts,
    /// Retry policy.
    pub retry: RetryConfig,
    /// Circuit breaker thresholds.
    pub breaker: BreakerConfig,
}

impl Default for EngineOpts {
    fn default() -> Self {
        Self {
            worker_ceiling: DEFAULT_WORKER_CEILING,
            job_queue_capacity: None,
            result_queue_capacity: 1024,
            min_ramp_interval: Duration::from_millis(1),
            health_check: true,
            metrics: MetricsOpts::default(),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl EngineOpts {
    /// Number of workers to spawn for the requested parallelism.
    ///
    /// Zero clamps to one, anything above the ceiling clamps to the ceiling.
    pub fn effective_workers(&self, parallels: u32) -> u32 {
        parallels.clamp(1, self.worker_ceiling.max(1))
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let retry = &self.retry;
        if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
            return Err(invalid(format!("backoff factor must be at least 1, got {}", retry.backoff_factor)));
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            return Err(invalid(format!("jitter must be within 0..=1, got {}", retry.jitter)));
        }
        if retry.initial_delay > retry.max_delay {
            return Err(invalid("initial retry delay exceeds the maximum delay".into()));
        }
        if self.breaker.failure_threshold == 0 || self.breaker.success_threshold == 0 {
            return Err(invalid("circuit breaker thresholds must be positive".into()));
        }
        if self.metrics.bucket_size.is_zero() || self.metrics.window_buckets == 0 {
            return Err(invalid("rate window must have at least one non-empty bucket".into()));
        }
        Ok(())
    }

    pub(crate) fn job_queue_capacity(&self, workers: u32) -> usize {
        self.job_queue_capacity
            .unwrap_or(workers as usize * 2)
            .max(1)
    }
}

fn invalid(msg: String) -> EngineError {
    EngineError::InvalidConfig(msg)
}
