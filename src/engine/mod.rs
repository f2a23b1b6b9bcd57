//! The execution engine: job generation, the worker pool and result collection.
//!
//! A run wires three kinds of tasks together through bounded queues:
//!
//! ```text
//! generator --jobs--> worker * N --results--> collector --> MetricsAggregator
//! ```
//!
//! The generator closes the job queue when it is done, workers exit once the
//! queue is drained and drop their result senders, and the collector stops
//! when the last sender is gone. Cancelling the run token stops all of them.
mod collector;
mod generator;
mod worker;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{Mutex, mpsc},
    task::{JoinError, JoinSet},
    time::Duration,
};
use tokio_util::sync::CancellationToken;

use self::{collector::ResultCollector, generator::JobGenerator, worker::Worker};
use crate::{
    adapter::{OperationFactory, ProtocolAdapter},
    clock::Clock,
    config::{BenchOpts, BenchmarkConfig, EngineOpts},
    error::{EngineError, Result},
    metrics::MetricsAggregator,
    report::BenchReport,
    resilience::{CircuitBreaker, ErrorClassifier, RetryExecutor},
};

/// Outcome counts and timing of one run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Workers that served the run.
    pub workers: u32,
    /// Jobs the generator emitted.
    pub total_jobs: u64,
    /// Jobs whose result reached the collector.
    pub completed_jobs: u64,
    /// Completed jobs that succeeded.
    pub success_jobs: u64,
    /// Completed jobs that failed.
    pub failed_jobs: u64,
    /// Wall-clock time of the run.
    #[serde(serialize_with = "secs")]
    pub total_duration: Duration,
    /// When generation started.
    pub start_time: DateTime<Utc>,
    /// When the last result was collected.
    pub end_time: DateTime<Utc>,
}

/// Counters updated by the generator and the workers while a run is in progress.
#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
}

impl RunCounters {
    pub(crate) fn dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub(crate) fn complete(&self, success: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        let outcome = if success { &self.success } else { &self.failed };
        outcome.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drives a [`ProtocolAdapter`] with the jobs produced by an [`OperationFactory`].
///
/// The engine owns the metrics aggregator and the circuit breaker, both of
/// which are shared by every worker and survive across runs. Each call to
/// [`run_benchmark`](Self::run_benchmark) resets the metrics first.
pub struct Engine<A, F: ?Sized> {
    adapter: Arc<A>,
    factory: Arc<F>,
    opts: EngineOpts,
    metrics: Arc<MetricsAggregator>,
    retry: RetryExecutor,
}

impl<A, F> Engine<A, F>
where
    A: ProtocolAdapter + 'static,
    F: OperationFactory + ?Sized + 'static,
{
    /// Creates an engine with the built-in error classifier.
    pub fn new(adapter: Arc<A>, factory: Arc<F>, opts: EngineOpts) -> Self {
        Self::with_classifier(adapter, factory, opts, ErrorClassifier::default())
    }

    /// Creates an engine with a custom error classifier.
    pub fn with_classifier(adapter: Arc<A>, factory: Arc<F>, opts: EngineOpts, classifier: ErrorClassifier) -> Self {
        let metrics = Arc::new(MetricsAggregator::new(opts.metrics.clone()));
        let breaker = Arc::new(CircuitBreaker::new(opts.breaker.clone()));
        let retry = RetryExecutor::new(opts.retry.clone(), Arc::new(classifier), breaker);
        Self { adapter, factory, opts, metrics, retry }
    }

    /// The adapter driven by this engine.
    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    /// The engine options.
    pub fn opts(&self) -> &EngineOpts {
        &self.opts
    }

    /// The aggregator every result is recorded into.
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// The breaker shared by every worker.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.retry.breaker()
    }

    /// Connects the adapter.
    pub async fn connect(&self, cancel: &CancellationToken, config: &A::Config) -> Result<()> {
        self.adapter
            .connect(cancel, config)
            .await
            .map_err(|source| self.adapter_error("connect", source))
    }

    /// Closes the adapter.
    pub async fn close(&self) -> Result<()> {
        self.adapter.close().await.map_err(|source| self.adapter_error("close", source))
    }

    /// Runs one benchmark and returns its outcome counts.
    ///
    /// Cancelling `cancel` stops generation and interrupts in-flight jobs; the
    /// returned result then covers only what completed. Detailed statistics are
    /// available from [`metrics`](Self::metrics) afterwards.
    pub async fn run_benchmark(&self, cancel: &CancellationToken, config: &dyn BenchmarkConfig) -> Result<ExecutionResult> {
        self.opts.validate()?;
        let bench_opts = Arc::new(BenchOpts::from_config(config));
        let workers = self.opts.effective_workers(bench_opts.parallels);

        if self.opts.health_check {
            self.adapter
                .health_check(cancel)
                .await
                .map_err(|source| self.adapter_error("pass health check", source))?;
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            protocol = self.adapter.protocol_name(),
            total = bench_opts.total,
            workers,
            duration = ?bench_opts.duration,
            ramp_up = ?bench_opts.ramp_up,
            "starting benchmark"
        );

        // a failed task cancels the run without touching the caller's token
        let run = cancel.child_token();
        let (job_tx, job_rx) = mpsc::channel(self.opts.job_queue_capacity(workers));
        let (res_tx, res_rx) = mpsc::channel(self.opts.result_queue_capacity.max(1));
        let counters = Arc::new(RunCounters::default());
        let clock = Clock::new_stopped();

        self.metrics.reset();
        let start_time = Utc::now();
        clock.start();

        let collector = tokio::spawn(ResultCollector::new(res_rx, self.metrics.clone()).run());

        let jobs = Arc::new(Mutex::new(job_rx));
        let mut set = JoinSet::new();
        for id in 0..workers {
            let worker = Worker {
                id,
                adapter: self.adapter.clone(),
                retry: self.retry.clone(),
                jobs: jobs.clone(),
                results: res_tx.clone(),
                counters: counters.clone(),
                cancel: run.clone(),
            };
            set.spawn(worker.run());
        }
        drop(res_tx);

        let generator = JobGenerator {
            factory: self.factory.clone(),
            opts: bench_opts,
            clock: clock.clone(),
            min_interval: self.opts.min_ramp_interval,
            counters: counters.clone(),
        };
        let generator = tokio::spawn(generator.run(job_tx, run.clone()));

        let mut failure = None;
        if let Err(e) = generator.await {
            run.cancel();
            failure = Some(task_error("generator", e));
        }
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                run.cancel();
                failure.get_or_insert_with(|| task_error("worker", e));
            }
        }
        let collected = collector.await.map_err(|e| task_error("collector", e));

        clock.stop();
        self.metrics.finish();
        let end_time = Utc::now();

        if let Some(err) = failure {
            return Err(err);
        }
        let _collected = collected?;

        let result = ExecutionResult {
            workers,
            total_jobs: counters.dispatched(),
            completed_jobs: counters.completed.load(Ordering::Relaxed),
            success_jobs: counters.success.load(Ordering::Relaxed),
            failed_jobs: counters.failed.load(Ordering::Relaxed),
            total_duration: clock.elapsed(),
            start_time,
            end_time,
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            total = result.total_jobs,
            completed = result.completed_jobs,
            success = result.success_jobs,
            failed = result.failed_jobs,
            recorded = _collected,
            elapsed = ?result.total_duration,
            cancelled = cancel.is_cancelled(),
            "benchmark finished"
        );

        Ok(result)
    }

    /// Assembles the report of a finished run from the current metrics,
    /// adapter counters and breaker state.
    pub fn report(&self, execution: ExecutionResult) -> BenchReport {
        BenchReport {
            protocol: self.adapter.protocol_name().to_owned(),
            execution,
            metrics: self.metrics.snapshot(),
            adapter: self.adapter.protocol_metrics(),
            circuit: self.breaker().state(),
        }
    }

    fn adapter_error(&self, stage: &'static str, source: anyhow::Error) -> EngineError {
        #[cfg(feature = "tracing")]
        tracing::error!(protocol = self.adapter.protocol_name(), stage, "adapter error: {source:#}");
        EngineError::Adapter { protocol: self.adapter.protocol_name().to_owned(), stage, source }
    }
}

fn task_error(task: &'static str, source: JoinError) -> EngineError {
    EngineError::Task { task, source }
}

fn secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
