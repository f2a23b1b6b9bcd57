use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use stampede::{
    BenchOpts, BenchmarkConfig, CircuitState, Engine, EngineError, EngineOpts, JobContext, MetaKey, Operation,
    OperationFactory, OperationResult, ProtocolAdapter,
    resilience::{BreakerConfig, RetryConfig},
};
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;

type Script = Box<dyn Fn(u64, u32, Duration) -> Outcome + Send + Sync>;

enum Outcome {
    Ok,
    Rejected(&'static str),
    Err(&'static str),
}

/// An adapter whose behaviour is scripted per `(job id, attempt, time since start)`.
struct Scripted {
    script: Script,
    latency: Duration,
    started: Instant,
    calls: AtomicU64,
    attempts: Mutex<HashMap<u64, u32>>,
    healthy: bool,
}

impl Scripted {
    fn new(script: impl Fn(u64, u32, Duration) -> Outcome + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            latency: Duration::ZERO,
            started: Instant::now(),
            calls: AtomicU64::new(0),
            attempts: Mutex::default(),
            healthy: true,
        }
    }

    fn always_ok() -> Self {
        Self::new(|_, _, _| Outcome::Ok)
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl ProtocolAdapter for Scripted {
    type Config = ();

    async fn connect(&self, _: &CancellationToken, _: &()) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: &JobContext, op: &Operation) -> Result<OperationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut attempts = self.attempts.lock();
            let n = attempts.entry(ctx.job_id).or_default();
            *n += 1;
            *n
        };
        if !self.latency.is_zero() {
            time::sleep(self.latency).await;
        }

        let is_read = op.is_read;
        match (self.script)(ctx.job_id, attempt, self.started.elapsed()) {
            Outcome::Ok => Ok(OperationResult::success(self.latency, is_read)),
            Outcome::Rejected(msg) => Ok(OperationResult::failure(self.latency, is_read, msg)),
            Outcome::Err(msg) => bail!("{msg}"),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self, _: &CancellationToken) -> Result<()> {
        if !self.healthy {
            bail!("connection refused");
        }
        Ok(())
    }

    fn protocol_name(&self) -> &str {
        "scripted"
    }
}

fn keys() -> Arc<dyn OperationFactory> {
    Arc::new(|id: u64, _: &dyn BenchmarkConfig| Operation::new("get", format!("key:{id}")).read())
}

fn engine(adapter: Scripted, opts: EngineOpts) -> Engine<Scripted, dyn OperationFactory> {
    Engine::new(Arc::new(adapter), keys(), opts)
}

fn bench(total: u64, parallels: u32) -> BenchOpts {
    BenchOpts { total, parallels, ..Default::default() }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_to_success() {
    let adapter = Scripted::new(|_, attempt, _| match attempt {
        1 => Outcome::Err("i/o timeout"),
        _ => Outcome::Ok,
    });
    // every first attempt fails, so keep the breaker out of the way
    let opts = EngineOpts {
        breaker: BreakerConfig { failure_threshold: 1000, ..Default::default() },
        ..Default::default()
    };
    let engine = engine(adapter, opts);
    let res = engine.run_benchmark(&CancellationToken::new(), &bench(40, 8)).await.unwrap();

    assert_eq!(res.completed_jobs, 40);
    assert_eq!(res.success_jobs, 40);
    assert_eq!(engine.adapter().calls.load(Ordering::SeqCst), 80);

    let snap = engine.metrics().snapshot();
    assert!(snap.errors.is_empty());
    let attempts = snap.protocol[&MetaKey::Attempts].numeric.clone().unwrap();
    assert_eq!((attempts.min, attempts.max), (2.0, 2.0));
    assert_eq!(engine.breaker().state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn rejected_results_are_recorded_without_retry() {
    let adapter = Scripted::new(|id, _, _| match id % 4 {
        0 => Outcome::Rejected("NOT_FOUND"),
        _ => Outcome::Ok,
    });
    let engine = engine(adapter, EngineOpts::default());
    let res = engine.run_benchmark(&CancellationToken::new(), &bench(20, 2)).await.unwrap();

    assert_eq!(res.failed_jobs, 5);
    assert_eq!(res.success_jobs, 15);
    assert_eq!(engine.adapter().calls.load(Ordering::SeqCst), 20);

    let snap = engine.metrics().snapshot();
    assert_eq!(snap.errors.get("NOT_FOUND"), Some(&5));
    assert_eq!(snap.error_rate, 25.0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_the_classification() {
    let adapter = Scripted::new(|_, _, _| Outcome::Err("dial tcp: connection refused"));
    let opts = EngineOpts {
        retry: RetryConfig { max_retries: 2, ..Default::default() },
        breaker: BreakerConfig { failure_threshold: 1000, ..Default::default() },
        ..Default::default()
    };
    let engine = engine(adapter, opts);
    let res = engine.run_benchmark(&CancellationToken::new(), &bench(5, 1)).await.unwrap();

    assert_eq!(res.failed_jobs, 5);
    assert_eq!(engine.adapter().calls.load(Ordering::SeqCst), 15);

    let snap = engine.metrics().snapshot();
    assert_eq!(snap.errors.get("dial tcp: connection refused"), Some(&5));
    assert_eq!(snap.protocol[&MetaKey::ErrorType].labels.get("connection"), Some(&5));
    assert_eq!(snap.protocol[&MetaKey::ErrorSeverity].labels.get("high"), Some(&5));
    assert_eq!(snap.protocol[&MetaKey::Retryable].labels.get("true"), Some(&5));
}

#[tokio::test(start_paused = true)]
async fn breaker_tripping_mid_retry_keeps_the_adapter_error() {
    let adapter = Scripted::new(|_, _, _| Outcome::Err("connection refused"));
    let opts = EngineOpts {
        retry: RetryConfig { max_retries: 5, ..Default::default() },
        breaker: BreakerConfig { failure_threshold: 2, ..Default::default() },
        ..Default::default()
    };
    let engine = engine(adapter, opts);
    let res = engine.run_benchmark(&CancellationToken::new(), &bench(1, 1)).await.unwrap();

    // the second failure opens the circuit before the third attempt
    assert_eq!(res.failed_jobs, 1);
    assert_eq!(engine.adapter().calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.breaker().state(), CircuitState::Open);

    let snap = engine.metrics().snapshot();
    assert_eq!(snap.errors.get("connection refused"), Some(&1));
    assert!(!snap.errors.contains_key("circuit breaker is open"));
    assert_eq!(snap.protocol[&MetaKey::ErrorType].labels.get("connection"), Some(&1));
    assert_eq!(snap.protocol[&MetaKey::Retryable].labels.get("true"), Some(&1));
    assert_eq!(snap.protocol[&MetaKey::CircuitState].labels.get("open"), Some(&1));
    let attempts = snap.protocol[&MetaKey::Attempts].numeric.clone().unwrap();
    assert_eq!(attempts.max, 2.0);
    assert_eq!((snap.reads, snap.writes), (1, 0));
}

#[tokio::test(start_paused = true)]
async fn breaker_sheds_load_and_recovers() {
    // backend is down for the first 500ms
    let adapter = Scripted::new(|_, _, since| {
        if since < Duration::from_millis(500) { Outcome::Err("connection reset") } else { Outcome::Ok }
    });
    let opts = EngineOpts {
        retry: RetryConfig::no_retry(),
        breaker: BreakerConfig { failure_threshold: 3, success_threshold: 2, timeout: Duration::from_secs(1) },
        ..Default::default()
    };
    let engine = engine(adapter, opts);
    // one job every 50ms
    let cfg = BenchOpts { ramp_up: Some(Duration::from_secs(5)), ..bench(100, 4) };
    let res = engine.run_benchmark(&CancellationToken::new(), &cfg).await.unwrap();

    // jobs at 0, 50 and 100ms open the circuit; jobs up to 1050ms are refused;
    // the probe at 1100ms and the job after it close it again
    assert_eq!(res.completed_jobs, 100);
    assert_eq!(res.failed_jobs, 22);
    assert_eq!(res.success_jobs, 78);
    assert_eq!(engine.adapter().calls.load(Ordering::SeqCst), 81);
    assert_eq!(engine.breaker().state(), CircuitState::Closed);

    let snap = engine.metrics().snapshot();
    assert_eq!(snap.errors.get("circuit breaker is open"), Some(&19));
    assert_eq!(snap.errors.get("connection reset"), Some(&3));
}

#[tokio::test(start_paused = true)]
async fn duration_bounds_the_run() {
    let engine = engine(Scripted::always_ok(), EngineOpts::default());
    let cfg = BenchOpts {
        duration: Some(Duration::from_millis(250)),
        ramp_up: Some(Duration::from_secs(100)),
        ..bench(1000, 4)
    };
    let res = engine.run_benchmark(&CancellationToken::new(), &cfg).await.unwrap();

    // one job every 100ms: at 0, 100 and 200ms
    assert_eq!(res.total_jobs, 3);
    assert_eq!(res.completed_jobs, 3);
    assert!(res.total_duration >= Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn cancellation_returns_promptly() {
    let engine = engine(Scripted::always_ok().with_latency(Duration::from_secs(10)), EngineOpts::default());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let res = engine.run_benchmark(&cancel, &bench(1000, 16)).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(res.completed_jobs, 0);
    assert!(res.total_jobs >= 16);
    assert!(res.completed_jobs <= res.total_jobs);
    assert_eq!(engine.metrics().total(), 0);
}

#[tokio::test]
async fn completed_is_the_sum_of_outcomes() {
    let adapter = Scripted::new(|id, _, _| match id % 3 {
        0 => Outcome::Err("permission denied"),
        _ => Outcome::Ok,
    });
    let engine = engine(adapter, EngineOpts::default());
    let res = engine.run_benchmark(&CancellationToken::new(), &bench(301, 7)).await.unwrap();

    assert_eq!(res.total_jobs, 301);
    assert_eq!(res.completed_jobs, res.success_jobs + res.failed_jobs);
    assert!(res.completed_jobs <= res.total_jobs);
    assert_eq!(engine.metrics().total(), res.completed_jobs);
}

#[tokio::test]
async fn failed_health_check_aborts_before_any_job() {
    let adapter = Scripted { healthy: false, ..Scripted::always_ok() };
    let engine = engine(adapter, EngineOpts::default());
    let err = engine.run_benchmark(&CancellationToken::new(), &bench(10, 1)).await.unwrap_err();

    match err {
        EngineError::Adapter { protocol, stage, .. } => {
            assert_eq!(protocol, "scripted");
            assert_eq!(stage, "pass health check");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(engine.adapter().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn report_carries_run_and_adapter_state() {
    let engine = engine(Scripted::always_ok(), EngineOpts::default());
    let res = engine.run_benchmark(&CancellationToken::new(), &bench(12, 3)).await.unwrap();
    let report = engine.report(res);

    assert_eq!(report.protocol, "scripted");
    assert_eq!(report.execution.workers, 3);
    assert_eq!(report.metrics.total, 12);
    assert_eq!(report.metrics.reads, 12);
    assert_eq!(report.circuit, CircuitState::Closed);
    assert_eq!(report.success_ratio(), 1.0);
    assert_eq!(report.abandoned_jobs(), 0);
}
