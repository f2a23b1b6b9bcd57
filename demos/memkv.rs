//! Benchmarks an in-process key-value store with simulated latency and faults.
//!
//! ```shell
//! RUST_LOG=stampede=debug cargo run --example memkv -- -n 10000 -c 32 --failure-rate 0.02
//! ```
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use clap::Parser;
use parking_lot::RwLock;
use stampede::{
    BenchmarkConfig, JobContext, MetaKey, MetaValue, Operation, OperationResult, ProtocolAdapter, ProtocolMetrics,
    cli::BenchCli,
};
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone)]
struct Opts {
    /// Number of distinct keys
    #[clap(long, default_value_t = 1000)]
    keys: u64,

    /// Fraction of operations that are reads
    #[clap(long, default_value_t = 0.8)]
    read_ratio: f64,

    /// Size of written values in bytes
    #[clap(long, default_value_t = 128)]
    value_size: usize,

    /// Fraction of operations that fail with a transient error
    #[clap(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Simulated service time per operation
    #[clap(long, default_value = "200us")]
    latency: humantime::Duration,

    #[command(flatten)]
    bench: BenchCli,
}

struct Settings {
    failure_rate: f64,
    latency: Duration,
}

struct MemKv {
    store: RwLock<HashMap<String, Vec<u8>>>,
    connected: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    faults: AtomicU64,
    settings: RwLock<Settings>,
}

impl MemKv {
    fn new() -> Self {
        Self {
            store: RwLock::default(),
            connected: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            faults: AtomicU64::new(0),
            settings: RwLock::new(Settings { failure_rate: 0.0, latency: Duration::ZERO }),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for MemKv {
    type Config = Settings;

    async fn connect(&self, _: &CancellationToken, config: &Settings) -> Result<()> {
        *self.settings.write() = Settings { failure_rate: config.failure_rate, latency: config.latency };
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(latency = ?config.latency, failure_rate = config.failure_rate, "memkv connected");
        Ok(())
    }

    async fn execute(&self, ctx: &JobContext, op: &Operation) -> Result<OperationResult> {
        let (failure_rate, latency) = {
            let s = self.settings.read();
            (s.failure_rate, s.latency)
        };
        let started = Instant::now();

        if let Some(limit) = ctx.timeout.filter(|limit| *limit < latency) {
            time::sleep(limit).await;
            bail!("operation timed out after {limit:?}");
        }
        time::sleep(latency).await;
        if rand::random::<f64>() < failure_rate {
            self.faults.fetch_add(1, Ordering::Relaxed);
            bail!("connection reset by peer");
        }

        let result = match op.op_type.as_str() {
            "get" => {
                let value = self.store.read().get(&op.key).cloned();
                let counter = if value.is_some() { &self.hits } else { &self.misses };
                counter.fetch_add(1, Ordering::Relaxed);
                let received = value.as_ref().map_or(0, Vec::len);
                let result = OperationResult::success(started.elapsed(), true)
                    .with_meta(MetaKey::BytesReceived, received as i64)
                    .with_meta(MetaKey::Method, "get");
                match value {
                    Some(value) => result.with_value(value),
                    None => result,
                }
            }
            "set" => {
                let value = op.value.clone().unwrap_or_default();
                let sent = value.len();
                self.store.write().insert(op.key.clone(), value);
                OperationResult::success(started.elapsed(), false)
                    .with_meta(MetaKey::BytesSent, sent as i64)
                    .with_meta(MetaKey::Method, "set")
            }
            other => OperationResult::failure(started.elapsed(), false, format!("unsupported operation {other}")),
        };
        Ok(result.with_meta(MetaKey::QueueTime, Duration::ZERO))
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self, _: &CancellationToken) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            bail!("memkv is not connected");
        }
        Ok(())
    }

    fn protocol_name(&self) -> &str {
        "memkv"
    }

    fn protocol_metrics(&self) -> ProtocolMetrics {
        ProtocolMetrics::from([
            ("keys".to_owned(), MetaValue::Int(self.store.read().len() as i64)),
            ("hits".to_owned(), MetaValue::Int(self.hits.load(Ordering::Relaxed) as i64)),
            ("misses".to_owned(), MetaValue::Int(self.misses.load(Ordering::Relaxed) as i64)),
            ("faults".to_owned(), MetaValue::Int(self.faults.load(Ordering::Relaxed) as i64)),
        ])
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stampede=info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    let settings = Settings { failure_rate: opts.failure_rate, latency: opts.latency.into() };

    let keys = opts.keys.max(1);
    let read_ratio = opts.read_ratio;
    let value = vec![b'x'; opts.value_size];
    let factory = move |id: u64, _: &dyn BenchmarkConfig| {
        let key = format!("key:{}", id % keys);
        if rand::random::<f64>() < read_ratio {
            Operation::new("get", key).read()
        } else {
            Operation::new("set", key).with_value(value.clone())
        }
    };

    stampede::cli::run(&opts.bench, MemKv::new(), &settings, factory).await?;
    Ok(())
}
