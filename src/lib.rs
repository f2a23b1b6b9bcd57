//! A multi-protocol load generation engine.
//!
//! stampede drives any backend that can be wrapped in a [`ProtocolAdapter`]:
//! a generator produces jobs from an [`OperationFactory`], a bounded pool of
//! workers executes them under a retry policy and a shared circuit breaker,
//! and a collector folds every result into latency percentiles, a sliding
//! window rate and per-key protocol statistics.
//!
//! ## Features
//!
//! - **Protocol agnostic**: the engine only knows the [`ProtocolAdapter`] seam.
//! - **Backpressure**: bounded job and result queues with a worker ceiling.
//! - **Resilience**: error classification, exponential backoff with jitter and
//!   a tri-state circuit breaker that sheds load from a failing backend.
//! - **Pacing**: fixed job counts, duration bounds and linear ramp-up.
//! - **Reports**: styled text or JSON with latency, rate and protocol metrics.
//!
//! ## Example
//!
//! ```no_run
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use clap::Parser;
//! use stampede::{
//!     BenchmarkConfig, JobContext, Operation, OperationResult, ProtocolAdapter, cli::BenchCli,
//! };
//! use tokio::time::Instant;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ProtocolAdapter for Echo {
//!     type Config = ();
//!
//!     async fn connect(&self, _: &CancellationToken, _: &()) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     async fn execute(&self, _: &JobContext, op: &Operation) -> Result<OperationResult> {
//!         let t = Instant::now();
//!         // talk to the backend here
//!         Ok(OperationResult::success(t.elapsed(), op.is_read))
//!     }
//!
//!     async fn close(&self) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     async fn health_check(&self, _: &CancellationToken) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     fn protocol_name(&self) -> &str {
//!         "echo"
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let factory = |id: u64, _: &dyn BenchmarkConfig| Operation::new("get", format!("key:{id}")).read();
//!     stampede::cli::run(&BenchCli::parse(), Echo, &(), factory).await?;
//!     Ok(())
//! }
//! ```
//!
//! A complete adapter over an in-memory store lives in `demos/memkv.rs`.
#![deny(missing_docs)]

mod clock;
mod duration;
mod engine;
mod report;

pub mod adapter;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod operation;
pub mod reporter;
pub mod resilience;

pub use crate::{
    adapter::{OperationFactory, ProtocolAdapter, ProtocolMetrics},
    config::{BenchOpts, BenchmarkConfig, EngineOpts},
    engine::{Engine, ExecutionResult},
    error::{EngineError, ExecuteError, Result},
    metrics::{MetricsAggregator, MetricsSnapshot},
    operation::{Job, JobContext, MetaKey, MetaValue, Metadata, Operation, OperationResult},
    report::BenchReport,
    resilience::{CircuitBreaker, CircuitState, ErrorClassifier, RetryExecutor},
};
