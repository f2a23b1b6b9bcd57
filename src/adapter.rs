//! Seams between the engine and protocol-specific code.
use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    config::BenchmarkConfig,
    operation::{JobContext, MetaValue, Operation, OperationResult},
};

/// Adapter-reported counters, keyed by a protocol-chosen name.
pub type ProtocolMetrics = BTreeMap<String, MetaValue>;

/// A client for one backend protocol.
///
/// The adapter is shared by every worker through an `Arc`, so it is
/// responsible for protecting its own connection pool.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Protocol-specific connection settings.
    type Config: Send + Sync;

    /// Establish connections to the backend.
    async fn connect(&self, cancel: &CancellationToken, config: &Self::Config) -> Result<()>;

    /// Execute one operation.
    ///
    /// An `Err` is treated as a transport failure and classified for retry.
    /// An `Ok` result with `success == false` is recorded as-is without retrying.
    async fn execute(&self, ctx: &JobContext, operation: &Operation) -> Result<OperationResult>;

    /// Release all backend resources.
    async fn close(&self) -> Result<()>;

    /// Verify that the backend is reachable.
    async fn health_check(&self, cancel: &CancellationToken) -> Result<()>;

    /// Name of the protocol, e.g. `redis` or `http`.
    fn protocol_name(&self) -> &str;

    /// Protocol-specific counters accumulated by the adapter.
    fn protocol_metrics(&self) -> ProtocolMetrics {
        ProtocolMetrics::new()
    }
}

/// Produces the operation for each generated job.
pub trait OperationFactory: Send + Sync {
    /// Create the operation for job `job_id`.
    fn create_operation(&self, job_id: u64, config: &dyn BenchmarkConfig) -> Operation;
}

impl<F> OperationFactory for F
where
    F: Fn(u64, &dyn BenchmarkConfig) -> Operation + Send + Sync,
{
    fn create_operation(&self, job_id: u64, config: &dyn BenchmarkConfig) -> Operation {
        self(job_id, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BenchOpts;

    #[test]
    fn closures_are_factories() {
        let factory = |id: u64, config: &dyn BenchmarkConfig| {
            Operation::new("get", format!("key:{}", id % config.total())).read()
        };
        let opts = BenchOpts { total: 4, ..Default::default() };
        assert_eq!(factory.create_operation(6, &opts).key, "key:2");
    }
}
