//! The final benchmark report.
use crate::{
    adapter::ProtocolMetrics, engine::ExecutionResult, metrics::MetricsSnapshot, resilience::CircuitState,
};

/// Everything a reporter renders once a run is over.
#[derive(Debug, Clone)]
pub struct BenchReport {
    /// Name of the protocol that was benchmarked.
    pub protocol: String,
    /// Job counts and timing of the run.
    pub execution: ExecutionResult,
    /// Aggregated latency, rate and protocol statistics.
    pub metrics: MetricsSnapshot,
    /// Counters reported by the adapter itself.
    pub adapter: ProtocolMetrics,
    /// Circuit breaker state when the run ended.
    pub circuit: CircuitState,
}

impl BenchReport {
    /// Fraction of completed jobs that succeeded, between 0 and 1.
    pub fn success_ratio(&self) -> f64 {
        self.metrics.success_ratio()
    }

    /// Jobs that were generated but never completed, e.g. because the run was cancelled.
    pub fn abandoned_jobs(&self) -> u64 {
        self.execution.total_jobs.saturating_sub(self.execution.completed_jobs)
    }
}
