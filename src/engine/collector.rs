use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{metrics::MetricsAggregator, operation::OperationResult};

/// Drains the result queue into the aggregator.
pub(crate) struct ResultCollector {
    results: mpsc::Receiver<OperationResult>,
    metrics: Arc<MetricsAggregator>,
}

impl ResultCollector {
    pub(crate) fn new(results: mpsc::Receiver<OperationResult>, metrics: Arc<MetricsAggregator>) -> Self {
        Self { results, metrics }
    }

    /// Runs until every worker has dropped its sender, returning the number of results recorded.
    pub(crate) async fn run(mut self) -> u64 {
        let mut recorded = 0;
        while let Some(result) = self.results.recv().await {
            self.metrics.record(&result);
            recorded += 1;
        }
        recorded
    }
}
