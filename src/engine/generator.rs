//! Produces the bounded stream of jobs for a run.
use std::sync::Arc;

use tokio::{
    select,
    sync::mpsc,
    time::{self, Duration},
};
use tokio_util::sync::CancellationToken;

use super::RunCounters;
use crate::{
    adapter::OperationFactory,
    clock::Clock,
    config::{BenchOpts, BenchmarkConfig},
    operation::{Job, JobContext},
};

pub(crate) struct JobGenerator<F: ?Sized> {
    pub(crate) factory: Arc<F>,
    pub(crate) opts: Arc<BenchOpts>,
    pub(crate) clock: Clock,
    pub(crate) min_interval: Duration,
    pub(crate) counters: Arc<RunCounters>,
}

impl<F> JobGenerator<F>
where
    F: OperationFactory + ?Sized,
{
    /// Spacing between jobs in ramp-up mode, or `None` to emit as fast as the queue accepts.
    pub(crate) fn interval(&self) -> Option<Duration> {
        let ramp_up = self.opts.ramp_up.filter(|d| !d.is_zero())?;
        if self.opts.total == 0 {
            return None;
        }
        let nanos = ramp_up.as_nanos() / u128::from(self.opts.total);
        let interval = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
        Some(interval.max(self.min_interval))
    }

    /// Emits jobs into `tx` until `total` is reached, the duration bound fires
    /// or the run is cancelled. Dropping `tx` on return closes the job queue.
    pub(crate) async fn run(self, tx: mpsc::Sender<Job>, cancel: CancellationToken) {
        match self.opts.duration.filter(|d| !d.is_zero()) {
            Some(limit) => {
                if time::timeout(limit, self.emit(&tx, &cancel)).await.is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(?limit, "generation stopped: duration elapsed");
                }
            }
            None => self.emit(&tx, &cancel).await,
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(emitted = self.counters.dispatched(), "job generation finished");
    }

    async fn emit(&self, tx: &mpsc::Sender<Job>, cancel: &CancellationToken) {
        let mut ticker = self.interval().map(|i| self.clock.ticker(i));

        for id in 0..self.opts.total {
            // job 0 goes out immediately, job n at n * interval
            if let Some(ticker) = ticker.as_mut().filter(|_| id > 0) {
                select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => (),
                }
            }

            let config: &dyn BenchmarkConfig = self.opts.as_ref();
            let job = Job {
                id,
                operation: self.factory.create_operation(id, config),
                context: JobContext { job_id: id, timeout: self.opts.timeout, cancel: cancel.clone() },
            };

            select! {
                biased;
                _ = cancel.cancelled() => return,
                res = tx.send(job) => if res.is_err() {
                    // every worker is gone
                    return;
                },
            }
            self.counters.dispatch();
        }
    }
}
