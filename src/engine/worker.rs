//! Workers pull jobs from the shared queue and push results.
use std::sync::Arc;

use tokio::{
    select,
    sync::{Mutex, mpsc},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use super::RunCounters;
use crate::{
    adapter::ProtocolAdapter,
    error::ExecuteError,
    operation::{Job, MetaKey, OperationResult},
    resilience::RetryExecutor,
};

/// Receiving end of the job queue, shared by every worker.
pub(crate) type JobQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

pub(crate) struct Worker<A> {
    pub(crate) id: u32,
    pub(crate) adapter: Arc<A>,
    pub(crate) retry: RetryExecutor,
    pub(crate) jobs: JobQueue,
    pub(crate) results: mpsc::Sender<OperationResult>,
    pub(crate) counters: Arc<RunCounters>,
    pub(crate) cancel: CancellationToken,
}

impl<A> Worker<A>
where
    A: ProtocolAdapter,
{
    /// Processes jobs until the queue is closed and drained or the run is cancelled.
    pub(crate) async fn run(self) {
        let mut processed = 0u64;
        loop {
            let job = select! {
                biased;
                _ = self.cancel.cancelled() => break,
                job = next_job(&self.jobs) => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            // an in-flight job interrupted by cancellation is dropped
            let Some(result) = self.process(&job).await else { break };
            let success = result.success;
            if self.results.send(result).await.is_err() {
                break;
            }
            self.counters.complete(success);
            processed += 1;
        }

        cfg_if::cfg_if! {
            if #[cfg(feature = "tracing")] {
                tracing::trace!(worker = self.id, processed, "worker finished");
            } else {
                let _ = (self.id, processed);
            }
        }
    }

    async fn process(&self, job: &Job) -> Option<OperationResult> {
        let started = Instant::now();
        let adapter = &self.adapter;
        let res = self
            .retry
            .execute(&job.context.cancel, |_| adapter.execute(&job.context, &job.operation))
            .await;

        match res {
            Ok((result, attempts)) => Some(result.with_meta(MetaKey::Attempts, attempts)),
            Err(ExecuteError::Cancelled) => None,
            Err(err) => Some(self.failed(started.elapsed(), job.operation.is_read, err)),
        }
    }

    /// Builds the result recorded for a job the adapter never completed.
    ///
    /// A job refused by the breaker after reaching the adapter reports the
    /// adapter's last error rather than the refusal.
    fn failed(&self, duration: std::time::Duration, is_read: bool, err: ExecuteError) -> OperationResult {
        let attempts = err.attempts();
        let state = self.retry.breaker().state();
        let result = match err {
            ExecuteError::Failed { source, info, .. }
            | ExecuteError::CircuitOpen { last: Some((source, info)), .. } => {
                #[cfg(feature = "tracing")]
                tracing::debug!(worker = self.id, attempts, kind = %info.kind, "job failed: {source:#}");
                OperationResult::failure(duration, is_read, format!("{source:#}"))
                    .with_meta(MetaKey::ErrorType, info.kind.to_string())
                    .with_meta(MetaKey::ErrorSeverity, info.severity.to_string())
                    .with_meta(MetaKey::Retryable, info.retryable)
                    .with_meta(MetaKey::Recoverable, info.recoverable)
            }
            other => OperationResult::failure(duration, is_read, other.to_string()),
        };
        result
            .with_meta(MetaKey::CircuitState, state.to_string())
            .with_meta(MetaKey::Attempts, attempts)
    }
}

async fn next_job(jobs: &JobQueue) -> Option<Job> {
    jobs.lock().await.recv().await
}
