//! Classification-aware retries with exponential backoff.
use std::{collections::HashSet, future::Future, sync::Arc};

use tokio::{
    select,
    time::{self, Duration},
};
use tokio_util::sync::CancellationToken;

use super::{CircuitBreaker, ErrorClassifier, ErrorType};
use crate::error::ExecuteError;

/// Retry policy.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the backoff delay before jitter.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
    /// Maximum random jitter, as a fraction of the delay.
    pub jitter: f64,
    /// Error types that are worth retrying.
    pub retryable: HashSet<ErrorType>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        use ErrorType::*;
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: 0.1,
            retryable: HashSet::from([Timeout, Connection, Network, Temporary, RateLimit]),
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self { max_retries: 0, ..Default::default() }
    }

    /// Backoff before retry number `retry` (0-based), without jitter:
    /// `min(initial_delay * backoff_factor^retry, max_delay)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// [`backoff`](Self::backoff) plus up to `jitter` of random extra delay.
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        let jitter = self.jitter.clamp(0.0, 1.0) * rand::random::<f64>();
        base + base.mul_f64(jitter)
    }
}

/// Runs an operation under the retry policy and the circuit breaker.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    classifier: Arc<ErrorClassifier>,
    breaker: Arc<CircuitBreaker>,
}

impl RetryExecutor {
    /// Creates an executor sharing `classifier` and `breaker`.
    pub fn new(config: RetryConfig, classifier: Arc<ErrorClassifier>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { config, classifier, breaker }
    }

    /// The breaker consulted before every attempt.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The classifier applied to every failed attempt.
    pub fn classifier(&self) -> &Arc<ErrorClassifier> {
        &self.classifier
    }

    /// The retry policy.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error or runs out of retries.
    ///
    /// `op` receives the 0-based attempt number. Before every attempt the
    /// breaker is consulted; a refusal returns [`ExecuteError::CircuitOpen`]
    /// without consuming a retry, carrying the previous attempt's error if any. Every outcome is recorded on the breaker.
    /// Cancelling `cancel` interrupts both the call and the backoff sleep.
    ///
    /// On success returns the value and the number of attempts made.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<(T, u32), ExecuteError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempts = 0;
        let mut last = None;
        loop {
            if cancel.is_cancelled() {
                return Err(ExecuteError::Cancelled);
            }
            if !self.breaker.can_execute() {
                return Err(ExecuteError::CircuitOpen { state: self.breaker.state(), attempts, last });
            }

            let res = select! {
                biased;
                _ = cancel.cancelled() => return Err(ExecuteError::Cancelled),
                res = op(attempts) => res,
            };
            attempts += 1;

            let err = match res {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok((value, attempts));
                }
                Err(err) => err,
            };

            self.breaker.record_failure();
            let info = self.classifier.classify(&err);
            let retry = attempts - 1;
            if retry >= self.config.max_retries || !self.config.retryable.contains(&info.kind) {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempts, kind = %info.kind, "giving up: {err:#}");
                return Err(ExecuteError::Failed { source: err, info, attempts });
            }

            let delay = self.config.delay(retry);
            #[cfg(feature = "tracing")]
            tracing::debug!(attempt = attempts, kind = %info.kind, ?delay, "retrying: {err:#}");

            select! {
                biased;
                _ = cancel.cancelled() => return Err(ExecuteError::Cancelled),
                _ = time::sleep(delay) => (),
            }
            last = Some((err, info));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::{anyhow, bail};
    use tokio::time::Instant;

    use super::*;
    use crate::resilience::{BreakerConfig, CircuitState};

    fn executor(config: RetryConfig) -> RetryExecutor {
        RetryExecutor::new(config, Arc::default(), Arc::default())
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let config = RetryConfig { max_delay: Duration::from_secs(1), ..Default::default() };
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(2), Duration::from_millis(400));
        assert_eq!(config.backoff(10), Duration::from_secs(1));
        assert_eq!(config.backoff(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn jitter_adds_at_most_ten_percent() {
        let config = RetryConfig::default();
        for retry in 0..5 {
            let base = config.backoff(retry);
            for _ in 0..100 {
                let d = config.delay(retry);
                assert!(d >= base && d <= base.mul_f64(1.1), "{d:?} vs {base:?}");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_retryable_failures() {
        let calls = Mutex::new(Vec::new());
        let exec = executor(RetryConfig { max_retries: 2, ..Default::default() });

        let res = exec
            .execute(&CancellationToken::new(), |attempt| {
                calls.lock().unwrap().push(Instant::now());
                async move {
                    if attempt < 2 {
                        bail!("connection reset by peer");
                    }
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(res.unwrap(), (2, 3));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for (k, pair) in calls.windows(2).enumerate() {
            let gap = pair[1] - pair[0];
            let expected = Duration::from_millis(100 * 2u64.pow(k as u32));
            // tokio timers round up to the next millisecond
            assert!(gap >= expected && gap <= expected.mul_f64(1.1) + Duration::from_millis(1), "{gap:?}");
        }
        assert_eq!(exec.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_fail_immediately() {
        let exec = executor(RetryConfig::default());
        let err = exec
            .execute(&CancellationToken::new(), |_| async { Err::<(), _>(anyhow!("AUTH failed")) })
            .await
            .unwrap_err();

        match err {
            ExecuteError::Failed { info, attempts, .. } => {
                assert_eq!(info.kind, ErrorType::Authentication);
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_and_returns_the_last_error() {
        let exec = executor(RetryConfig::default());
        let err = exec
            .execute(&CancellationToken::new(), |attempt| async move {
                Err::<(), _>(anyhow!("timeout on attempt {attempt}"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 4);
        assert_eq!(err.info().map(|i| i.kind), Some(ErrorType::Timeout));
        assert!(err.to_string().contains("attempt 3"), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_refuses_without_calling() {
        let exec = executor(RetryConfig::default());
        for _ in 0..5 {
            exec.breaker().record_failure();
        }

        let mut called = false;
        let err = exec
            .execute(&CancellationToken::new(), |_| {
                called = true;
                async { Ok(()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ExecuteError::CircuitOpen { state: CircuitState::Open, attempts: 0, last: None }));
        assert!(!called);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opening_mid_retry_stops_the_loop() {
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig { failure_threshold: 2, ..Default::default() }));
        let exec = RetryExecutor::new(
            RetryConfig { max_retries: 5, ..Default::default() },
            Arc::default(),
            breaker,
        );

        let err = exec
            .execute(&CancellationToken::new(), |attempt| async move {
                Err::<(), _>(anyhow!("network down on attempt {attempt}"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.info().map(|i| i.kind), Some(ErrorType::Network));
        match err {
            ExecuteError::CircuitOpen { state, attempts, last: Some((source, info)) } => {
                assert_eq!(state, CircuitState::Open);
                assert_eq!(attempts, 2);
                assert_eq!(source.to_string(), "network down on attempt 1");
                assert!(info.retryable);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let exec = executor(RetryConfig { initial_delay: Duration::from_secs(60), ..Default::default() });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = exec
            .execute(&cancel, |_| async { Err::<(), _>(anyhow!("timeout")) })
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_call() {
        let exec = executor(RetryConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = exec.execute(&cancel, |_| async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, ExecuteError::Cancelled));
    }
}
