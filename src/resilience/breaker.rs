//! A tri-state circuit breaker.
//!
//! ```text
//! Closed   --failure_threshold consecutive failures-->  Open
//! Open     --timeout elapsed, next recorded outcome--> HalfOpen
//! HalfOpen --success_threshold consecutive successes--> Closed
//! HalfOpen --any failure-->                             Open
//! ```
//!
//! Once the timeout has elapsed, [`CircuitBreaker::can_execute`] lets probe
//! attempts through while [`CircuitBreaker::state`] still reads `Open`. The
//! move to `HalfOpen` happens when the first outcome after that point is
//! recorded: a success counts as the first half-open success, a failure
//! re-opens the circuit and restarts the timeout. Outcomes recorded while the
//! circuit is open and the timeout has not elapsed come from calls that were
//! already in flight; failures are counted but do not restart the timeout,
//! successes are ignored.
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{Duration, Instant};

/// Breaker state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    #[default]
    Closed,
    /// Calls are refused until the timeout elapses.
    Open,
    /// Probing whether the backend recovered.
    HalfOpen,
}

/// Breaker thresholds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,
    /// How long an open circuit refuses calls.
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, success_threshold: 3, timeout: Duration::from_secs(30) }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
}

impl Inner {
    fn probe_ready(&self, timeout: Duration) -> bool {
        self.last_failure.is_none_or(|t| t.elapsed() >= timeout)
    }
}

/// A circuit breaker shared by every worker of an engine.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(config: BreakerConfig) -> Self {
        Self { config, inner: Mutex::new(Inner::default()) }
    }

    /// Whether a call may be dispatched now.
    pub fn can_execute(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => inner.probe_ready(self.config.timeout),
        }
    }

    /// The recorded state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    /// Current consecutive success count.
    pub fn success_count(&self) -> u32 {
        self.inner.lock().successes
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures = 0;
                inner.successes = inner.successes.saturating_add(1);
            }
            CircuitState::Open => {
                if !inner.probe_ready(self.config.timeout) {
                    return;
                }
                half_open(&mut inner);
                self.half_open_success(&mut inner);
            }
            CircuitState::HalfOpen => self.half_open_success(&mut inner),
        }
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::Closed => {
                inner.failures = inner.failures.saturating_add(1);
                inner.successes = 0;
                if inner.failures >= self.config.failure_threshold {
                    self.open(&mut inner, now);
                }
            }
            CircuitState::Open if inner.probe_ready(self.config.timeout) => {
                half_open(&mut inner);
                self.open(&mut inner, now);
            }
            CircuitState::Open => inner.failures = inner.failures.saturating_add(1),
            CircuitState::HalfOpen => self.open(&mut inner, now),
        }
    }

    /// Forces the breaker back to closed with cleared counters.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::default();
    }

    fn half_open_success(&self, inner: &mut Inner) {
        inner.failures = 0;
        inner.successes = inner.successes.saturating_add(1);
        if inner.successes >= self.config.success_threshold {
            inner.state = CircuitState::Closed;
            inner.successes = 0;
            #[cfg(feature = "tracing")]
            tracing::info!("circuit breaker closed");
        }
    }

    fn open(&self, inner: &mut Inner, now: Instant) {
        #[cfg(feature = "tracing")]
        if inner.state != CircuitState::Open {
            tracing::warn!(failures = inner.failures, timeout = ?self.config.timeout, "circuit breaker opened");
        }
        inner.state = CircuitState::Open;
        inner.successes = 0;
        inner.last_failure = Some(now);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

fn half_open(inner: &mut Inner) {
    inner.state = CircuitState::HalfOpen;
    inner.failures = 0;
    inner.successes = 0;
    #[cfg(feature = "tracing")]
    tracing::debug!("circuit breaker half-open");
}

#[cfg(test)]
mod tests {
    use tokio::time;

    use super::*;

    fn tripped(breaker: &CircuitBreaker) {
        for _ in 0..5 {
            assert!(breaker.can_execute());
            breaker.record_failure();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::default();
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 4);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_failure_streak() {
        let breaker = CircuitBreaker::default();
        for _ in 0..4 {
            breaker.record_failure();
        }
        breaker.record_success();
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn probes_are_allowed_after_timeout_and_close_after_successes() {
        let breaker = CircuitBreaker::default();
        tripped(&breaker);

        time::advance(Duration::from_secs(29)).await;
        assert!(!breaker.can_execute());
        time::advance(Duration::from_secs(1)).await;
        assert!(breaker.can_execute());
        // the recorded state only moves on the next outcome
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_while_half_open_reopens() {
        let breaker = CircuitBreaker::default();
        tripped(&breaker);
        time::advance(Duration::from_secs(30)).await;

        breaker.record_success();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());

        // the timeout restarted at the failed probe
        time::advance(Duration::from_secs(30)).await;
        assert!(breaker.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_first_probe_restarts_the_timeout() {
        let breaker = CircuitBreaker::default();
        tripped(&breaker);
        time::advance(Duration::from_secs(31)).await;
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn late_outcomes_while_open_do_not_move_the_state() {
        let breaker = CircuitBreaker::default();
        tripped(&breaker);

        time::advance(Duration::from_secs(20)).await;
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // the in-flight failure did not extend the original timeout
        time::advance(Duration::from_secs(10)).await;
        assert!(breaker.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_closes() {
        let breaker = CircuitBreaker::default();
        tripped(&breaker);
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn single_success_threshold_closes_from_open() {
        let config = BreakerConfig { failure_threshold: 1, success_threshold: 1, timeout: Duration::from_secs(1) };
        let breaker = CircuitBreaker::new(config);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        time::advance(Duration::from_secs(1)).await;
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
