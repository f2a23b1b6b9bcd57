//! Retry and circuit-breaking shared by every protocol adapter.
//!
//! - [`ErrorClassifier`] maps an adapter error onto an [`ErrorType`] with
//!   retry and recovery hints.
//! - [`CircuitBreaker`] stops dispatch to a backend after sustained failures
//!   and lets probe attempts through once its timeout has elapsed.
//! - [`RetryExecutor`] wraps a single operation with classification-aware
//!   retries and exponential backoff, consulting the breaker before every
//!   attempt.

mod breaker;
mod classifier;
mod retry;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use classifier::{ClassifierRule, ErrorClassifier, ErrorInfo, ErrorType, Severity};
pub use retry::{RetryConfig, RetryExecutor};
