//! Error types for the execution engine.
use std::io;

use thiserror::Error;

use crate::resilience::{CircuitState, ErrorInfo};

/// Result alias used across the crate.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Errors surfaced by a benchmark run or its surrounding lifecycle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The adapter failed to connect, pass its health check or close.
    #[error("{protocol} adapter failed to {stage}")]
    Adapter {
        /// Protocol name reported by the adapter.
        protocol: String,
        /// Lifecycle stage that failed.
        stage: &'static str,
        /// Underlying adapter error.
        #[source]
        source: anyhow::Error,
    },

    /// The supplied configuration cannot be run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A generator, worker or collector task panicked or was aborted.
    #[error("{task} task failed")]
    Task {
        /// Which task failed.
        task: &'static str,
        /// The join error.
        #[source]
        source: tokio::task::JoinError,
    },

    /// Failed to write a report.
    #[error("failed to write report")]
    Report(#[from] io::Error),
}

/// Errors returned by [`RetryExecutor::execute`](crate::resilience::RetryExecutor::execute).
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The circuit breaker refused the attempt.
    #[error("circuit breaker is {state}")]
    CircuitOpen {
        /// Breaker state at the time of the refusal.
        state: CircuitState,
        /// Attempts made before the breaker refused further ones.
        attempts: u32,
        /// The error of the last attempt that reached the operation, with its classification.
        last: Option<(anyhow::Error, ErrorInfo)>,
    },

    /// The run was cancelled before or during the attempt.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation failed and will not be retried.
    #[error("operation failed after {attempts} attempt(s): {source:#}")]
    Failed {
        /// The last error returned by the operation.
        source: anyhow::Error,
        /// Classification of the last error.
        info: ErrorInfo,
        /// Number of attempts made, including the first one.
        attempts: u32,
    },
}

impl ExecuteError {
    /// Classification of the failure, when one was made.
    pub fn info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Failed { info, .. } | Self::CircuitOpen { last: Some((_, info)), .. } => Some(info),
            _ => None,
        }
    }

    /// Number of attempts that reached the wrapped operation.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Failed { attempts, .. } | Self::CircuitOpen { attempts, .. } => *attempts,
            Self::Cancelled => 0,
        }
    }
}
