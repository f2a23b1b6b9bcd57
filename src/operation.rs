//! Work descriptors flowing through the engine and the results adapters return.
use std::{collections::BTreeMap, fmt, time::Duration};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Declared metadata keys an operation or its result may carry.
///
/// The set is closed on purpose: adapters annotate results with these keys and
/// the metrics aggregator folds them into per-key protocol statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MetaKey {
    /// Protocol status code (HTTP status, RPC code, ...).
    StatusCode,
    /// Request method or command name.
    Method,
    /// Message broker topic or channel.
    Topic,
    /// Message broker partition.
    Partition,
    /// Bytes written to the backend.
    BytesSent,
    /// Bytes read from the backend.
    BytesReceived,
    /// Time spent establishing a connection.
    ConnectTime,
    /// Time until the first response byte arrived.
    FirstByteTime,
    /// Time spent waiting in a client-side queue or pool.
    QueueTime,
    /// Number of messages produced or consumed by the operation.
    MessageCount,
    /// Classified error type of a failed operation.
    ErrorType,
    /// Severity of a failed operation.
    ErrorSeverity,
    /// Whether the failure was classified as retryable.
    Retryable,
    /// Whether the failure was classified as recoverable.
    Recoverable,
    /// Circuit breaker state observed when the operation finished.
    CircuitState,
    /// Number of attempts made by the retry executor.
    Attempts,
}

/// A typed metadata value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// A flag.
    Bool(bool),
    /// An integer quantity.
    Int(i64),
    /// A floating point quantity.
    Float(f64),
    /// A free-form label.
    Text(String),
    /// A duration, folded into statistics as milliseconds.
    Duration(#[serde(serialize_with = "serialize_millis")] Duration),
}

impl MetaValue {
    /// Returns the value as a number if it is numeric. Durations are in milliseconds.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Duration(d) => Some(d.as_secs_f64() * 1000.0),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Duration(d) => write!(f, "{}", humantime::format_duration(*d)),
        }
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for MetaValue {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Duration> for MetaValue {
    fn from(v: Duration) -> Self {
        Self::Duration(v)
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// Metadata attached to operations and results.
pub type Metadata = BTreeMap<MetaKey, MetaValue>;

/// An immutable description of one unit of backend work.
#[derive(Clone, Debug, Default)]
pub struct Operation {
    /// Operation type understood by the adapter, e.g. `get`, `set`, `publish`.
    pub op_type: String,
    /// The key, path or topic the operation targets.
    pub key: String,
    /// Payload to write, if any.
    pub value: Option<Vec<u8>>,
    /// Adapter-specific parameters.
    pub params: BTreeMap<String, String>,
    /// Time-to-live for written values.
    pub ttl: Option<Duration>,
    /// Whether the operation reads from the backend. Failures the engine
    /// records on the adapter's behalf are counted as reads or writes by it.
    pub is_read: bool,
    /// Declared metadata.
    pub metadata: Metadata,
}

impl Operation {
    /// Creates an operation of the given type targeting `key`.
    pub fn new(op_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self { op_type: op_type.into(), key: key.into(), ..Default::default() }
    }

    /// Marks the operation as a read.
    pub fn read(mut self) -> Self {
        self.is_read = true;
        self
    }

    /// Sets the payload.
    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Adds an adapter-specific parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Sets the time-to-live.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Adds a metadata entry.
    pub fn with_meta(mut self, key: MetaKey, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key, value.into());
        self
    }
}

/// Execution context handed to the adapter together with an operation.
#[derive(Clone, Debug)]
pub struct JobContext {
    /// Id of the job being executed.
    pub job_id: u64,
    /// Advisory per-operation timeout. The engine does not enforce it.
    pub timeout: Option<Duration>,
    /// Run-scoped cancellation token.
    pub cancel: CancellationToken,
}

/// An operation wrapped with its id and execution context.
#[derive(Clone, Debug)]
pub struct Job {
    /// Sequential job id, starting at 0.
    pub id: u64,
    /// The work to perform.
    pub operation: Operation,
    /// Context forwarded to the adapter.
    pub context: JobContext,
}

/// The outcome of executing one operation.
#[derive(Clone, Debug, Default)]
pub struct OperationResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Measured latency.
    pub duration: Duration,
    /// Whether the operation was a read (otherwise a write).
    pub is_read: bool,
    /// Error message of a failed operation.
    pub error: Option<String>,
    /// Value returned by a read.
    pub value: Option<Vec<u8>>,
    /// Declared metadata.
    pub metadata: Metadata,
}

impl OperationResult {
    /// Creates a successful result.
    pub fn success(duration: Duration, is_read: bool) -> Self {
        Self { success: true, duration, is_read, ..Default::default() }
    }

    /// Creates a failed result carrying `error`.
    pub fn failure(duration: Duration, is_read: bool, error: impl Into<String>) -> Self {
        Self { success: false, duration, is_read, error: Some(error.into()), ..Default::default() }
    }

    /// Sets the returned value.
    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Adds a metadata entry.
    pub fn with_meta(mut self, key: MetaKey, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key, value.into());
        self
    }
}
