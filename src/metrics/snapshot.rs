use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{protocol::KeyStats, samples::PERCENTAGES};
use crate::operation::MetaKey;

/// Latency statistics of a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    /// Mean over every recorded operation.
    #[serde(serialize_with = "secs")]
    pub avg: Duration,
    /// Fastest recorded operation.
    #[serde(serialize_with = "secs")]
    pub min: Duration,
    /// Slowest recorded operation.
    #[serde(serialize_with = "secs")]
    pub max: Duration,
    /// Median of the retained samples.
    #[serde(serialize_with = "secs")]
    pub p50: Duration,
    /// 90th percentile of the retained samples.
    #[serde(serialize_with = "secs")]
    pub p90: Duration,
    /// 95th percentile of the retained samples.
    #[serde(serialize_with = "secs")]
    pub p95: Duration,
    /// 99th percentile of the retained samples.
    #[serde(serialize_with = "secs")]
    pub p99: Duration,
}

impl LatencySummary {
    /// The `(percentage, latency)` pairs of this summary.
    pub fn percentiles(&self) -> [(f64, Duration); 4] {
        let [p50, p90, p95, p99] = PERCENTAGES;
        [(p50, self.p50), (p90, self.p90), (p95, self.p95), (p99, self.p99)]
    }
}

/// An immutable copy of the aggregated metrics at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Operations recorded.
    pub total: u64,
    /// Successful operations.
    pub success: u64,
    /// Failed operations.
    pub failed: u64,
    /// Read operations.
    pub reads: u64,
    /// Write operations.
    pub writes: u64,
    /// Latency statistics.
    pub latency: LatencySummary,
    /// Failed operations as a percentage of all operations.
    pub error_rate: f64,
    /// Operations per second over the sliding window.
    pub rps: f64,
    /// Operations per second over the whole run.
    pub throughput: f64,
    /// When recording started.
    pub start_time: DateTime<Utc>,
    /// When recording finished, or the snapshot time if still running.
    pub end_time: DateTime<Utc>,
    /// Time between start and end.
    #[serde(serialize_with = "secs")]
    pub duration: Duration,
    /// Error message distribution.
    pub errors: BTreeMap<String, u64>,
    /// Protocol-specific sub-stats.
    pub protocol: BTreeMap<MetaKey, KeyStats>,
}

impl MetricsSnapshot {
    /// Fraction of successful operations, between 0 and 1.
    pub fn success_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 / self.total as f64
    }
}

fn secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
