//! Per-key statistics folded from result metadata.
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::samples::{PERCENTAGES, SampleBuffer, percentile};
use crate::operation::{MetaKey, MetaValue, Metadata};

/// Running statistics for one numeric metadata key.
#[derive(Clone, Debug)]
struct NumericStats {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    samples: SampleBuffer<f64>,
}

impl NumericStats {
    fn new(cap: usize) -> Self {
        Self { count: 0, sum: 0.0, min: f64::INFINITY, max: f64::NEG_INFINITY, samples: SampleBuffer::new(cap) }
    }

    fn record(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.samples.push(v);
    }

    fn summary(&self) -> NumericSummary {
        let sorted = self.samples.sorted();
        let [p50, _, p95, p99] = PERCENTAGES.map(|p| percentile(&sorted, p).unwrap_or_default());
        NumericSummary {
            count: self.count,
            avg: if self.count == 0 { 0.0 } else { self.sum / self.count as f64 },
            min: if self.count == 0 { 0.0 } else { self.min },
            max: if self.count == 0 { 0.0 } else { self.max },
            p50,
            p95,
            p99,
        }
    }
}

/// Summary of a numeric metadata key. Durations are in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NumericSummary {
    /// Number of values recorded.
    pub count: u64,
    /// Mean over every recorded value.
    pub avg: f64,
    /// Smallest recorded value.
    pub min: f64,
    /// Largest recorded value.
    pub max: f64,
    /// Median of the retained samples.
    pub p50: f64,
    /// 95th percentile of the retained samples.
    pub p95: f64,
    /// 99th percentile of the retained samples.
    pub p99: f64,
}

/// Snapshot of everything recorded under one metadata key.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct KeyStats {
    /// Statistics over numeric values, if any were recorded.
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericSummary>,
    /// Occurrence counts of label values (text and flags).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, u64>,
}

/// Protocol-specific sub-stats keyed by [`MetaKey`].
#[derive(Clone, Debug)]
pub struct ProtocolStats {
    cap: usize,
    numeric: HashMap<MetaKey, NumericStats>,
    labels: HashMap<MetaKey, HashMap<String, u64>>,
}

impl ProtocolStats {
    /// Creates empty stats retaining at most `cap` samples per numeric key.
    pub fn new(cap: usize) -> Self {
        Self { cap, numeric: HashMap::new(), labels: HashMap::new() }
    }

    /// Folds every entry of `metadata` into the per-key stats.
    pub fn record(&mut self, metadata: &Metadata) {
        for (&key, value) in metadata {
            match value.as_f64() {
                Some(v) if v.is_finite() => {
                    let cap = self.cap;
                    self.numeric.entry(key).or_insert_with(|| NumericStats::new(cap)).record(v);
                }
                Some(_) => {}
                None => {
                    let label = match value {
                        MetaValue::Text(s) => s.clone(),
                        other => other.to_string(),
                    };
                    *self.labels.entry(key).or_default().entry(label).or_default() += 1;
                }
            }
        }
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.numeric.is_empty() && self.labels.is_empty()
    }

    /// Drops everything recorded so far.
    pub fn clear(&mut self) {
        self.numeric.clear();
        self.labels.clear();
    }

    /// A deep copy of the current stats.
    pub fn snapshot(&self) -> BTreeMap<MetaKey, KeyStats> {
        let mut out: BTreeMap<MetaKey, KeyStats> = BTreeMap::new();
        for (&key, stats) in &self.numeric {
            out.entry(key).or_default().numeric = Some(stats.summary());
        }
        for (&key, labels) in &self.labels {
            out.entry(key).or_default().labels = labels.iter().map(|(k, &v)| (k.clone(), v)).collect();
        }
        out
    }
}
