use std::{collections::BTreeMap, io::Write};

use serde::Serialize;

use super::BenchReporter;
use crate::{
    adapter::ProtocolMetrics,
    metrics::{KeyStats, LatencySummary},
    operation::MetaKey,
    report::BenchReport,
    resilience::CircuitState,
};

/// Writes the report as pretty-printed JSON.
pub struct JsonReporter;

impl BenchReporter for JsonReporter {
    fn print(&self, w: &mut dyn Write, report: &BenchReport) -> std::io::Result<()> {
        let execution = &report.execution;
        let metrics = &report.metrics;
        let summary = Summary {
            protocol: &report.protocol,
            workers: execution.workers,
            success_ratio: report.success_ratio(),
            error_rate: metrics.error_rate,
            total_time: execution.total_duration.as_secs_f64(),
            jobs: Jobs {
                total: execution.total_jobs,
                completed: execution.completed_jobs,
                success: execution.success_jobs,
                failed: execution.failed_jobs,
                reads: metrics.reads,
                writes: metrics.writes,
            },
            rate: Rate { throughput: metrics.throughput, rps: metrics.rps },
            circuit_state: report.circuit,
        };

        let json = Report {
            summary,
            latency: (metrics.total > 0).then_some(&metrics.latency),
            errors: &metrics.errors,
            protocol: &metrics.protocol,
            adapter: &report.adapter,
        };
        serde_json::to_writer_pretty(&mut *w, &json)?;
        writeln!(w)
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    protocol: &'a str,
    workers: u32,
    success_ratio: f64,
    error_rate: f64,
    total_time: f64,
    jobs: Jobs,
    rate: Rate,
    circuit_state: CircuitState,
}

#[derive(Serialize)]
struct Jobs {
    total: u64,
    completed: u64,
    success: u64,
    failed: u64,
    reads: u64,
    writes: u64,
}

#[derive(Serialize)]
struct Rate {
    throughput: f64,
    rps: f64,
}

#[derive(Serialize)]
struct Report<'a> {
    summary: Summary<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency: Option<&'a LatencySummary>,
    errors: &'a BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "is_empty")]
    protocol: &'a BTreeMap<MetaKey, KeyStats>,
    #[serde(skip_serializing_if = "is_empty")]
    adapter: &'a ProtocolMetrics,
}

fn is_empty<K, V>(map: &&BTreeMap<K, V>) -> bool {
    map.is_empty()
}
