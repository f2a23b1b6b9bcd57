use std::{cmp::Reverse, io::Write};

use crossterm::style::{StyledContent, Stylize};
use itertools::Itertools;
use tabled::{
    builder::Builder,
    settings::{
        Alignment, Color, Margin, Padding, Style,
        object::{Cell, Columns, FirstColumn, Object, Rows},
        themes::Colorization,
    },
};

use crate::{
    adapter::ProtocolMetrics,
    duration::TimeUnit,
    metrics::{KeyStats, LatencySummary},
    operation::MetaKey,
    report::BenchReport,
    resilience::CircuitState,
};

type Result = std::io::Result<()>;

/// Writes the report as styled terminal text.
pub struct TextReporter;

impl super::BenchReporter for TextReporter {
    fn print(&self, w: &mut dyn Write, report: &BenchReport) -> Result {
        print_summary(w, report)?;
        writeln!(w)?;

        if report.metrics.total > 0 {
            print_latency(w, &report.metrics.latency)?;
            writeln!(w)?;
        }

        let protocol = &report.metrics.protocol;
        if !protocol.is_empty() {
            print_protocol(w, protocol.iter())?;
            writeln!(w)?;
        }

        if !report.adapter.is_empty() {
            print_adapter(w, &report.adapter)?;
            writeln!(w)?;
        }

        print_error(w, report)
    }
}

fn render_success_ratio(success_rate: f64) -> StyledContent<String> {
    let text = format!("{success_rate:.2}%");
    if success_rate >= 100.0 {
        text.green().bold()
    } else if success_rate >= 99.0 {
        text.yellow().bold()
    } else {
        text.red().bold()
    }
}

fn render_circuit(state: CircuitState) -> StyledContent<String> {
    let text = state.to_string();
    match state {
        CircuitState::Closed => text.green().bold(),
        CircuitState::HalfOpen => text.yellow().bold(),
        CircuitState::Open => text.red().bold(),
    }
}

#[rustfmt::skip]
fn print_summary(w: &mut dyn Write, report: &BenchReport) -> Result {
    let execution = &report.execution;
    let metrics = &report.metrics;

    writeln!(w, "{}", "Summary".h1())?;
    writeln!(w,       "  Protocol:      {}", report.protocol.as_str().green().bold())?;
    writeln!(w,       "  Time:          {}", format!("{:.2}s", execution.total_duration.as_secs_f64()).green().bold())?;
    writeln!(w,       "  Workers:       {}", execution.workers.to_string().green().bold())?;
    writeln!(w,       "  Success ratio: {}", render_success_ratio(100.0 * report.success_ratio()))?;
    writeln!(w,       "  Circuit:       {}", render_circuit(report.circuit))?;
    writeln!(w)?;

    let jobs = vec![
        vec!["".into(), "Total".into(), "Completed".into(), "Success".into(), "Failed".into(), "Reads".into(), "Writes".into()],
        vec![
            "Jobs".into(),
            execution.total_jobs.to_string(),
            execution.completed_jobs.to_string(),
            execution.success_jobs.to_string(),
            execution.failed_jobs.to_string(),
            metrics.reads.to_string(),
            metrics.writes.to_string(),
        ],
    ];
    let mut jobs = Builder::from(jobs).build();
    jobs
        .with(Style::empty())
        .with(Alignment::center())
        .with(Padding::new(2, 2, 0, 0))
        .with(Colorization::exact([Color::BOLD], Rows::new(0..=0)))
        .with(Colorization::exact([Color::FG_GREEN], Rows::new(1..=1).not(Columns::new(0..=0))))
        .with(Colorization::exact([Color::FG_RED], Cell::new(1, 4)));
    writeln!(w, "{jobs}")?;
    writeln!(w)?;

    writeln!(w,       "  Throughput:    {}", format!("{:.2}/s", metrics.throughput).green())?;
    writeln!(w,       "  Recent rate:   {}", format!("{:.2}/s", metrics.rps).green())?;
    writeln!(w,       "  Error rate:    {}", format!("{:.2}%", metrics.error_rate).green())?;
    if report.abandoned_jobs() > 0 {
        writeln!(w,   "  Abandoned:     {}", report.abandoned_jobs().to_string().yellow())?;
    }
    Ok(())
}

fn print_latency(w: &mut dyn Write, latency: &LatencySummary) -> Result {
    writeln!(w, "{}", "Latencies".h1())?;
    let u = TimeUnit::fit(latency.p50);

    let stats = vec![
        vec!["Avg".into(), "Min".into(), "Max".into()],
        vec![
            format!("{:.2}", u.show(latency.avg)),
            format!("{:.2}", u.show(latency.min)),
            format!("{:.2}", u.show(latency.max)),
        ],
    ];
    let mut stats = Builder::from(stats).build();
    stats
        .with(Style::empty())
        .with(Margin::new(1, 0, 0, 0))
        .with(Alignment::center())
        .with(Colorization::exact([Color::FG_GREEN], Rows::new(1..=1)))
        .with(Colorization::exact([Color::FG_BLUE], Cell::new(0, 0)))
        .with(Colorization::exact([Color::FG_CYAN], Cell::new(0, 1)))
        .with(Colorization::exact([Color::FG_RED], Cell::new(0, 2)));
    writeln!(w, "{stats}")?;
    writeln!(w)?;

    writeln!(w, "{}", "  Percentiles".h2())?;
    for (p, v) in latency.percentiles() {
        writeln!(w, "    {} in {}", format!("{p:.2}%").green(), format!("{:.2}", u.show(v)).green())?;
    }
    Ok(())
}

fn print_protocol<'a>(w: &mut dyn Write, stats: impl Iterator<Item = (&'a MetaKey, &'a KeyStats)>) -> Result {
    writeln!(w, "{}", "Protocol metrics".h1())?;

    let (numeric, labels): (Vec<_>, Vec<_>) = stats.partition(|(_, s)| s.numeric.is_some());

    if !numeric.is_empty() {
        let header = ["Key", "Count", "Avg", "Min", "Max", "P50", "P95", "P99"].map(String::from).to_vec();
        let rows = numeric.iter().filter_map(|(key, s)| {
            let n = s.numeric.as_ref()?;
            let cell = |v: f64| {
                if is_millis(key) {
                    format!("{:.2}", TimeUnit::fit_millis(v).show_millis(v))
                } else {
                    format!("{v:.2}")
                }
            };
            Some(vec![key.to_string(), n.count.to_string(), cell(n.avg), cell(n.min), cell(n.max), cell(n.p50), cell(n.p95), cell(n.p99)])
        });
        let mut table = Builder::from_iter(std::iter::once(header).chain(rows)).build();
        table
            .with(Style::empty())
            .with(Margin::new(1, 0, 0, 0))
            .with(Alignment::right())
            .with(Colorization::exact([Color::BOLD], Rows::new(0..=0)))
            .with(Colorization::exact([Color::FG_CYAN], FirstColumn))
            .with(Colorization::exact([Color::FG_GREEN], Rows::new(1..=numeric.len()).not(Columns::new(0..=0))))
            .modify(FirstColumn, Alignment::left());
        writeln!(w, "{table}")?;
    }

    for (key, s) in labels {
        writeln!(w, "{}", format!("  {key}").h2())?;
        let width = s.labels.values().max().map_or(1, |max| max.to_string().len());
        for (label, count) in s.labels.iter().sorted_unstable_by_key(|(_, cnt)| Reverse(**cnt)) {
            writeln!(w, "    [{}] {label}", format!("{count:>width$}").green())?;
        }
    }
    Ok(())
}

fn is_millis(key: &MetaKey) -> bool {
    matches!(key, MetaKey::ConnectTime | MetaKey::FirstByteTime | MetaKey::QueueTime)
}

fn print_adapter(w: &mut dyn Write, metrics: &ProtocolMetrics) -> Result {
    writeln!(w, "{}", "Adapter metrics".h1())?;
    let width = metrics.keys().map(String::len).max().unwrap_or_default();
    for (name, value) in metrics {
        writeln!(w, "  {name:<width$}  {}", value.to_string().green())?;
    }
    Ok(())
}

fn print_error(w: &mut dyn Write, report: &BenchReport) -> Result {
    let errors = report
        .metrics
        .errors
        .iter()
        .sorted_unstable_by_key(|(_, cnt)| Reverse(**cnt))
        .collect_vec();
    if let Some((_, max)) = errors.first() {
        let width = max.to_string().len();
        writeln!(w, "{}", "Error distribution".h1())?;
        for (error, count) in errors {
            writeln!(w, "{}", format!("  [{count:>width$}] {error}").red())?;
        }
    }
    Ok(())
}

trait ReportStyle {
    fn h1(&self) -> StyledContent<&str>;
    fn h2(&self) -> StyledContent<&str>;
}

impl<T: AsRef<str>> ReportStyle for T {
    fn h1(&self) -> StyledContent<&str> {
        self.as_ref().bold().underlined().yellow()
    }

    fn h2(&self) -> StyledContent<&str> {
        self.as_ref().bold().cyan()
    }
}
