//! Command line flags and the end-to-end runner behind them.
//!
//! A protocol binary embeds [`BenchCli`] into its own clap struct and hands
//! an adapter and an operation factory to [`run`].
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use stampede::cli::BenchCli;
//!
//! #[derive(Parser, Clone)]
//! pub struct Opts {
//!     /// Backend address.
//!     pub addr: String,
//!
//!     #[command(flatten)]
//!     pub bench: BenchCli,
//! }
//! ```
//!
//! ```shell
//! $ mybench --help
//! Usage: mybench [OPTIONS] <ADDR>
//!
//! Options:
//!   -n, --total <TOTAL>                    Number of jobs to generate [default: 1]
//!   -c, --parallels <PARALLELS>            Number of concurrent workers [default: 1]
//!   -d, --duration <DURATION>              Stop generating jobs after this long
//!       --ramp-up <RAMP_UP>                Spread job generation evenly over this period
//!       --timeout <TIMEOUT>                Per-job timeout handed to the adapter
//!       --max-retries <MAX_RETRIES>        Retries after the first attempt [default: 3]
//!       --worker-ceiling <WORKER_CEILING>  Upper bound on concurrent workers [default: 1000]
//!       --no-health-check                  Skip the adapter health check
//!   -q, --quiet                            Do not print the report to stdout
//!   -o, --output <OUTPUT>                  Output format for the report [default: text]
//!   -O, --output-file <OUTPUT_FILE>        Write the report to a file
//! ```
use std::{fs::File, io, path::PathBuf, sync::Arc};

use clap::{
    Parser, ValueEnum,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use tokio_util::sync::CancellationToken;

use crate::{
    adapter::{OperationFactory, ProtocolAdapter},
    config::{BenchOpts, DEFAULT_WORKER_CEILING, EngineOpts},
    engine::Engine,
    error::Result,
    report::BenchReport,
    reporter::{BenchReporter, JsonReporter, TextReporter},
};

#[derive(Parser, Clone, Debug)]
#[clap(
    styles(Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
    )
)]
#[allow(missing_docs)]
pub struct BenchCli {
    /// Number of jobs to generate
    #[clap(long, short = 'n', default_value_t = 1)]
    pub total: u64,

    /// Number of concurrent workers
    ///
    /// Clamped to at least one and at most --worker-ceiling.
    #[clap(long, short = 'c', default_value_t = 1)]
    pub parallels: u32,

    /// Stop generating jobs after this long
    ///
    /// Examples: -d 10s, -d 5m, -d 1h
    #[clap(long, short = 'd')]
    pub duration: Option<humantime::Duration>,

    /// Spread job generation evenly over this period
    #[clap(long)]
    pub ramp_up: Option<humantime::Duration>,

    /// Per-job timeout handed to the adapter
    #[clap(long)]
    pub timeout: Option<humantime::Duration>,

    /// Retries after the first attempt
    #[clap(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Upper bound on concurrent workers
    #[clap(long, default_value_t = DEFAULT_WORKER_CEILING)]
    pub worker_ceiling: u32,

    /// Skip the adapter health check
    #[clap(long)]
    pub no_health_check: bool,

    /// Do not print the report to stdout
    ///
    /// The report is still written when --output-file is set.
    #[clap(long, short = 'q')]
    pub quiet: bool,

    /// Output format for the report
    #[clap(short, long, value_enum, default_value_t = ReportFormat::Text, ignore_case = true)]
    pub output: ReportFormat,

    /// Output file path for the report
    ///
    /// When set, the report will be written to the specified file instead of stdout.
    #[clap(long, short = 'O')]
    pub output_file: Option<PathBuf>,
}

impl BenchCli {
    /// The per-run parameters.
    pub fn bench_opts(&self) -> BenchOpts {
        BenchOpts {
            total: self.total,
            parallels: self.parallels,
            duration: self.duration.map(Into::into),
            timeout: self.timeout.map(Into::into),
            ramp_up: self.ramp_up.map(Into::into),
        }
    }

    /// Engine options: defaults overridden by the flags.
    pub fn engine_opts(&self) -> EngineOpts {
        let mut opts = EngineOpts { worker_ceiling: self.worker_ceiling, health_check: !self.no_health_check, ..Default::default() };
        opts.retry.max_retries = self.max_retries;
        opts
    }

    /// The reporter matching `--output`.
    pub fn reporter(&self) -> &'static dyn BenchReporter {
        match self.output {
            ReportFormat::Text => &TextReporter,
            ReportFormat::Json => &JsonReporter,
        }
    }

    /// Write `report` wherever the flags say.
    pub fn write_report(&self, report: &BenchReport) -> Result<()> {
        let reporter = self.reporter();
        match &self.output_file {
            Some(path) => reporter.print(&mut File::create(path)?, report)?,
            None if self.quiet => (),
            None => reporter.print(&mut io::stdout().lock(), report)?,
        }
        Ok(())
    }
}

/// Benchmark report format.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Report in plain text format. See [`TextReporter`].
    Text,

    /// Report in JSON format. See [`JsonReporter`].
    Json,
}

/// Connects `adapter`, runs the benchmark described by `cli` and writes the report.
///
/// `Ctrl-C` cancels the run; whatever completed is still reported. The
/// adapter is closed even when the run fails.
pub async fn run<A, F>(cli: &BenchCli, adapter: A, adapter_config: &A::Config, factory: F) -> Result<BenchReport>
where
    A: ProtocolAdapter + 'static,
    F: OperationFactory + 'static,
{
    let engine = Engine::new(Arc::new(adapter), Arc::new(factory), cli.engine_opts());
    let cancel = CancellationToken::new();

    let signal = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                #[cfg(feature = "tracing")]
                tracing::warn!("interrupted, cancelling the run");
                cancel.cancel();
            }
        }
    });

    let outcome = run_engine(&engine, &cancel, adapter_config, &cli.bench_opts()).await;
    signal.abort();

    let execution = outcome?;
    let report = engine.report(execution);
    cli.write_report(&report)?;
    Ok(report)
}

async fn run_engine<A, F>(
    engine: &Engine<A, F>,
    cancel: &CancellationToken,
    adapter_config: &A::Config,
    opts: &BenchOpts,
) -> Result<crate::engine::ExecutionResult>
where
    A: ProtocolAdapter + 'static,
    F: OperationFactory + ?Sized + 'static,
{
    engine.connect(cancel, adapter_config).await?;
    let outcome = engine.run_benchmark(cancel, opts).await;
    if let Err(_e) = engine.close().await {
        // teardown failures are logged, never returned
        #[cfg(feature = "tracing")]
        tracing::warn!(error = ?_e, "failed to close the adapter");
    }
    outcome
}
