//! sheetpress CLI: batch conversion of spreadsheet job sheets to PDF.
//!
//! Discovers job workbooks in the configured input folder, converts each to
//! a fixed-layout PDF through the external office application, and records
//! failed jobs in a durable ledger so `sheetpress fail` can retry exactly
//! the failures of a prior run.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use snafu::ResultExt;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use sheetpress::error::{AddressParseSnafu, MetricsSnafu};
use sheetpress::{Config, RunMode, run_pipeline};

/// Spreadsheet-to-PDF batch conversion tool.
#[derive(Parser, Debug)]
#[command(name = "sheetpress")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run mode: `success` processes every discovered job, `fail` retries
    /// only the jobs recorded in the failure ledger.
    #[arg(value_enum, default_value = "success")]
    mode: Mode,

    /// Path to the configuration file.
    #[arg(short, long, default_value = "setting.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Process every discovered job.
    Success,
    /// Retry only previously failed jobs.
    Fail,
}

impl From<Mode> for RunMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Success => RunMode::Full,
            Mode::Fail => RunMode::RetryFailed,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = init_tracing(&args.log_level);

    info!("sheetpress starting");

    let config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    if config.metrics.enabled {
        let result = config
            .metrics
            .address
            .parse()
            .context(AddressParseSnafu)
            .and_then(|addr| {
                sheetpress::metrics::init(addr).context(MetricsSnafu)
            });
        if let Err(e) = result {
            eprintln!("Failed to start metrics endpoint: {e}");
            return ExitCode::FAILURE;
        }
        info!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    match run_pipeline(config, args.mode.into()).await {
        Ok(stats) => {
            info!("Run completed");
            info!("  Jobs discovered: {}", stats.discovered);
            info!("  Jobs converted:  {}", stats.converted);
            info!("  Jobs skipped:    {}", stats.skipped + stats.filtered);
            info!("  Jobs failed:     {}", stats.failed);
            if stats.failed > 0 {
                warn!("Failed jobs were recorded; rerun with `sheetpress fail` to retry them");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Pipeline failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing with stdout and hourly-rolling file output.
///
/// The returned guard must stay alive for the duration of the process so
/// buffered log lines are flushed at exit.
fn init_tracing(log_level: &str) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // The appender writes into logs/ but does not create it.
    let _ = std::fs::create_dir_all("logs");
    let file_appender = tracing_appender::rolling::hourly("logs", "sheetpress.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    guard
}
