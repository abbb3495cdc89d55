//! Logging setup: every line goes to the terminal and is appended to a log file.

use snafu::{ResultExt, Snafu};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Snafu)]
pub enum LoggingError {
    #[snafu(display("Failed to open log file {}: {}", path.display(), source))]
    OpenLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Maps `-v` occurrences to a filter directive
pub fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Target for the statement listing of a dry run, kept at `info` whatever
/// `RUST_LOG` says
pub const PLAN_TARGET: &str = "pgreindex::plan";

/// `RUST_LOG` when set, otherwise the verbosity level, plus the plan pin
fn filter_directives(verbose: u8, from_env: Option<String>) -> String {
    let base = from_env
        .filter(|directives| !directives.trim().is_empty())
        .unwrap_or_else(|| format!("{},sqlx=warn", level_for(verbose)));
    format!("{base},{PLAN_TARGET}=info")
}

fn env_filter(verbose: u8) -> EnvFilter {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    EnvFilter::new(filter_directives(verbose, from_env))
}

/// Installs the global subscriber. Keep the returned guard alive until exit,
/// dropping it flushes buffered file output.
pub fn init_logging(log_file: &Path, verbose: u8) -> Result<WorkerGuard, LoggingError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .context(OpenLogFileSnafu { path: log_file })?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let terminal_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(terminal_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Terminal-only logging for tools without a log file
pub fn init_terminal_logging(verbose: u8) {
    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(fmt::layer().with_target(false))
        .init();
}
