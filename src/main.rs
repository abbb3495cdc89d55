use clap::Parser;
use pgreindex::config::{split_schemas, ConfigError, RawSettings, ReindexConfig};
use pgreindex::db::Backend;
use pgreindex::logging::init_logging;
use pgreindex::reindexer::{ReindexError, Reindexer, RunOutcome, EXIT_FAILURE};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Selective PostgreSQL reindexer - rebuilds hot, large indexes (or their tables)
/// chosen from live usage statistics
#[derive(Parser, Debug)]
#[command(name = "pgreindex")]
#[command(version)]
#[command(about = "Rebuild frequently scanned PostgreSQL indexes with minimal locking")]
#[command(
    after_help = "Every option can also be set through the environment variable shown, \
                  a .env file in the working directory, or a YAML file passed with --config. \
                  Flags take precedence over the environment, which takes precedence over the file.\n\n\
                  Exit codes: 0 success (including no candidates), 1 usage, configuration or \
                  execution failure, 2 --concurrently true on a server older than PostgreSQL 12, \
                  3 invalid --scope."
)]
struct Cli {
    /// Database host (ignored with --container)
    #[arg(long = "host", env = "POSTGRES_HOST")]
    host: Option<String>,

    /// Database port (ignored with --container)
    #[arg(long = "port", env = "POSTGRES_PORT")]
    port: Option<String>,

    /// Username
    #[arg(long = "user", env = "POSTGRES_USER")]
    user: Option<String>,

    /// Database name
    #[arg(long = "db", env = "POSTGRES_DB")]
    database: Option<String>,

    /// Password; prefer the POSTGRES_PASSWORD environment variable
    #[arg(long = "password", env = "POSTGRES_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Reach the database by running psql inside this container
    #[arg(long = "container", env = "PG_CONTAINER")]
    container: Option<String>,

    /// Comma-separated schemas to consider [default: public]
    #[arg(long = "schemas", env = "REINDEX_SCHEMAS")]
    schemas: Option<String>,

    /// Minimum idx_scan count (inclusive) [default: 100]
    #[arg(long = "min-idx-scans", env = "MIN_IDX_SCANS")]
    min_idx_scans: Option<String>,

    /// Minimum table size in MB (inclusive) [default: 10]
    #[arg(long = "min-table-size-mb", env = "MIN_TABLE_SIZE_MB")]
    min_table_size_mb: Option<String>,

    /// Minimum index size in MB (inclusive) [default: 1]
    #[arg(long = "min-index-size-mb", env = "MIN_INDEX_SIZE_MB")]
    min_index_size_mb: Option<String>,

    /// Rebuild individual indexes or their whole tables: index|table [default: index]
    #[arg(long = "scope", env = "REINDEX_SCOPE")]
    scope: Option<String>,

    /// Use REINDEX ... CONCURRENTLY (PostgreSQL 12+): true|false [default: true]
    #[arg(long = "concurrently", env = "REINDEX_CONCURRENTLY")]
    concurrently: Option<String>,

    /// Only log the statements that would run: true|false [default: false]
    #[arg(long = "dry-run", env = "REINDEX_DRY_RUN")]
    dry_run: Option<String>,

    /// File every run appends its log to [default: reindex.log]
    #[arg(long = "log-file", env = "REINDEX_LOG_FILE")]
    log_file: Option<String>,

    /// YAML file with settings below the environment in precedence
    #[arg(short = 'c', long = "config", env = "REINDEX_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Flag and environment layer
    fn settings(&self) -> RawSettings {
        RawSettings {
            host: self.host.clone(),
            port: self.port.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            container: self.container.clone(),
            schemas: self.schemas.as_deref().map(split_schemas),
            min_idx_scans: self.min_idx_scans.clone(),
            min_table_size_mb: self.min_table_size_mb.clone(),
            min_index_size_mb: self.min_index_size_mb.clone(),
            scope: self.scope.clone(),
            concurrently: self.concurrently.clone(),
            dry_run: self.dry_run.clone(),
            log_file: self.log_file.clone(),
        }
    }

    /// Log file location and the validated configuration
    fn resolve(&self) -> (PathBuf, Result<ReindexConfig, ConfigError>) {
        let flags = self.settings();
        let file = match self.config.as_deref() {
            Some(path) => match RawSettings::from_config_file(path) {
                Ok(file) => file,
                Err(err) => return (flags.log_file_path(), Err(err)),
            },
            None => RawSettings::default(),
        };

        let raw = flags.over(file);
        (raw.log_file_path(), ReindexConfig::from_raw(raw))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Validated before the log file is opened; a config error's exit code wins.
    let (log_file, config) = cli.resolve();
    let _guard = match init_logging(&log_file, cli.verbose) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: {err}");
            return match config {
                Ok(_) => ExitCode::from(EXIT_FAILURE),
                Err(source) => {
                    let err = ReindexError::Config { source };
                    eprintln!("error: {err}");
                    ExitCode::from(err.exit_code())
                }
            };
        }
    };

    let config = match config {
        Ok(config) => config,
        Err(source) => {
            let err = ReindexError::Config { source };
            error!("error: {err}");
            error!("run with --help for usage");
            return ExitCode::from(err.exit_code());
        }
    };

    info!(
        "Starting reindex: scope={} concurrently={} dry_run={} schemas={}",
        config.scope,
        config.concurrently,
        config.dry_run,
        config.filters.schemas.join(",")
    );

    let backend = Backend::from_config(&config.connection);
    info!("Target database: {}", backend.describe());

    let reindexer = Reindexer::new(config, backend);
    match reindexer.run().await {
        Ok(outcome) => {
            match outcome {
                RunOutcome::NothingToDo => info!("Run complete: no candidates"),
                RunOutcome::DryRun { statements } => {
                    info!("Run complete (dry run): {} statement(s) planned", statements.len())
                }
                RunOutcome::Executed { statements } => {
                    info!("Run complete: {} statement(s) executed", statements.len())
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
