use anyhow::Context;
use clap::Parser;
use pgreindex::backup::{prune_old_dumps, write_dump};
use pgreindex::config::ConnectionConfig;
use pgreindex::db::psql::client_command;
use pgreindex::logging::init_terminal_logging;
use std::path::PathBuf;
use tracing::info;

/// Dumps the document database to a dated, gzip-compressed file and prunes old dumps
#[derive(Parser, Debug)]
#[command(name = "pgbackup")]
#[command(version)]
#[command(about = "Compressed daily PostgreSQL dumps with retention")]
struct Cli {
    /// Database host (ignored with --container)
    #[arg(long = "host", env = "POSTGRES_HOST", default_value = "localhost")]
    host: String,

    /// Database port (ignored with --container)
    #[arg(long = "port", env = "POSTGRES_PORT", default_value = "5432")]
    port: u16,

    /// Username
    #[arg(long = "user", env = "POSTGRES_USER", default_value = "paperless")]
    user: String,

    /// Database name
    #[arg(long = "db", env = "POSTGRES_DB", default_value = "paperless")]
    database: String,

    /// Password; prefer the POSTGRES_PASSWORD environment variable
    #[arg(long = "password", env = "POSTGRES_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Run pg_dump inside this container instead of connecting directly
    #[arg(long = "container", env = "PG_CONTAINER")]
    container: Option<String>,

    /// Directory the dumps are written to
    #[arg(long = "backup-dir", env = "BACKUP_DIR", default_value = "backups")]
    backup_dir: PathBuf,

    /// Dumps dated more than this many days ago are deleted after a successful dump
    #[arg(long = "retention-days", env = "BACKUP_RETENTION_DAYS", default_value = "30")]
    retention_days: u32,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_terminal_logging(cli.verbose);

    let connection = ConnectionConfig {
        host: cli.host,
        port: cli.port,
        user: cli.user,
        password: cli.password.filter(|p| !p.is_empty()),
        database: cli.database,
        container: cli.container.filter(|c| !c.trim().is_empty()),
    };
    let today = chrono::Local::now().date_naive();

    info!("Dumping database {} to {}", connection.database, cli.backup_dir.display());
    let path = write_dump(
        client_command(&connection, "pg_dump"),
        &cli.backup_dir,
        &connection.database,
        today,
    )
    .context("backup failed")?;
    info!("Backup complete: {}", path.display());

    let removed = prune_old_dumps(
        &cli.backup_dir,
        &connection.database,
        today,
        cli.retention_days,
    )
    .context("pruning old backups failed")?;
    info!(
        "Removed {} dump(s) older than {} days",
        removed.len(),
        cli.retention_days
    );

    Ok(())
}
