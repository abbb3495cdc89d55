use crate::config::{ConfigError, ReindexConfig};
use crate::db::{Database, DbError};
use crate::models::Candidate;
use crate::logging::PLAN_TARGET;
use crate::planner::{self, MIN_CONCURRENT_VERSION};
use crate::reporter;
use snafu::{ensure, ResultExt, Snafu};
use std::time::Instant;
use tracing::{info, warn};

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_PRECONDITION: u8 = 2;
pub const EXIT_INVALID_SCOPE: u8 = 3;

#[derive(Debug, Snafu)]
pub enum ReindexError {
    #[snafu(display("Invalid configuration: {}", source))]
    Config { source: ConfigError },

    #[snafu(display(
        "Server version {} does not support REINDEX CONCURRENTLY (needs {} or newer); \
         rerun with --concurrently false",
        version,
        required
    ))]
    UnsupportedServer { version: i32, required: i32 },

    #[snafu(display("Failed to select reindex candidates: {}", source))]
    SelectCandidates { source: DbError },

    #[snafu(display("Failed to execute `{}`: {}", statement, source))]
    Execute { statement: String, source: DbError },
}

impl ReindexError {
    /// Process exit status for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            ReindexError::UnsupportedServer { .. } => EXIT_PRECONDITION,
            ReindexError::Config {
                source: ConfigError::InvalidScope { .. },
            } => EXIT_INVALID_SCOPE,
            _ => EXIT_FAILURE,
        }
    }
}

type Result<T, E = ReindexError> = std::result::Result<T, E>;

/// How a successful run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No index met the filters; nothing was touched
    NothingToDo,
    /// Statements were only logged
    DryRun { statements: Vec<String> },
    /// Every statement ran to completion, in order
    Executed { statements: Vec<String> },
}

/// Fails when lock-minimizing rebuilds are requested from a server that is too
/// old or whose version could not be read (`0`).
pub fn check_capability(concurrently: bool, version: i32) -> Result<()> {
    ensure!(
        !concurrently || planner::supports_concurrent_reindex(version),
        UnsupportedServerSnafu {
            version,
            required: MIN_CONCURRENT_VERSION,
        }
    );
    Ok(())
}

pub struct Reindexer<D> {
    config: ReindexConfig,
    db: D,
}

impl<D: Database> Reindexer<D> {
    pub fn new(config: ReindexConfig, db: D) -> Self {
        Self { config, db }
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    /// Read the server version, gate, select, preview, then either report or execute.
    ///
    /// Execution stops at the first failing statement; statements that already
    /// finished stay applied.
    pub async fn run(&self) -> Result<RunOutcome> {
        let version = self.server_version().await;
        check_capability(self.config.concurrently, version)?;

        let candidates = self.select().await?;
        if candidates.is_empty() {
            info!("Found zero candidates matching the filters; nothing to reindex");
            return Ok(RunOutcome::NothingToDo);
        }

        info!(
            "Found {} candidate index(es) in schema(s) {}",
            candidates.len(),
            self.config.filters.schemas.join(",")
        );
        for line in reporter::preview_table(&candidates).lines() {
            info!("{}", line);
        }

        let statements =
            planner::synthesize(&candidates, self.config.scope, self.config.concurrently);

        if self.config.dry_run {
            info!(
                target: PLAN_TARGET,
                "Dry run: {} statement(s) would be executed (scope={}, concurrently={})",
                statements.len(),
                self.config.scope,
                self.config.concurrently
            );
            for statement in &statements {
                info!(target: PLAN_TARGET, "[dry-run] {}", statement);
            }
            return Ok(RunOutcome::DryRun { statements });
        }

        self.execute_all(&statements).await?;
        info!("Reindex finished: {} statement(s) executed", statements.len());
        Ok(RunOutcome::Executed { statements })
    }

    /// Server version, or `0` when it cannot be read
    async fn server_version(&self) -> i32 {
        match self.db.server_version_num().await {
            Ok(version) => {
                info!("Server version: {}", version);
                version
            }
            Err(err) => {
                warn!("Could not read server version, treating it as unknown: {err}");
                0
            }
        }
    }

    /// Reads the usage catalog once and applies the filters. The same list
    /// feeds both the preview and statement synthesis, so what was shown is
    /// exactly what runs.
    async fn select(&self) -> Result<Vec<Candidate>> {
        let filters = &self.config.filters;
        info!(
            "Selecting indexes with idx_scan >= {}, table size >= {}, index size >= {}",
            filters.min_idx_scans,
            reporter::format_bytes(filters.min_table_bytes),
            reporter::format_bytes(filters.min_index_bytes)
        );

        let rows = self
            .db
            .index_usage()
            .await
            .context(SelectCandidatesSnafu)?;
        Ok(planner::select_candidates(rows, filters))
    }

    async fn execute_all(&self, statements: &[String]) -> Result<()> {
        let total = statements.len();
        for (position, statement) in statements.iter().enumerate() {
            info!("executing ({}/{}): {}", position + 1, total, statement);
            let started = Instant::now();

            self.db
                .execute(statement)
                .await
                .context(ExecuteSnafu { statement })?;

            info!(
                "done ({}/{}) in {:.1}s: {}",
                position + 1,
                total,
                started.elapsed().as_secs_f64(),
                statement
            );
        }
        Ok(())
    }
}
