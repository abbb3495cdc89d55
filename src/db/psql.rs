use super::{
    ClientFailedSnafu, Database, DbError, DecodeSnafu, SpawnSnafu, VersionParseSnafu,
    INDEX_USAGE_QUERY, SERVER_VERSION_QUERY,
};
use crate::config::ConnectionConfig;
use crate::models::IndexUsage;
use snafu::{ensure, ResultExt};
use std::process::{Command, Stdio};
use tracing::debug;

type Result<T, E = DbError> = std::result::Result<T, E>;

const DOCKER: &str = "docker";
const PASSWORD_ENV: &str = "PGPASSWORD";

/// Builds a command that runs a PostgreSQL client tool (`psql`, `pg_dump`)
/// against the configured database.
///
/// With a container the tool runs inside it through `docker exec` and talks to
/// the server over its local socket. The password is only ever placed in the
/// child's environment; `-e PGPASSWORD` without a value tells docker to copy
/// it from there, so it never shows up in an argument list.
pub fn client_command(config: &ConnectionConfig, program: &str) -> Command {
    let mut cmd = match &config.container {
        Some(container) => {
            let mut cmd = Command::new(DOCKER);
            cmd.arg("exec").arg("-i");
            if config.password.is_some() {
                cmd.arg("-e").arg(PASSWORD_ENV);
            }
            cmd.arg(container).arg(program);
            cmd
        }
        None => {
            let mut cmd = Command::new(program);
            cmd.arg("-h")
                .arg(&config.host)
                .arg("-p")
                .arg(config.port.to_string());
            cmd
        }
    };

    cmd.arg("-U").arg(&config.user).arg("-d").arg(&config.database);
    match &config.password {
        Some(password) => cmd.env(PASSWORD_ENV, password),
        None => cmd.env_remove(PASSWORD_ENV),
    };
    cmd
}

/// Reaches the database by running `psql` inside a container
pub struct PsqlProxy {
    config: ConnectionConfig,
    container: String,
}

impl PsqlProxy {
    pub fn new(config: ConnectionConfig, container: String) -> Self {
        Self { config, container }
    }

    pub fn describe(&self) -> String {
        format!("container {} (database {})", self.container, self.config.database)
    }

    fn psql_command(&self, sql: &str) -> Command {
        let mut cmd = client_command(&self.config, "psql");
        cmd.args(["-X", "-q", "-A", "-t", "-v", "ON_ERROR_STOP=1", "-c"])
            .arg(sql)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Runs one statement and returns psql's stdout
    async fn run(&self, sql: &str) -> Result<String> {
        let cmd = self.psql_command(sql);
        let program = format!("psql in {}", self.container);
        debug!("Running {}: {}", program, sql.trim());

        let output = tokio::process::Command::from(cmd)
            .output()
            .await
            .context(SpawnSnafu {
                program: program.clone(),
            })?;

        ensure!(
            output.status.success(),
            ClientFailedSnafu {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        );

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn index_usage_json_query() -> String {
    format!(
        "SELECT COALESCE(json_agg(u), '[]'::json) FROM ({}) u",
        INDEX_USAGE_QUERY.trim()
    )
}

fn parse_version(stdout: &str) -> Result<i32> {
    let value = stdout.trim();
    value
        .parse::<i32>()
        .map_err(|_| VersionParseSnafu { value }.build())
}

fn parse_index_usage(stdout: &str) -> Result<Vec<IndexUsage>> {
    serde_json::from_str(stdout.trim()).context(DecodeSnafu)
}

impl Database for PsqlProxy {
    async fn server_version_num(&self) -> Result<i32> {
        let stdout = self.run(SERVER_VERSION_QUERY).await?;
        parse_version(&stdout)
    }

    async fn index_usage(&self) -> Result<Vec<IndexUsage>> {
        let stdout = self.run(&index_usage_json_query()).await?;
        let usage = parse_index_usage(&stdout)?;
        debug!("Fetched {} index usage rows", usage.len());
        Ok(usage)
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        self.run(statement).await.map(|_| ())
    }
}
