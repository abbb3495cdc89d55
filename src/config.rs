use crate::models::{Scope, UnknownScope};
use itertools::Itertools;
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use std::fs;
use std::num::ParseIntError;
use std::path::PathBuf;

const BYTES_PER_MB: i64 = 1024 * 1024;

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read config file {}: {}", path, source))]
    FileRead {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse YAML config: {}", source))]
    YamlParse { source: serde_yaml::Error },

    #[snafu(display("Invalid --scope: {}", source))]
    InvalidScope { source: UnknownScope },

    #[snafu(display("Invalid --{}: '{}' (expected 'true' or 'false')", flag, value))]
    InvalidBool { flag: &'static str, value: String },

    #[snafu(display("Invalid --{}: '{}' is not an integer ({})", flag, value, source))]
    InvalidNumber {
        flag: &'static str,
        value: String,
        source: ParseIntError,
    },

    #[snafu(display("Invalid --{}: {} must not be negative", flag, value))]
    NegativeNumber { flag: &'static str, value: i64 },

    #[snafu(display("--schemas must name at least one schema"))]
    EmptySchemas,
}

type Result<T, E = ConfigError> = std::result::Result<T, E>;

/// How to reach the target database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    /// Container the database is reached through instead of host/port
    pub container: Option<String>,
}

/// Inclusive lower bounds every candidate must meet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    pub schemas: Vec<String>,
    pub min_idx_scans: i64,
    pub min_table_bytes: i64,
    pub min_index_bytes: i64,
}

/// Fully validated settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexConfig {
    pub connection: ConnectionConfig,
    pub filters: FilterConfig,
    pub scope: Scope,
    pub concurrently: bool,
    pub dry_run: bool,
    pub log_file: PathBuf,
}

/// Unvalidated settings from one layer (defaults, file, env or flags)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSettings {
    pub host: Option<String>,
    pub port: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub container: Option<String>,
    pub schemas: Option<Vec<String>>,
    pub min_idx_scans: Option<String>,
    pub min_table_size_mb: Option<String>,
    pub min_index_size_mb: Option<String>,
    pub scope: Option<String>,
    pub concurrently: Option<String>,
    pub dry_run: Option<String>,
    pub log_file: Option<String>,
}

impl RawSettings {
    pub fn defaults() -> Self {
        Self {
            host: Some("localhost".into()),
            port: Some("5432".into()),
            user: Some("paperless".into()),
            password: None,
            database: Some("paperless".into()),
            container: None,
            schemas: Some(vec!["public".into()]),
            min_idx_scans: Some("100".into()),
            min_table_size_mb: Some("10".into()),
            min_index_size_mb: Some("1".into()),
            scope: Some("index".into()),
            concurrently: Some("true".into()),
            dry_run: Some("false".into()),
            log_file: Some("reindex.log".into()),
        }
    }

    /// Fills every unset field from `lower`, keeping values already present
    pub fn over(self, lower: RawSettings) -> Self {
        Self {
            host: self.host.or(lower.host),
            port: self.port.or(lower.port),
            user: self.user.or(lower.user),
            password: self.password.or(lower.password),
            database: self.database.or(lower.database),
            container: self.container.or(lower.container),
            schemas: self.schemas.or(lower.schemas),
            min_idx_scans: self.min_idx_scans.or(lower.min_idx_scans),
            min_table_size_mb: self.min_table_size_mb.or(lower.min_table_size_mb),
            min_index_size_mb: self.min_index_size_mb.or(lower.min_index_size_mb),
            scope: self.scope.or(lower.scope),
            concurrently: self.concurrently.or(lower.concurrently),
            dry_run: self.dry_run.or(lower.dry_run),
            log_file: self.log_file.or(lower.log_file),
        }
    }

    pub fn from_config_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).context(FileReadSnafu { path })?;
        let file: FileSettings = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        Ok(file.into())
    }

    pub fn log_file_path(&self) -> PathBuf {
        PathBuf::from(self.log_file.as_deref().unwrap_or("reindex.log"))
    }
}

/// Typed shape of the optional YAML settings file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    db: Option<String>,
    container: Option<String>,
    schemas: Option<Vec<String>>,
    min_idx_scans: Option<i64>,
    min_table_size_mb: Option<i64>,
    min_index_size_mb: Option<i64>,
    scope: Option<String>,
    concurrently: Option<bool>,
    dry_run: Option<bool>,
    log_file: Option<String>,
}

impl From<FileSettings> for RawSettings {
    fn from(file: FileSettings) -> Self {
        Self {
            host: file.host,
            port: file.port.map(|p| p.to_string()),
            user: file.user,
            password: file.password,
            database: file.db,
            container: file.container,
            schemas: file.schemas,
            min_idx_scans: file.min_idx_scans.map(|n| n.to_string()),
            min_table_size_mb: file.min_table_size_mb.map(|n| n.to_string()),
            min_index_size_mb: file.min_index_size_mb.map(|n| n.to_string()),
            scope: file.scope,
            concurrently: file.concurrently.map(|b| b.to_string()),
            dry_run: file.dry_run.map(|b| b.to_string()),
            log_file: file.log_file,
        }
    }
}

impl ReindexConfig {
    /// Validates merged settings. Fields still unset fall back to the defaults.
    pub fn from_raw(raw: RawSettings) -> Result<Self> {
        let raw = raw.over(RawSettings::defaults());

        let scope = raw
            .scope
            .as_deref()
            .unwrap_or_default()
            .parse::<Scope>()
            .context(InvalidScopeSnafu)?;
        let concurrently = parse_bool("concurrently", raw.concurrently.as_deref())?;
        let dry_run = parse_bool("dry-run", raw.dry_run.as_deref())?;

        let port_str = raw.port.unwrap_or_default();
        let port = port_str.trim().parse::<u16>().context(InvalidNumberSnafu {
            flag: "port",
            value: port_str.clone(),
        })?;

        let min_idx_scans = parse_non_negative("min-idx-scans", raw.min_idx_scans.as_deref())?;
        let min_table_mb =
            parse_non_negative("min-table-size-mb", raw.min_table_size_mb.as_deref())?;
        let min_index_mb =
            parse_non_negative("min-index-size-mb", raw.min_index_size_mb.as_deref())?;

        let schemas = normalize_schemas(raw.schemas.unwrap_or_default());
        if schemas.is_empty() {
            return EmptySchemasSnafu.fail();
        }

        Ok(Self {
            connection: ConnectionConfig {
                host: raw.host.unwrap_or_default(),
                port,
                user: raw.user.unwrap_or_default(),
                password: raw.password.filter(|p| !p.is_empty()),
                database: raw.database.unwrap_or_default(),
                container: raw.container.filter(|c| !c.trim().is_empty()),
            },
            filters: FilterConfig {
                schemas,
                min_idx_scans,
                min_table_bytes: min_table_mb.saturating_mul(BYTES_PER_MB),
                min_index_bytes: min_index_mb.saturating_mul(BYTES_PER_MB),
            },
            scope,
            concurrently,
            dry_run,
            log_file: PathBuf::from(raw.log_file.unwrap_or_default()),
        })
    }
}

fn parse_bool(flag: &'static str, value: Option<&str>) -> Result<bool> {
    match value.unwrap_or_default() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => InvalidBoolSnafu {
            flag,
            value: other.to_string(),
        }
        .fail(),
    }
}

fn parse_non_negative(flag: &'static str, value: Option<&str>) -> Result<i64> {
    let value = value.unwrap_or_default();
    let parsed = value
        .trim()
        .parse::<i64>()
        .context(InvalidNumberSnafu { flag, value })?;
    if parsed < 0 {
        return NegativeNumberSnafu {
            flag,
            value: parsed,
        }
        .fail();
    }
    Ok(parsed)
}

/// Splits a comma-separated `--schemas` value. A YAML list skips this step,
/// so names containing commas can only be given there.
pub fn split_schemas(value: &str) -> Vec<String> {
    value.split(',').map(str::to_string).collect()
}

fn normalize_schemas(schemas: Vec<String>) -> Vec<String> {
    schemas
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unique()
        .map(str::to_string)
        .collect()
}
