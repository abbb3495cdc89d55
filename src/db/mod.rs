use crate::config::ConnectionConfig;
use crate::models::IndexUsage;
use snafu::Snafu;

pub mod postgres;
pub mod psql;

pub use postgres::PgDatabase;
pub use psql::PsqlProxy;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DbError {
    #[snafu(display("Failed to execute query `{}`: {}", query.trim(), source))]
    Query { query: String, source: sqlx::Error },

    #[snafu(display("Failed to start {}: {}", program, source))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("{} exited with {}: {}", program, status, stderr.trim()))]
    ClientFailed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[snafu(display("Failed to decode catalog rows: {}", source))]
    Decode { source: serde_json::Error },

    #[snafu(display("Unexpected server_version_num '{}'", value))]
    VersionParse { value: String },
}

type Result<T, E = DbError> = std::result::Result<T, E>;

/// Per-index usage statistics for every user index, with relation sizes.
/// Column aliases match the field names of [`IndexUsage`].
pub(crate) const INDEX_USAGE_QUERY: &str = r#"
    SELECT
        s.schemaname::text AS schema_name,
        s.relname::text AS table_name,
        s.indexrelname::text AS index_name,
        COALESCE(s.idx_scan, 0)::bigint AS idx_scan,
        pg_relation_size(s.relid)::bigint AS table_bytes,
        pg_relation_size(s.indexrelid)::bigint AS index_bytes
    FROM pg_stat_user_indexes s
"#;

pub(crate) const SERVER_VERSION_QUERY: &str =
    "SELECT current_setting('server_version_num')::integer";

/// Catalog reads and statement execution against the target database.
///
/// Implementations must keep `server_version_num` and `index_usage` free of
/// side effects; only `execute` may change the database.
#[allow(async_fn_in_trait)]
pub trait Database {
    /// Comparable server version, e.g. `160002` for 16.2
    async fn server_version_num(&self) -> Result<i32>;

    async fn index_usage(&self) -> Result<Vec<IndexUsage>>;

    /// Runs one statement outside any explicit transaction
    async fn execute(&self, statement: &str) -> Result<()>;
}

/// Backend picked from the connection settings
pub enum Backend {
    Direct(PgDatabase),
    Proxy(PsqlProxy),
}

impl Backend {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        match &config.container {
            Some(container) => Backend::Proxy(PsqlProxy::new(config.clone(), container.clone())),
            None => Backend::Direct(PgDatabase::connect_lazy(config)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Backend::Direct(db) => db.describe(),
            Backend::Proxy(proxy) => proxy.describe(),
        }
    }
}

impl Database for Backend {
    async fn server_version_num(&self) -> Result<i32> {
        match self {
            Backend::Direct(db) => db.server_version_num().await,
            Backend::Proxy(proxy) => proxy.server_version_num().await,
        }
    }

    async fn index_usage(&self) -> Result<Vec<IndexUsage>> {
        match self {
            Backend::Direct(db) => db.index_usage().await,
            Backend::Proxy(proxy) => proxy.index_usage().await,
        }
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        match self {
            Backend::Direct(db) => db.execute(statement).await,
            Backend::Proxy(proxy) => proxy.execute(statement).await,
        }
    }
}
