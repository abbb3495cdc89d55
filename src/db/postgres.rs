use super::{Database, DbError, QuerySnafu, INDEX_USAGE_QUERY, SERVER_VERSION_QUERY};
use crate::config::ConnectionConfig;
use crate::models::IndexUsage;
use snafu::ResultExt;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{query_scalar, Pool, Postgres, Row};
use std::time::Duration;
use tracing::debug;

type Result<T, E = DbError> = std::result::Result<T, E>;

/// Direct connection over the PostgreSQL wire protocol
pub struct PgDatabase {
    host: String,
    port: u16,
    database: String,
    pool: Pool<Postgres>,
}

impl PgDatabase {
    /// Builds a single-connection pool without contacting the server yet, so a
    /// dead server surfaces on the first query instead of at construction.
    pub fn connect_lazy(config: &ConnectionConfig) -> Self {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .database(&config.database)
            .application_name("pgreindex");
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(options);

        Self {
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            pool,
        }
    }

    pub fn describe(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl Database for PgDatabase {
    async fn server_version_num(&self) -> Result<i32> {
        query_scalar::<_, i32>(SERVER_VERSION_QUERY)
            .fetch_one(&self.pool)
            .await
            .context(QuerySnafu {
                query: SERVER_VERSION_QUERY,
            })
    }

    async fn index_usage(&self) -> Result<Vec<IndexUsage>> {
        let rows = sqlx::query(INDEX_USAGE_QUERY)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu {
                query: INDEX_USAGE_QUERY,
            })?;

        let mut usage = Vec::with_capacity(rows.len());
        for row in rows {
            usage.push(IndexUsage {
                schema_name: row.get("schema_name"),
                table_name: row.get("table_name"),
                index_name: row.get("index_name"),
                idx_scan: row.get("idx_scan"),
                table_bytes: row.get("table_bytes"),
                index_bytes: row.get("index_bytes"),
            });
        }

        debug!("Fetched {} index usage rows", usage.len());
        Ok(usage)
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        // Simple query protocol so the statement runs in its own implicit
        // transaction; REINDEX ... CONCURRENTLY rejects transaction blocks.
        sqlx::raw_sql(statement)
            .execute(&self.pool)
            .await
            .context(QuerySnafu { query: statement })?;
        Ok(())
    }
}
