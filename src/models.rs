use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a single rebuild statement targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Rebuild each selected index on its own
    #[default]
    Index,
    /// Rebuild every table that owns at least one selected index
    Table,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Index => "index",
            Scope::Table => "table",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a scope string is neither `index` nor `table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownScope(pub String);

impl fmt::Display for UnknownScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown scope '{}', expected 'index' or 'table'", self.0)
    }
}

impl std::error::Error for UnknownScope {}

impl FromStr for Scope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index" => Ok(Scope::Index),
            "table" => Ok(Scope::Table),
            other => Err(UnknownScope(other.to_string())),
        }
    }
}

/// One row of `pg_stat_user_indexes` joined with relation sizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexUsage {
    pub schema_name: String,
    pub table_name: String,
    pub index_name: String,
    pub idx_scan: i64,
    pub table_bytes: i64,
    pub index_bytes: i64,
}

/// An index (and its owning table) that passed every selection filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub schema: String,
    pub table: String,
    pub index: String,
    pub scans: i64,
    pub table_bytes: i64,
    pub index_bytes: i64,
}

impl From<IndexUsage> for Candidate {
    fn from(row: IndexUsage) -> Self {
        Self {
            schema: row.schema_name,
            table: row.table_name,
            index: row.index_name,
            scans: row.idx_scan,
            table_bytes: row.table_bytes,
            index_bytes: row.index_bytes,
        }
    }
}

/// Schema-qualified relation a rebuild statement refers to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReindexTarget {
    pub schema: String,
    pub name: String,
}
