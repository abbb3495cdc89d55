//! Pure planning stage: filtering, ordering and statement synthesis.
//!
//! Nothing in here touches the database, so every rule can be checked against
//! hand-built catalog rows.

use crate::config::FilterConfig;
use crate::models::{Candidate, IndexUsage, ReindexTarget, Scope};
use itertools::Itertools;
use std::cmp::Ordering;

/// First server version (`server_version_num`) with `REINDEX ... CONCURRENTLY`
pub const MIN_CONCURRENT_VERSION: i32 = 120_000;

/// Keeps rows in an allowed schema whose scans, table size and index size all
/// reach their minimum (inclusive), hottest and largest first.
pub fn select_candidates(rows: Vec<IndexUsage>, filters: &FilterConfig) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = rows
        .into_iter()
        .filter(|row| {
            filters.schemas.contains(&row.schema_name)
                && row.idx_scan >= filters.min_idx_scans
                && row.table_bytes >= filters.min_table_bytes
                && row.index_bytes >= filters.min_index_bytes
        })
        .map(Candidate::from)
        .collect();

    candidates.sort_by(compare_candidates);
    candidates
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.scans
        .cmp(&a.scans)
        .then_with(|| b.index_bytes.cmp(&a.index_bytes))
        .then_with(|| a.schema.cmp(&b.schema))
        .then_with(|| a.table.cmp(&b.table))
        .then_with(|| a.index.cmp(&b.index))
}

/// Relations to rebuild, in execution order.
///
/// Index scope keeps the selector's order. Table scope collapses candidates to
/// distinct tables sorted by schema, then table name.
pub fn targets(candidates: &[Candidate], scope: Scope) -> Vec<ReindexTarget> {
    match scope {
        Scope::Index => candidates
            .iter()
            .map(|c| ReindexTarget {
                schema: c.schema.clone(),
                name: c.index.clone(),
            })
            .collect(),
        Scope::Table => candidates
            .iter()
            .map(|c| ReindexTarget {
                schema: c.schema.clone(),
                name: c.table.clone(),
            })
            .sorted()
            .dedup()
            .collect(),
    }
}

/// One `REINDEX` statement per target
pub fn synthesize(candidates: &[Candidate], scope: Scope, concurrently: bool) -> Vec<String> {
    let kind = match scope {
        Scope::Index => "INDEX",
        Scope::Table => "TABLE",
    };
    let mode = if concurrently { " CONCURRENTLY" } else { "" };

    targets(candidates, scope)
        .iter()
        .map(|t| {
            format!(
                "REINDEX {}{} {}.{};",
                kind,
                mode,
                quote_ident(&t.schema),
                quote_ident(&t.name)
            )
        })
        .collect()
}

/// Quotes an identifier the way PostgreSQL's `quote_ident` does, except that
/// it always quotes. Embedded double quotes are doubled.
pub fn quote_ident(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for ch in name.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Whether lock-minimizing rebuilds can be requested from this server.
/// `0` stands for an unknown version and never qualifies.
pub fn supports_concurrent_reindex(version: i32) -> bool {
    version >= MIN_CONCURRENT_VERSION
}
