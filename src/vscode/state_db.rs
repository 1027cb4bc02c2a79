//! Tabular store operations
//!
//! Purges identity and extension rows from a variant's `state.vscdb`, a
//! SQLite database holding key/value rows in `ItemTable`. Preview and
//! destructive paths share one predicate builder, so a dry-run count can
//! never drift from what the delete removes. Every statement text passes
//! the query guard before it reaches a connection.

use rusqlite::{Connection, OpenFlags};
use std::path::Path;

use crate::error::{ScrubError, ScrubResult};

/// Keyword families matched against ItemTable keys, one LIKE pattern each.
/// SQLite LIKE is ASCII case-insensitive, so one spelling per keyword.
pub const PURGE_FAMILIES: &[(&str, &[&str])] = &[
    ("extension", &["%augment%"]),
    ("ai-service", &["%context7%"]),
    (
        "device-identity",
        &["%machineid%", "%devdeviceid%", "%sqmid%", "%telemetry%"],
    ),
    ("trial-markers", &["%trial%", "%licensestatus%"]),
    ("usage-counters", &["%usagecount%", "%analytics%"]),
    (
        "auth-tokens",
        &["%accesstoken%", "%refreshtoken%", "%auth.sessions%"],
    ),
];

fn all_patterns() -> Vec<&'static str> {
    PURGE_FAMILIES
        .iter()
        .flat_map(|(_, patterns)| patterns.iter().copied())
        .collect()
}

/// WHERE clause shared by the preview count, the key collection, and the
/// delete
fn purge_predicate() -> (String, Vec<&'static str>) {
    let patterns = all_patterns();
    let clause = patterns
        .iter()
        .enumerate()
        .map(|(i, _)| format!("key LIKE ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(" OR ");
    (clause, patterns)
}

/// Statement intent declared by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    Select,
    Update,
    Delete,
    Insert,
    Pragma,
    Vacuum,
}

impl QueryIntent {
    fn verb(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Insert => "insert",
            Self::Pragma => "pragma",
            Self::Vacuum => "vacuum",
        }
    }
}

/// Substrings no outgoing statement may contain
const DENIED_FRAGMENTS: &[&str] = &[
    "drop table",
    "alter table",
    "union select",
    "sqlite_master",
    "sqlite_temp_master",
    "--",
    "/*",
];

/// Validate one outgoing statement against the deny-list and its declared
/// intent
pub fn guard_statement(sql: &str, intent: QueryIntent) -> ScrubResult<()> {
    let lowered = sql.to_lowercase();

    for fragment in DENIED_FRAGMENTS {
        if lowered.contains(fragment) {
            return Err(ScrubError::QueryRejected(format!(
                "contains '{}': {}",
                fragment, sql
            )));
        }
    }

    // One statement per call; a semicolon may only terminate
    if let Some(pos) = lowered.find(';') {
        if !lowered[pos + 1..].trim().is_empty() {
            return Err(ScrubError::QueryRejected(format!(
                "multiple statements: {}",
                sql
            )));
        }
    }

    let first = lowered
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_end_matches(';');
    if first != intent.verb() {
        return Err(ScrubError::QueryRejected(format!(
            "expected a {} statement: {}",
            intent.verb(),
            sql
        )));
    }

    Ok(())
}

fn open_ro(db_path: &Path) -> ScrubResult<Connection> {
    if !db_path.exists() {
        return Err(ScrubError::SourceNotFound(db_path.to_path_buf()));
    }
    Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| ScrubError::database(db_path, err))
}

fn open_rw(db_path: &Path) -> ScrubResult<Connection> {
    if !db_path.exists() {
        return Err(ScrubError::SourceNotFound(db_path.to_path_buf()));
    }
    Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| ScrubError::database(db_path, err))
}

/// A database without ItemTable is not an editor state store
fn ensure_item_table(conn: &Connection, db_path: &Path) -> ScrubResult<()> {
    let sql = "PRAGMA table_info(ItemTable)";
    guard_statement(sql, QueryIntent::Pragma)?;

    let mut stmt = conn
        .prepare(sql)
        .map_err(|err| ScrubError::database(db_path, err))?;
    let mut rows = stmt
        .query([])
        .map_err(|err| ScrubError::database(db_path, err))?;

    if rows
        .next()
        .map_err(|err| ScrubError::database(db_path, err))?
        .is_none()
    {
        return Err(ScrubError::ParseFailure {
            path: db_path.to_path_buf(),
            reason: "missing ItemTable".to_string(),
        });
    }
    Ok(())
}

/// Rows the purge would remove, counted with the exact predicate the
/// destructive path uses
pub fn count_purgeable(db_path: &Path) -> ScrubResult<usize> {
    let conn = open_ro(db_path)?;
    ensure_item_table(&conn, db_path)?;

    let (clause, patterns) = purge_predicate();
    let sql = format!("SELECT COUNT(*) FROM ItemTable WHERE {}", clause);
    guard_statement(&sql, QueryIntent::Select)?;

    let count: i64 = conn
        .query_row(&sql, rusqlite::params_from_iter(patterns.iter()), |row| {
            row.get(0)
        })
        .map_err(|err| ScrubError::database(db_path, err))?;

    Ok(count as usize)
}

/// Outcome of one database purge
#[derive(Debug)]
pub struct PurgeOutcome {
    /// Keys of the removed rows
    pub deleted_keys: Vec<String>,
    /// Row count reported by the delete
    pub rows_deleted: usize,
}

/// Remove every ItemTable row matching the purge predicate, then compact
/// the database. The collection and the delete run in one transaction.
pub fn purge(db_path: &Path) -> ScrubResult<PurgeOutcome> {
    let mut conn = open_rw(db_path)?;
    ensure_item_table(&conn, db_path)?;

    let (clause, patterns) = purge_predicate();
    let select_sql = format!("SELECT key FROM ItemTable WHERE {}", clause);
    let delete_sql = format!("DELETE FROM ItemTable WHERE {}", clause);
    guard_statement(&select_sql, QueryIntent::Select)?;
    guard_statement(&delete_sql, QueryIntent::Delete)?;

    let tx = conn
        .transaction()
        .map_err(|err| ScrubError::database(db_path, err))?;

    let deleted_keys: Vec<String> = {
        let mut stmt = tx
            .prepare(&select_sql)
            .map_err(|err| ScrubError::database(db_path, err))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(patterns.iter()), |row| {
                row.get::<_, String>(0)
            })
            .map_err(|err| ScrubError::database(db_path, err))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| ScrubError::database(db_path, err))?
    };

    let rows_deleted = tx
        .execute(&delete_sql, rusqlite::params_from_iter(patterns.iter()))
        .map_err(|err| ScrubError::database(db_path, err))?;

    tx.commit()
        .map_err(|err| ScrubError::database(db_path, err))?;

    // Nothing removed, nothing to compact
    if rows_deleted > 0 {
        let vacuum_sql = "VACUUM";
        guard_statement(vacuum_sql, QueryIntent::Vacuum)?;
        conn.execute(vacuum_sql, [])
            .map_err(|err| ScrubError::database(db_path, err))?;
    }

    Ok(PurgeOutcome {
        deleted_keys,
        rows_deleted,
    })
}
