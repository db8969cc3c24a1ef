//! Thin `connect`/`execute` facade over one SQLite connection.
//!
//! # Responsibility
//! - Turn a database url into an opened, bootstrapped connection.
//! - Run raw statements and hand rows back as column-keyed maps.
//!
//! # Invariants
//! - Bound parameters are never written to logs; only SQL text and timings are.

use super::open::{open_db, open_db_in_memory};
use super::{DbError, DbResult};
use log::{debug, error};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

const MEMORY_URL: &str = "sqlite::memory:";
const FILE_URL_PREFIX: &str = "sqlite://";

/// One fetched row keyed by output column name.
pub type Row = BTreeMap<String, Value>;

/// Parsed database location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    Memory,
    File(PathBuf),
}

impl DatabaseUrl {
    /// Parses `sqlite::memory:`, `sqlite://relative.db` or `sqlite:///abs/path.db`.
    pub fn parse(url: &str) -> DbResult<Self> {
        let trimmed = url.trim();
        if trimmed == MEMORY_URL {
            return Ok(Self::Memory);
        }

        match trimmed.strip_prefix(FILE_URL_PREFIX) {
            Some(path) if !path.trim().is_empty() => Ok(Self::File(PathBuf::from(path))),
            _ => Err(DbError::InvalidUrl(trimmed.to_string())),
        }
    }
}

/// Connected database handle.
pub struct Database {
    url: DatabaseUrl,
    conn: Connection,
}

impl Database {
    /// Parses `url` and opens the connection it names.
    pub fn connect(url: &str) -> DbResult<Self> {
        let url = DatabaseUrl::parse(url)?;
        let conn = match &url {
            DatabaseUrl::Memory => open_db_in_memory()?,
            DatabaseUrl::File(path) => open_db(path)?,
        };
        Ok(Self { url, conn })
    }

    pub fn url(&self) -> &DatabaseUrl {
        &self.url
    }

    /// Borrows the underlying connection for repository construction.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Executes one statement and returns the number of changed rows.
    pub fn execute(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        let started_at = Instant::now();
        let result = self.conn.execute(sql, params_from_iter(params.iter()));
        log_execute("execute", sql, started_at, result.as_ref().map(|changed| *changed));
        Ok(result?)
    }

    /// Executes a batch of `;`-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let started_at = Instant::now();
        let result = self.conn.execute_batch(sql);
        log_execute("batch", sql, started_at, result.as_ref().map(|_| 0));
        Ok(result?)
    }

    /// Runs a query and returns every row as a column-keyed map.
    pub fn fetch_rows(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
        let started_at = Instant::now();
        let result = self.fetch_rows_inner(sql, params);
        log_execute(
            "fetch",
            sql,
            started_at,
            result.as_ref().map(|rows| rows.len()),
        );
        result
    }

    fn fetch_rows_inner(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            let mut mapped = Row::new();
            for (index, column) in columns.iter().enumerate() {
                mapped.insert(column.clone(), row.get::<_, Value>(index)?);
            }
            fetched.push(mapped);
        }
        Ok(fetched)
    }
}

fn log_execute<E: std::fmt::Display>(
    kind: &'static str,
    sql: &str,
    started_at: Instant,
    outcome: Result<usize, &E>,
) {
    let sql = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    match outcome {
        Ok(rows) => debug!(
            "event=db_execute module=db status=ok kind={} duration_ms={} rows={} sql={}",
            kind,
            started_at.elapsed().as_millis(),
            rows,
            sql
        ),
        Err(err) => error!(
            "event=db_execute module=db status=error kind={} duration_ms={} sql={} error={}",
            kind,
            started_at.elapsed().as_millis(),
            sql,
            err
        ),
    }
}
