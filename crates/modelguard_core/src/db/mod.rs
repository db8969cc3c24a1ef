//! SQLite storage bootstrap and the thin database facade.
//!
//! # Responsibility
//! - Open and configure SQLite connections for modelguard core.
//! - Expose a `connect`/`execute` facade for callers that do not need the
//!   repository layer.
//! - Own SQL identifier validation for dynamically built statements.
//!
//! # Invariants
//! - Every identifier spliced into SQL text passes `quote_identifier` first.
//! - Returned connections have `foreign_keys=ON`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod database;
mod open;

pub use database::{Database, DatabaseUrl, Row};
pub use open::{open_db, open_db_in_memory};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    InvalidUrl(String),
    InvalidIdentifier(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidUrl(url) => write!(
                f,
                "unsupported database url `{url}`; expected sqlite::memory: or sqlite://<path>"
            ),
            Self::InvalidIdentifier(name) => write!(f, "invalid SQL identifier `{name}`"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidUrl(_) | Self::InvalidIdentifier(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Returns whether `name` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Validates `name` and returns it double-quoted for use in SQL text.
pub fn quote_identifier(name: &str) -> DbResult<String> {
    if !is_valid_identifier(name) {
        return Err(DbError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}
