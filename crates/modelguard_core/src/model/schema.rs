//! Model schema declarations.
//!
//! # Responsibility
//! - Describe one model's table, columns, restrictions and parent type.
//! - Reject declarations that cannot be safely turned into SQL.
//!
//! # Invariants
//! - Model, table and column names are plain SQL identifiers.
//! - `uuid` is reserved for the primary key and cannot be declared.

use crate::db::is_valid_identifier;
use crate::model::record::ModelName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Primary key column present on every model table.
pub const PRIMARY_KEY_COLUMN: &str = "uuid";

/// One declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    /// Value must be non-null and, for text, non-blank.
    #[serde(default)]
    pub required: bool,
    /// No two rows may share a value.
    #[serde(default)]
    pub unique: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            unique: false,
        }
    }

    pub fn required(name: impl Into<String>) -> Self {
        Self {
            required: true,
            ..Self::new(name)
        }
    }

    pub fn unique(name: impl Into<String>) -> Self {
        Self {
            unique: true,
            ..Self::new(name)
        }
    }
}

/// Declaration of one model type and its backing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: ModelName,
    pub table: String,
    /// Supertype used for error observer fallback.
    #[serde(default)]
    pub parent: Option<ModelName>,
    pub columns: Vec<ColumnDef>,
    /// Columns that default mass assignment may not set.
    #[serde(default)]
    pub restricted: Vec<String>,
}

impl ModelSchema {
    pub fn new(name: impl Into<ModelName>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            parent: None,
            columns: Vec::new(),
            restricted: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn parent(mut self, parent: impl Into<ModelName>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn restrict(mut self, column: impl Into<String>) -> Self {
        self.restricted.push(column.into());
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }

    pub fn is_restricted(&self, name: &str) -> bool {
        self.restricted.iter().any(|column| column == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Checks names, duplicates and restriction references.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if !is_valid_identifier(self.name.as_str()) {
            return Err(SchemaError::InvalidName(self.name.to_string()));
        }
        if let Some(parent) = &self.parent {
            if !is_valid_identifier(parent.as_str()) {
                return Err(SchemaError::InvalidName(parent.to_string()));
            }
        }
        if !is_valid_identifier(&self.table) {
            return Err(SchemaError::InvalidName(self.table.clone()));
        }

        let mut seen = BTreeSet::new();
        for column in &self.columns {
            if !is_valid_identifier(&column.name) {
                return Err(SchemaError::InvalidName(column.name.clone()));
            }
            if column.name.eq_ignore_ascii_case(PRIMARY_KEY_COLUMN) {
                return Err(SchemaError::ReservedColumn(column.name.clone()));
            }
            // SQLite identifiers are case-insensitive.
            if !seen.insert(column.name.to_ascii_lowercase()) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
        }

        if let Some(unknown) = self
            .restricted
            .iter()
            .find(|column| !self.has_column(column))
        {
            return Err(SchemaError::UnknownRestrictedColumn(unknown.clone()));
        }

        Ok(())
    }
}

/// Schema declaration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidName(String),
    ReservedColumn(String),
    DuplicateColumn(String),
    UnknownRestrictedColumn(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid schema identifier `{name}`"),
            Self::ReservedColumn(name) => {
                write!(f, "column `{name}` is reserved for the primary key")
            }
            Self::DuplicateColumn(name) => write!(f, "column `{name}` is declared twice"),
            Self::UnknownRestrictedColumn(name) => {
                write!(f, "restricted column `{name}` is not declared")
            }
        }
    }
}

impl Error for SchemaError {}
