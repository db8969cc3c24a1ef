//! Record repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide validate/insert/update/read APIs over per-model tables.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths validate before any SQL mutation.
//! - Read paths reject malformed stored ids instead of masking them.
//! - NULL columns are absent from hydrated `Record::values`.

use crate::db::{quote_identifier, DbError};
use crate::model::record::{Record, RecordError, RecordId};
use crate::model::schema::{ModelSchema, PRIMARY_KEY_COLUMN};
use crate::model::validation::{
    presence_errors, FieldError, ValidationFailure, MESSAGE_NOT_UNIQUE,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for record persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationFailure),
    Record(RecordError),
    Db(DbError),
    NotFound(RecordId),
    InvalidData(String),
    MissingColumn { table: String, column: String },
}

impl RepoError {
    /// Returns the validation failure when this error is one.
    pub fn validation(&self) -> Option<&ValidationFailure> {
        match self {
            Self::Validation(failure) => Some(failure),
            _ => None,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Record(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
            Self::MissingColumn { table, column } => {
                write!(f, "existing table `{table}` has no column `{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Record(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) | Self::MissingColumn { .. } => None,
        }
    }
}

impl From<ValidationFailure> for RepoError {
    fn from(value: ValidationFailure) -> Self {
        Self::Validation(value)
    }
}

impl From<RecordError> for RepoError {
    fn from(value: RecordError) -> Self {
        Self::Record(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence collaborator used by lifecycle operations.
pub trait RecordRepository {
    /// Creates the model table and unique indexes when missing.
    fn ensure_table(&self, schema: &ModelSchema) -> RepoResult<()>;
    /// Runs presence and uniqueness checks.
    fn validate(&self, schema: &ModelSchema, record: &Record) -> RepoResult<()>;
    /// Validates and inserts a new row.
    fn insert(&self, schema: &ModelSchema, record: &Record) -> RepoResult<()>;
    /// Validates and writes `columns` of an existing row; empty means all columns.
    fn update(&self, schema: &ModelSchema, record: &Record, columns: &[String]) -> RepoResult<()>;
    fn get(&self, schema: &ModelSchema, id: RecordId) -> RepoResult<Option<Record>>;
    /// Returns the first row (insertion order) whose `column` equals `value`.
    fn find_by(
        &self,
        schema: &ModelSchema,
        column: &str,
        value: &Value,
    ) -> RepoResult<Option<Record>>;
    /// Lists all rows in insertion order.
    fn list(&self, schema: &ModelSchema) -> RepoResult<Vec<Record>>;
}

/// SQLite-backed record repository.
pub struct SqliteRecordRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn unique_conflict(
        &self,
        schema: &ModelSchema,
        column: &str,
        value: &Value,
        exclude: RecordId,
    ) -> RepoResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1 AND {} != ?2);",
            quote_identifier(&schema.table)?,
            quote_identifier(column)?,
            quote_identifier(PRIMARY_KEY_COLUMN)?,
        );
        let exists: i64 = self.conn.query_row(
            &sql,
            params_from_iter([value.clone(), Value::Text(exclude.to_string())]),
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn select_one(
        &self,
        schema: &ModelSchema,
        filter_column: &str,
        value: Value,
    ) -> RepoResult<Option<Record>> {
        let sql = format!(
            "{} WHERE {} = ?1 ORDER BY rowid ASC LIMIT 1;",
            select_sql(schema)?,
            quote_identifier(filter_column)?
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([value])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_record_row(schema, row)?));
        }
        Ok(None)
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn ensure_table(&self, schema: &ModelSchema) -> RepoResult<()> {
        let table = quote_identifier(&schema.table)?;
        let mut column_sql = vec![format!(
            "{} TEXT PRIMARY KEY NOT NULL",
            quote_identifier(PRIMARY_KEY_COLUMN)?
        )];
        for column in &schema.columns {
            column_sql.push(quote_identifier(&column.name)?);
        }

        let mut index_sql = String::new();
        for column in schema.columns.iter().filter(|column| column.unique) {
            let index = quote_identifier(&format!("{}_{}_unique", schema.table, column.name))?;
            index_sql.push_str(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} ({});\n",
                quote_identifier(&column.name)?
            ));
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} ({});",
            column_sql.join(", ")
        ))?;

        // A pre-existing table may lack declared columns; quoted names that
        // match no column would otherwise be indexed as string literals.
        let existing = table_columns(&tx, &schema.table)?;
        let required = std::iter::once(PRIMARY_KEY_COLUMN).chain(schema.column_names());
        for name in required {
            if !existing.iter().any(|column| column.eq_ignore_ascii_case(name)) {
                return Err(RepoError::MissingColumn {
                    table: schema.table.clone(),
                    column: name.to_string(),
                });
            }
        }

        tx.execute_batch(&index_sql)?;
        tx.commit()?;
        Ok(())
    }

    fn validate(&self, schema: &ModelSchema, record: &Record) -> RepoResult<()> {
        let mut errors = presence_errors(schema, record);

        for column in schema.columns.iter().filter(|column| column.unique) {
            let Some(value) = record.get(&column.name) else {
                continue;
            };
            if matches!(value, Value::Null) {
                continue;
            }
            if self.unique_conflict(schema, &column.name, value, record.uuid)? {
                errors.push(FieldError::new(column.name.clone(), MESSAGE_NOT_UNIQUE));
            }
        }

        if errors.is_empty() {
            return Ok(());
        }
        Err(RepoError::Validation(ValidationFailure {
            model: schema.name.clone(),
            errors,
        }))
    }

    fn insert(&self, schema: &ModelSchema, record: &Record) -> RepoResult<()> {
        self.validate(schema, record)?;

        let mut columns = vec![quote_identifier(PRIMARY_KEY_COLUMN)?];
        let mut values = vec![Value::Text(record.uuid.to_string())];
        for name in schema.column_names() {
            if let Some(value) = record.get(name) {
                columns.push(quote_identifier(name)?);
                values.push(value.clone());
            }
        }

        let placeholders = (1..=values.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders});",
            quote_identifier(&schema.table)?,
            columns.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    fn update(&self, schema: &ModelSchema, record: &Record, columns: &[String]) -> RepoResult<()> {
        self.validate(schema, record)?;

        let targets: Vec<&str> = if columns.is_empty() {
            schema.column_names().collect()
        } else {
            columns.iter().map(String::as_str).collect()
        };

        let mut assignments = Vec::with_capacity(targets.len());
        let mut values = Vec::with_capacity(targets.len() + 1);
        for (index, name) in targets.iter().enumerate() {
            if !schema.has_column(name) {
                return Err(RepoError::Record(RecordError::UnknownColumn {
                    model: schema.name.clone(),
                    column: name.to_string(),
                }));
            }
            assignments.push(format!("{} = ?{}", quote_identifier(name)?, index + 1));
            values.push(record.get(name).cloned().unwrap_or(Value::Null));
        }
        if assignments.is_empty() {
            return Ok(());
        }
        values.push(Value::Text(record.uuid.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{};",
            quote_identifier(&schema.table)?,
            assignments.join(", "),
            quote_identifier(PRIMARY_KEY_COLUMN)?,
            values.len()
        );
        let changed = self.conn.execute(&sql, params_from_iter(values))?;
        if changed == 0 {
            return Err(RepoError::NotFound(record.uuid));
        }
        Ok(())
    }

    fn get(&self, schema: &ModelSchema, id: RecordId) -> RepoResult<Option<Record>> {
        self.select_one(schema, PRIMARY_KEY_COLUMN, Value::Text(id.to_string()))
    }

    fn find_by(
        &self,
        schema: &ModelSchema,
        column: &str,
        value: &Value,
    ) -> RepoResult<Option<Record>> {
        if column != PRIMARY_KEY_COLUMN && !schema.has_column(column) {
            return Err(RepoError::Record(RecordError::UnknownColumn {
                model: schema.name.clone(),
                column: column.to_string(),
            }));
        }
        self.select_one(schema, column, value.clone())
    }

    fn list(&self, schema: &ModelSchema) -> RepoResult<Vec<Record>> {
        let sql = format!("{} ORDER BY rowid ASC;", select_sql(schema)?);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(schema, row)?);
        }
        Ok(records)
    }
}

fn table_columns(conn: &Connection, table: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1);")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn select_sql(schema: &ModelSchema) -> RepoResult<String> {
    let mut columns = vec![quote_identifier(PRIMARY_KEY_COLUMN)?];
    for name in schema.column_names() {
        columns.push(quote_identifier(name)?);
    }
    Ok(format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        quote_identifier(&schema.table)?
    ))
}

fn parse_record_row(schema: &ModelSchema, row: &Row<'_>) -> RepoResult<Record> {
    let uuid_text: String = row.get(0)?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{uuid_text}` in {}.uuid",
            schema.table
        ))
    })?;

    let mut record = Record::with_id(schema.name.clone(), uuid)?;
    for (offset, name) in schema.column_names().enumerate() {
        let value: Value = row.get(offset + 1)?;
        if !matches!(value, Value::Null) {
            record.set(name, value);
        }
    }
    record.persisted = true;
    Ok(record)
}
