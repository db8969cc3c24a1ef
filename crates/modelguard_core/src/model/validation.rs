//! Record validation results.
//!
//! Presence is checked here against the schema alone; uniqueness needs stored
//! rows and is added by the repository.

use crate::model::record::{ModelName, Record};
use crate::model::schema::ModelSchema;
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Message attached to a required column without a usable value.
pub const MESSAGE_NOT_PRESENT: &str = "is not present";
/// Message attached to a unique column whose value already exists.
pub const MESSAGE_NOT_UNIQUE: &str = "must be unique.";

/// One failed check on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub column: String,
    pub message: String,
}

impl FieldError {
    pub fn new(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            message: message.into(),
        }
    }
}

/// All failed checks for one record, in column declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub model: ModelName,
    pub errors: Vec<FieldError>,
}

impl ValidationFailure {
    pub fn messages_for(&self, column: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|error| error.column == column)
            .map(|error| error.message.as_str())
            .collect()
    }

    /// Returns whether any column failed with exactly `message`.
    pub fn has_message(&self, message: &str) -> bool {
        self.errors.iter().any(|error| error.message == message)
    }

    /// Full `column message` strings, e.g. `unique must be unique.`.
    pub fn full_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|error| format!("{} {}", error.column, error.message))
            .collect()
    }
}

impl Display for ValidationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} is invalid: {}",
            self.model,
            self.full_messages().join(", ")
        )
    }
}

impl Error for ValidationFailure {}

/// Returns presence errors for required columns of `schema`.
pub fn presence_errors(schema: &ModelSchema, record: &Record) -> Vec<FieldError> {
    schema
        .columns
        .iter()
        .filter(|column| column.required && !is_present(record.get(&column.name)))
        .map(|column| FieldError::new(column.name.clone(), MESSAGE_NOT_PRESENT))
        .collect()
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Text(text)) => !text.trim().is_empty(),
        Some(_) => true,
    }
}
