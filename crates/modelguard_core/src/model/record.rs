//! Record domain model.
//!
//! # Responsibility
//! - Define the in-memory shape of one model instance.
//! - Apply attribute maps under the four mass-assignment modes.
//!
//! # Invariants
//! - `uuid` is stable and never nil.
//! - `persisted` is the source of truth for insert vs update on save.
//! - Strict assignment checks every key before mutating any value.

use crate::model::schema::ModelSchema;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one record, stored in the `uuid` primary key column.
pub type RecordId = Uuid;

/// Column-keyed attribute values.
pub type Attributes = BTreeMap<String, Value>;

/// Identity of a model type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelName(String);

impl ModelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ModelName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ModelName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ModelName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Column filter applied by mass assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignMode<'a> {
    /// Declared columns that are not restricted by the schema.
    Default,
    /// Every declared column, restrictions ignored.
    All,
    /// Declared columns except the listed ones.
    Except(&'a [String]),
    /// Only the listed columns.
    Only(&'a [String]),
}

impl AssignMode<'_> {
    fn allows(&self, schema: &ModelSchema, column: &str) -> bool {
        match self {
            Self::Default => !schema.is_restricted(column),
            Self::All => true,
            Self::Except(excluded) => !excluded.iter().any(|name| name == column),
            Self::Only(included) => included.iter().any(|name| name == column),
        }
    }
}

/// Record construction and assignment errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    NilUuid,
    UnknownColumn { model: ModelName, column: String },
    RestrictedColumn { model: ModelName, column: String },
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilUuid => write!(f, "record uuid must not be nil"),
            Self::UnknownColumn { model, column } => {
                write!(f, "column `{column}` does not exist on model `{model}`")
            }
            Self::RestrictedColumn { model, column } => {
                write!(f, "access to column `{column}` is restricted on model `{model}`")
            }
        }
    }
}

impl Error for RecordError {}

/// One model instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub model: ModelName,
    pub uuid: RecordId,
    pub values: Attributes,
    /// `true` once the record has a stored row.
    pub persisted: bool,
}

impl Record {
    /// Creates an empty, not yet persisted record with a generated id.
    pub fn new(model: impl Into<ModelName>) -> Self {
        Self {
            model: model.into(),
            uuid: Uuid::new_v4(),
            values: Attributes::new(),
            persisted: false,
        }
    }

    /// Creates an empty record with a caller-provided id.
    ///
    /// Used when hydrating stored rows.
    pub fn with_id(model: impl Into<ModelName>, uuid: RecordId) -> Result<Self, RecordError> {
        if uuid.is_nil() {
            return Err(RecordError::NilUuid);
        }
        Ok(Self {
            model: model.into(),
            uuid,
            values: Attributes::new(),
            persisted: false,
        })
    }

    /// Builds a new record of `schema`'s model from `attributes` under default
    /// assignment rules.
    pub fn build(schema: &ModelSchema, attributes: &Attributes) -> Result<Self, RecordError> {
        let mut record = Self::new(schema.name.clone());
        record.assign(schema, attributes, AssignMode::Default)?;
        Ok(record)
    }

    /// Builds a record from whatever keys of `attributes` are assignable.
    ///
    /// Never fails; unknown or restricted keys are skipped.
    pub fn build_lenient(schema: &ModelSchema, attributes: &Attributes) -> Self {
        let mut record = Self::new(schema.name.clone());
        record.assign_lenient(schema, attributes, AssignMode::Default);
        record
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn is_new(&self) -> bool {
        !self.persisted
    }

    /// Assigns every key of `attributes`, or none of them.
    ///
    /// Returns the assigned column names in key order.
    ///
    /// # Errors
    /// - `UnknownColumn` when a key is not a declared column.
    /// - `RestrictedColumn` when `mode` disallows a declared column.
    pub fn assign(
        &mut self,
        schema: &ModelSchema,
        attributes: &Attributes,
        mode: AssignMode<'_>,
    ) -> Result<Vec<String>, RecordError> {
        for column in attributes.keys() {
            if !schema.has_column(column) {
                return Err(RecordError::UnknownColumn {
                    model: schema.name.clone(),
                    column: column.clone(),
                });
            }
            if !mode.allows(schema, column) {
                return Err(RecordError::RestrictedColumn {
                    model: schema.name.clone(),
                    column: column.clone(),
                });
            }
        }

        for (column, value) in attributes {
            self.values.insert(column.clone(), value.clone());
        }
        Ok(attributes.keys().cloned().collect())
    }

    /// Assigns the allowed subset of `attributes` and skips the rest.
    pub fn assign_lenient(
        &mut self,
        schema: &ModelSchema,
        attributes: &Attributes,
        mode: AssignMode<'_>,
    ) {
        for (column, value) in attributes {
            if schema.has_column(column) && mode.allows(schema, column) {
                self.values.insert(column.clone(), value.clone());
            }
        }
    }
}
