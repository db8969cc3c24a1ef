//! Model use-case service.
//!
//! # Responsibility
//! - Own model schemas, the error observer registry and the retry policy.
//! - Expose lifecycle operations wrapped with handler-chain recovery.
//! - Delegate persistence to repository implementations.
//!
//! # Invariants
//! - Every lifecycle call goes through `OperationWrapper::run`.
//! - A caller's `&mut Record` changes only when the underlying operation
//!   itself succeeds, never on a handler replacement.
//! - Column filters are checked before the first attempt.

use crate::model::record::{AssignMode, Attributes, ModelName, Record, RecordId};
use crate::model::schema::{ModelSchema, SchemaError};
use crate::recovery::error::{ArgumentShapeError, RecoveryError};
use crate::recovery::handler::{Handler, HandlerChain};
use crate::recovery::observer::{ErrorObserverRegistry, HierarchyError};
use crate::recovery::wrapper::{OperationWrapper, RecoveryConfig};
use crate::repo::record_repo::{RecordRepository, RepoError};
use crate::service::operations::{
    ConstructOperation, CreateOperation, SaveOperation, UpdateOperation,
};
use log::info;
use rusqlite::types::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Handler over the SQLite record stack.
pub type RecordHandler<'h> = Handler<'h, RepoError>;
/// Handler chain over the SQLite record stack.
pub type RecordHandlerChain<'h> = HandlerChain<'h, RepoError>;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by `ModelService`.
#[derive(Debug)]
pub enum ServiceError {
    UnknownModel(String),
    /// A model name was redefined with a different schema.
    DuplicateModel(ModelName),
    Schema(SchemaError),
    Hierarchy(HierarchyError),
    /// Setup and read failures outside the recovery protocol.
    Repo(RepoError),
    /// Unrecovered lifecycle failures.
    Recovery(RecoveryError<RepoError>),
}

impl ServiceError {
    /// Returns the recovery error of a failed lifecycle call.
    pub fn recovery(&self) -> Option<&RecoveryError<RepoError>> {
        match self {
            Self::Recovery(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the repository failure carried by this error, if any.
    pub fn original(&self) -> Option<&RepoError> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Recovery(err) => err.original(),
            _ => None,
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownModel(model) => write!(f, "model `{model}` is not defined"),
            Self::DuplicateModel(model) => {
                write!(f, "model `{model}` is already defined with a different schema")
            }
            Self::Schema(err) => write!(f, "{err}"),
            Self::Hierarchy(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Recovery(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::UnknownModel(_) | Self::DuplicateModel(_) => None,
            Self::Schema(err) => Some(err),
            Self::Hierarchy(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Recovery(err) => Some(err),
        }
    }
}

impl From<SchemaError> for ServiceError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<HierarchyError> for ServiceError {
    fn from(value: HierarchyError) -> Self {
        Self::Hierarchy(value)
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<RecoveryError<RepoError>> for ServiceError {
    fn from(value: RecoveryError<RepoError>) -> Self {
        Self::Recovery(value)
    }
}

impl From<ArgumentShapeError> for ServiceError {
    fn from(value: ArgumentShapeError) -> Self {
        Self::Recovery(RecoveryError::ArgumentShape(value))
    }
}

/// Use-case service wrapper for model lifecycle operations.
pub struct ModelService<R: RecordRepository> {
    repo: R,
    schemas: BTreeMap<ModelName, ModelSchema>,
    observers: ErrorObserverRegistry,
    config: RecoveryConfig,
}

impl<R: RecordRepository> ModelService<R> {
    /// Creates a service with the default retry policy.
    pub fn new(repo: R) -> Self {
        Self::with_config(repo, RecoveryConfig::default())
    }

    pub fn with_config(repo: R, config: RecoveryConfig) -> Self {
        Self {
            repo,
            schemas: BTreeMap::new(),
            observers: ErrorObserverRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn observers(&self) -> &ErrorObserverRegistry {
        &self.observers
    }

    /// Registers a model, creating its table when missing.
    ///
    /// Defining the same schema twice is a no-op.
    ///
    /// # Errors
    /// - `Schema` when names are malformed.
    /// - `DuplicateModel` when the name is taken by a different schema.
    /// - `Hierarchy` when the parent model is not defined yet.
    /// - `Repo` when the table cannot be created.
    pub fn define_model(&mut self, schema: ModelSchema) -> ServiceResult<()> {
        schema.validate()?;
        if let Some(existing) = self.schemas.get(&schema.name) {
            if *existing == schema {
                return Ok(());
            }
            return Err(ServiceError::DuplicateModel(schema.name));
        }

        self.observers
            .check_type(&schema.name, schema.parent.as_ref())?;
        self.repo.ensure_table(&schema)?;
        self.observers
            .declare_type(schema.name.clone(), schema.parent.clone())?;

        info!(
            "event=model_define module=service status=ok model={} table={} columns={} parent={}",
            schema.name,
            schema.table,
            schema.columns.len(),
            schema.parent.as_ref().map_or("-", ModelName::as_str)
        );
        self.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    pub fn schema(&self, model: &str) -> ServiceResult<&ModelSchema> {
        self.schemas
            .get(model)
            .ok_or_else(|| ServiceError::UnknownModel(model.to_string()))
    }

    /// Sets the error observer of `model`, replacing any previous one.
    ///
    /// Subtypes without their own observer fall back to this one.
    pub fn register_error_observer<F>(&mut self, model: &str, observer: F) -> ServiceResult<()>
    where
        F: Fn(&Record) + Send + Sync + 'static,
    {
        let name = self.schema(model)?.name.clone();
        self.observers.register(&name, Box::new(observer))?;
        Ok(())
    }

    /// Builds a new, unsaved record.
    pub fn construct<'h>(
        &self,
        model: &str,
        attributes: Attributes,
        handlers: impl Into<RecordHandlerChain<'h>>,
    ) -> ServiceResult<Record> {
        let schema = self.schema(model)?;
        let mut chain = handlers.into();
        let mut operation = ConstructOperation::new(schema);
        let record = self
            .wrapper()
            .run(&schema.name, &mut operation, attributes, &mut chain)?;
        Ok(record)
    }

    /// Builds and inserts a new record.
    pub fn create<'h>(
        &self,
        model: &str,
        attributes: Attributes,
        handlers: impl Into<RecordHandlerChain<'h>>,
    ) -> ServiceResult<Record> {
        let schema = self.schema(model)?;
        let mut chain = handlers.into();
        let mut operation = CreateOperation::new(schema, &self.repo);
        let record = self
            .wrapper()
            .run(&schema.name, &mut operation, attributes, &mut chain)?;
        Ok(record)
    }

    /// Assigns `attributes` under default restrictions and saves the changes.
    pub fn update<'h>(
        &self,
        record: &mut Record,
        attributes: Attributes,
        handlers: impl Into<RecordHandlerChain<'h>>,
    ) -> ServiceResult<Record> {
        let schema = self.schema(record.model.as_str())?;
        self.run_update(
            "update",
            schema,
            record,
            attributes,
            AssignMode::Default,
            handlers.into(),
        )
    }

    /// Like `update`, ignoring column restrictions.
    pub fn update_all<'h>(
        &self,
        record: &mut Record,
        attributes: Attributes,
        handlers: impl Into<RecordHandlerChain<'h>>,
    ) -> ServiceResult<Record> {
        let schema = self.schema(record.model.as_str())?;
        self.run_update(
            "update_all",
            schema,
            record,
            attributes,
            AssignMode::All,
            handlers.into(),
        )
    }

    /// Like `update`, skipping keys listed in `excluded`.
    ///
    /// The attempted values are the filtered map; a handler that adds an
    /// excluded key back makes the retry fail assignment.
    pub fn update_except<'h>(
        &self,
        record: &mut Record,
        mut attributes: Attributes,
        excluded: &[&str],
        handlers: impl Into<RecordHandlerChain<'h>>,
    ) -> ServiceResult<Record> {
        let schema = self.schema(record.model.as_str())?;
        let excluded = column_filter(schema, excluded)?;
        attributes.retain(|column, _| !excluded.contains(column));
        self.run_update(
            "update_except",
            schema,
            record,
            attributes,
            AssignMode::Except(&excluded),
            handlers.into(),
        )
    }

    /// Like `update`, keeping only keys listed in `included`.
    pub fn update_only<'h>(
        &self,
        record: &mut Record,
        mut attributes: Attributes,
        included: &[&str],
        handlers: impl Into<RecordHandlerChain<'h>>,
    ) -> ServiceResult<Record> {
        let schema = self.schema(record.model.as_str())?;
        let included = column_filter(schema, included)?;
        attributes.retain(|column, _| included.contains(column));
        self.run_update(
            "update_only",
            schema,
            record,
            attributes,
            AssignMode::Only(&included),
            handlers.into(),
        )
    }

    /// Inserts a new record or writes `columns` of a stored one (all when empty).
    ///
    /// The attempted values are the record's full value map.
    pub fn save<'h>(
        &self,
        record: &mut Record,
        columns: &[&str],
        handlers: impl Into<RecordHandlerChain<'h>>,
    ) -> ServiceResult<Record> {
        let schema = self.schema(record.model.as_str())?;
        let columns = column_filter(schema, columns)?;
        let mut chain = handlers.into();
        let attempted = record.values.clone();

        let mut operation = SaveOperation::new(schema, &self.repo, record.clone(), columns);
        let result = self
            .wrapper()
            .run(&schema.name, &mut operation, attempted, &mut chain);
        if let Some(saved) = operation.into_saved() {
            *record = saved;
        }
        Ok(result?)
    }

    pub fn find(&self, model: &str, id: RecordId) -> ServiceResult<Option<Record>> {
        let schema = self.schema(model)?;
        Ok(self.repo.get(schema, id)?)
    }

    pub fn find_by(
        &self,
        model: &str,
        column: &str,
        value: &Value,
    ) -> ServiceResult<Option<Record>> {
        let schema = self.schema(model)?;
        Ok(self.repo.find_by(schema, column, value)?)
    }

    pub fn list(&self, model: &str) -> ServiceResult<Vec<Record>> {
        let schema = self.schema(model)?;
        Ok(self.repo.list(schema)?)
    }

    fn wrapper(&self) -> OperationWrapper<'_> {
        OperationWrapper::new(&self.config, &self.observers)
    }

    fn run_update(
        &self,
        name: &'static str,
        schema: &ModelSchema,
        record: &mut Record,
        attributes: Attributes,
        mode: AssignMode<'_>,
        mut chain: RecordHandlerChain<'_>,
    ) -> ServiceResult<Record> {
        let mut operation = UpdateOperation::new(name, schema, &self.repo, record.clone(), mode);
        let result = self
            .wrapper()
            .run(&schema.name, &mut operation, attributes, &mut chain);
        if let Some(updated) = operation.into_updated() {
            *record = updated;
        }
        Ok(result?)
    }
}

/// Normalizes a caller column list against `schema`.
fn column_filter(
    schema: &ModelSchema,
    columns: &[&str],
) -> Result<Vec<String>, ArgumentShapeError> {
    let mut normalized = Vec::with_capacity(columns.len());
    for column in columns {
        let column = column.trim();
        if column.is_empty() {
            return Err(ArgumentShapeError::new(format!(
                "column filter for `{}` contains a blank name",
                schema.name
            )));
        }
        if !schema.has_column(column) {
            return Err(ArgumentShapeError::new(format!(
                "column filter for `{}` names unknown column `{column}`",
                schema.name
            )));
        }
        if !normalized.iter().any(|existing| existing == column) {
            normalized.push(column.to_string());
        }
    }
    Ok(normalized)
}
