//! Core domain logic for modelguard.
//!
//! Lifecycle operations over SQLite-backed model records, wrapped with a
//! caller-driven error-recovery protocol.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod recovery;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig, LoggingConfig};
pub use db::{open_db, open_db_in_memory, Database, DatabaseUrl, DbError, DbResult};
pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LoggingError,
};
pub use model::record::{AssignMode, Attributes, ModelName, Record, RecordError, RecordId};
pub use model::schema::{ColumnDef, ModelSchema, SchemaError, PRIMARY_KEY_COLUMN};
pub use model::validation::{
    FieldError, ValidationFailure, MESSAGE_NOT_PRESENT, MESSAGE_NOT_UNIQUE,
};
pub use recovery::{
    ArgumentShapeError, ContractViolation, ErrorObserverRegistry, FailureContext, Handler,
    HandlerArg, HandlerChain, HierarchyError, LifecycleOperation, RecoveryConfig, RecoveryError,
    Verdict,
};
pub use repo::record_repo::{RecordRepository, RepoError, RepoResult, SqliteRecordRepository};
pub use rusqlite::types::Value;
pub use service::{
    ModelService, RecordHandler, RecordHandlerChain, ServiceError, ServiceResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Builds an attribute map of text values.
pub fn text_attributes<'a, I>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(column, value)| (column.to_string(), Value::Text(value.to_string())))
        .collect()
}
