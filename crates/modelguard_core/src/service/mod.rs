//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls and the recovery protocol into lifecycle APIs.
//! - Keep callers decoupled from storage details.

pub mod model_service;
mod operations;

pub use model_service::{
    ModelService, RecordHandler, RecordHandlerChain, ServiceError, ServiceResult,
};
