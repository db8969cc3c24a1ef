//! Error-recovery protocol around lifecycle operations.
//!
//! # Responsibility
//! - Collect caller handlers into an ordered chain (`handler`).
//! - Evaluate the chain against one failed attempt (`evaluator`).
//! - Map the verdict to retry, substitution or propagation (`outcome`).
//! - Drive the attempt loop around an underlying operation (`wrapper`).
//! - Notify the nearest registered error observer on unrecovered failures
//!   (`observer`).
//!
//! # Invariants
//! - A failure is never swallowed: it is recovered by a handler verdict or it
//!   reaches the caller.
//! - Observers fire exactly once per unrecovered call.

pub mod error;
pub mod evaluator;
pub mod handler;
pub mod observer;
pub mod outcome;
pub mod wrapper;

pub use error::{ArgumentShapeError, ContractViolation, RecoveryError, RecoveryResult};
pub use evaluator::{evaluate, FailureContext};
pub use handler::{Handler, HandlerArg, HandlerChain, Verdict};
pub use observer::{ErrorObserver, ErrorObserverRegistry, HierarchyError, TypeHierarchy};
pub use outcome::{interpret, Action};
pub use wrapper::{LifecycleOperation, OperationWrapper, RecoveryConfig, DEFAULT_MAX_ATTEMPTS};
