//! Operation wrapper: the attempt/evaluate/act loop around one lifecycle call.
//!
//! # Responsibility
//! - Run an underlying lifecycle operation and feed failures to the chain.
//! - Turn the interpreted action into retry, substitution or propagation.
//!
//! # Invariants
//! - Each failed attempt gets a fresh `FailureContext` and one chain run.
//! - The observer fires at most once per call, and only on an unrecovered
//!   path (propagate or retry limit). Replacements and contract violations
//!   never notify.
//! - The loop ends when a handler stops asking for retries or the configured
//!   attempt limit is reached.

use crate::model::record::{Attributes, ModelName, Record};
use crate::recovery::error::{RecoveryError, RecoveryResult};
use crate::recovery::evaluator::{evaluate, FailureContext};
use crate::recovery::handler::HandlerChain;
use crate::recovery::observer::ErrorObserverRegistry;
use crate::recovery::outcome::{interpret, Action};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;

/// Attempt limit applied when no configuration is given.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;

/// Retry policy of the operation wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Total attempts allowed per call, first attempt included.
    /// `None` lets handlers retry forever.
    pub max_attempts: Option<u32>,
}

impl RecoveryConfig {
    /// Config without an attempt limit.
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    fn limit_reached(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
        }
    }
}

/// Underlying lifecycle operation driven by the wrapper.
pub trait LifecycleOperation {
    type Error: Error;

    /// Stable operation name used in log events.
    fn name(&self) -> &'static str;

    /// Instance the operation runs on, if it is an instance operation.
    fn receiver(&self) -> Option<&Record> {
        None
    }

    /// Performs one attempt with `values`.
    fn attempt(&mut self, values: &Attributes) -> Result<Record, Self::Error>;

    /// Best available instance for the failing state, built without recovery.
    fn failing_instance(&self, values: &Attributes) -> Record;
}

/// Decorates lifecycle operations with handler-chain recovery.
#[derive(Debug, Clone, Copy)]
pub struct OperationWrapper<'a> {
    config: &'a RecoveryConfig,
    observers: &'a ErrorObserverRegistry,
}

impl<'a> OperationWrapper<'a> {
    pub fn new(config: &'a RecoveryConfig, observers: &'a ErrorObserverRegistry) -> Self {
        Self { config, observers }
    }

    /// Runs `operation` until it succeeds, is substituted, or gives up.
    ///
    /// # Errors
    /// - `Original` with the last failure when the chain does not recover it.
    /// - `ContractViolation` when a handler answers outside the contract.
    /// - `RetryLimitExceeded` when retries hit `RecoveryConfig::max_attempts`.
    pub fn run<O>(
        &self,
        model: &ModelName,
        operation: &mut O,
        attempted: Attributes,
        chain: &mut HandlerChain<'_, O::Error>,
    ) -> RecoveryResult<Record, O::Error>
    where
        O: LifecycleOperation + ?Sized,
    {
        let op = operation.name();
        let mut attempted = attempted;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let failure = match operation.attempt(&attempted) {
                Ok(record) => {
                    if attempt > 1 {
                        info!(
                            "event=lifecycle_recovered module=recovery status=ok op={} model={} attempts={}",
                            op, model, attempt
                        );
                    }
                    return Ok(record);
                }
                Err(failure) => failure,
            };

            warn!(
                "event=lifecycle_attempt_failed module=recovery status=error op={} model={} attempt={} handlers={} error={}",
                op,
                model,
                attempt,
                chain.len(),
                failure
            );

            let action = {
                let mut context = FailureContext::new(
                    model,
                    operation.receiver(),
                    &mut attempted,
                    &failure,
                    attempt,
                );
                let verdict = evaluate(chain, &mut context);
                interpret(verdict, &context)
            };

            match action {
                Ok(Action::Retry) if self.config.limit_reached(attempt) => {
                    error!(
                        "event=lifecycle_retry_limit module=recovery status=error op={} model={} attempts={}",
                        op, model, attempt
                    );
                    self.observers
                        .notify(model, &operation.failing_instance(&attempted));
                    return Err(RecoveryError::RetryLimitExceeded {
                        model: model.clone(),
                        attempts: attempt,
                        last: failure,
                    });
                }
                Ok(Action::Retry) => {
                    info!(
                        "event=lifecycle_retry module=recovery status=retry op={} model={} attempt={}",
                        op, model, attempt
                    );
                }
                Ok(Action::Succeed(record)) => {
                    info!(
                        "event=lifecycle_replaced module=recovery status=ok op={} model={} attempt={}",
                        op, model, attempt
                    );
                    return Ok(record);
                }
                Ok(Action::Propagate) => {
                    warn!(
                        "event=lifecycle_propagate module=recovery status=error op={} model={} attempt={}",
                        op, model, attempt
                    );
                    self.observers
                        .notify(model, &operation.failing_instance(&attempted));
                    return Err(RecoveryError::Original(failure));
                }
                Err(violation) => {
                    error!(
                        "event=lifecycle_contract_violation module=recovery status=error op={} model={} attempt={} error={}",
                        op, model, attempt, violation
                    );
                    return Err(RecoveryError::ContractViolation(violation));
                }
            }
        }
    }
}
