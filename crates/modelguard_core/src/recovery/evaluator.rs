//! Handler chain evaluation for one failed attempt.
//!
//! # Invariants
//! - The first non-empty verdict wins; later handlers are not called.
//! - One context per failed attempt; every handler of that attempt sees it.
//! - The evaluator never retries; it produces exactly one verdict.

use crate::model::record::{Attributes, ModelName, Record};
use crate::recovery::handler::{HandlerChain, Verdict};

/// Everything a handler knows about one failed attempt.
#[derive(Debug)]
pub struct FailureContext<'a, E> {
    /// Model type whose lifecycle operation failed.
    pub model: &'a ModelName,
    /// The instance the operation ran on; `None` for construct/create.
    pub receiver: Option<&'a Record>,
    /// Values the operation was attempted with. Edits survive into a retry.
    pub attempted: &'a mut Attributes,
    /// Failure raised by the persistence collaborator.
    pub failure: &'a E,
    /// 1-based attempt number.
    pub attempt: u32,
}

impl<'a, E> FailureContext<'a, E> {
    pub fn new(
        model: &'a ModelName,
        receiver: Option<&'a Record>,
        attempted: &'a mut Attributes,
        failure: &'a E,
        attempt: u32,
    ) -> Self {
        Self {
            model,
            receiver,
            attempted,
            failure,
            attempt,
        }
    }
}

/// Runs `chain` left to right and returns the first non-empty verdict.
pub fn evaluate<E>(
    chain: &mut HandlerChain<'_, E>,
    context: &mut FailureContext<'_, E>,
) -> Verdict {
    for handler in chain.iter_mut() {
        let verdict = handler.call(context);
        if !verdict.is_empty() {
            return verdict;
        }
    }
    Verdict::Empty
}
