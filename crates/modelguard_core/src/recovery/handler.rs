//! Recovery handlers, verdicts and handler-chain resolution.
//!
//! # Responsibility
//! - Define what a handler is and what it may answer.
//! - Normalize the handler argument of a lifecycle call into one ordered chain.
//!
//! # Invariants
//! - Chain order is caller order; nested lists are flattened one level only.
//! - Handlers are per-call values and are never stored past the call.

use crate::model::record::Record;
use crate::recovery::error::ArgumentShapeError;
use crate::recovery::evaluator::FailureContext;
use std::fmt::{Debug, Formatter};

/// One handler's answer for one failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Decline; the next handler is asked.
    Empty,
    /// Propagate the original failure.
    Raise,
    /// Run the operation again with the (possibly edited) attempted values.
    Retry,
    /// Use this record as the operation's result.
    Replace(Record),
    /// Any other value. Always rejected as a contract violation.
    Payload(serde_json::Value),
}

impl Verdict {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<Record> for Verdict {
    fn from(value: Record) -> Self {
        Self::Replace(value)
    }
}

impl From<Option<Record>> for Verdict {
    fn from(value: Option<Record>) -> Self {
        value.map_or(Self::Empty, Self::Replace)
    }
}

/// Lists below this depth (a list inside a list inside the argument) are rejected.
const MAX_LIST_DEPTH: usize = 2;

type HandlerFn<'h, E> = dyn FnMut(&mut FailureContext<'_, E>) -> Verdict + 'h;

/// Caller-supplied recovery function.
///
/// Handlers read the failing model, the original failure and the attempted
/// values from the context, and may edit `context.attempted` before asking for
/// a retry.
pub struct Handler<'h, E> {
    call: Box<HandlerFn<'h, E>>,
}

impl<'h, E> Handler<'h, E> {
    pub fn new<F>(call: F) -> Self
    where
        F: FnMut(&mut FailureContext<'_, E>) -> Verdict + 'h,
    {
        Self {
            call: Box::new(call),
        }
    }

    pub fn call(&mut self, context: &mut FailureContext<'_, E>) -> Verdict {
        (self.call)(context)
    }
}

impl<E> Debug for Handler<'_, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// Loosely shaped handler argument: one handler or a (nested) list.
#[derive(Debug)]
pub enum HandlerArg<'h, E> {
    One(Handler<'h, E>),
    Many(Vec<HandlerArg<'h, E>>),
}

impl<'h, E> From<Handler<'h, E>> for HandlerArg<'h, E> {
    fn from(value: Handler<'h, E>) -> Self {
        Self::One(value)
    }
}

impl<'h, E> From<Vec<Handler<'h, E>>> for HandlerArg<'h, E> {
    fn from(value: Vec<Handler<'h, E>>) -> Self {
        Self::Many(value.into_iter().map(Self::One).collect())
    }
}

/// Ordered handlers for one lifecycle call.
#[derive(Debug)]
pub struct HandlerChain<'h, E> {
    handlers: Vec<Handler<'h, E>>,
}

impl<'h, E> HandlerChain<'h, E> {
    /// Chain with no handlers; every failure propagates.
    pub fn none() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Flattens loosely shaped handler arguments into one chain.
    ///
    /// Accepts handlers, lists of handlers, and lists whose entries are
    /// themselves lists of handlers.
    ///
    /// # Errors
    /// - `ArgumentShapeError` when lists nest more than one level deep.
    pub fn resolve<I>(args: I) -> Result<Self, ArgumentShapeError>
    where
        I: IntoIterator<Item = HandlerArg<'h, E>>,
    {
        let mut handlers = Vec::new();
        for (position, arg) in args.into_iter().enumerate() {
            collect_handlers(arg, 0, position, &mut handlers)?;
        }
        Ok(Self { handlers })
    }

    /// Appends one handler at the end of the chain.
    pub fn then(mut self, handler: Handler<'h, E>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Handler<'h, E>> {
        self.handlers.iter_mut()
    }
}

impl<E> Default for HandlerChain<'_, E> {
    fn default() -> Self {
        Self::none()
    }
}

impl<'h, E> From<Handler<'h, E>> for HandlerChain<'h, E> {
    fn from(value: Handler<'h, E>) -> Self {
        Self {
            handlers: vec![value],
        }
    }
}

impl<'h, E> From<Vec<Handler<'h, E>>> for HandlerChain<'h, E> {
    fn from(value: Vec<Handler<'h, E>>) -> Self {
        Self { handlers: value }
    }
}

impl<'h, E> From<Option<Handler<'h, E>>> for HandlerChain<'h, E> {
    fn from(value: Option<Handler<'h, E>>) -> Self {
        Self {
            handlers: value.into_iter().collect(),
        }
    }
}

fn collect_handlers<'h, E>(
    arg: HandlerArg<'h, E>,
    depth: usize,
    position: usize,
    out: &mut Vec<Handler<'h, E>>,
) -> Result<(), ArgumentShapeError> {
    match arg {
        HandlerArg::One(handler) => out.push(handler),
        HandlerArg::Many(_) if depth >= MAX_LIST_DEPTH => {
            return Err(ArgumentShapeError::new(format!(
                "handler argument {position} nests lists more than one level deep"
            )));
        }
        HandlerArg::Many(items) => {
            for item in items {
                collect_handlers(item, depth + 1, position, out)?;
            }
        }
    }
    Ok(())
}
