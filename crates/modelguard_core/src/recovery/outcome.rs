//! Verdict interpretation.
//!
//! Pure mapping from a verdict to the wrapper's next action. It never touches
//! the observer registry.

use crate::model::record::Record;
use crate::recovery::error::ContractViolation;
use crate::recovery::evaluator::FailureContext;
use crate::recovery::handler::Verdict;

/// What the operation wrapper does after one evaluated attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Propagate,
    Retry,
    Succeed(Record),
}

/// Maps `verdict` to an action, enforcing the handler return contract.
///
/// # Errors
/// - `ContractViolation` for a `Payload`, or for a replacement record whose
///   model is not exactly `context.model`.
pub fn interpret<E>(
    verdict: Verdict,
    context: &FailureContext<'_, E>,
) -> Result<Action, ContractViolation> {
    match verdict {
        Verdict::Empty | Verdict::Raise => Ok(Action::Propagate),
        Verdict::Retry => Ok(Action::Retry),
        Verdict::Replace(record) if &record.model == context.model => Ok(Action::Succeed(record)),
        Verdict::Replace(record) => Err(ContractViolation {
            model: context.model.clone(),
            returned: format!("an instance of `{}`", record.model),
        }),
        Verdict::Payload(value) => Err(ContractViolation {
            model: context.model.clone(),
            returned: format!("the value `{value}`"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{interpret, Action};
    use crate::model::record::{Attributes, ModelName, Record};
    use crate::recovery::evaluator::FailureContext;
    use crate::recovery::handler::Verdict;
    use serde_json::json;
    use std::io;

    fn with_context<T>(check: impl FnOnce(&FailureContext<'_, io::Error>) -> T) -> T {
        let model = ModelName::new("Foo");
        let failure = io::Error::other("boom");
        let mut attempted = Attributes::new();
        let context = FailureContext::new(&model, None, &mut attempted, &failure, 1);
        check(&context)
    }

    #[test]
    fn empty_and_raise_propagate() {
        with_context(|context| {
            assert_eq!(interpret(Verdict::Empty, context).unwrap(), Action::Propagate);
            assert_eq!(interpret(Verdict::Raise, context).unwrap(), Action::Propagate);
            assert_eq!(interpret(Verdict::Retry, context).unwrap(), Action::Retry);
        });
    }

    #[test]
    fn same_model_replacement_succeeds() {
        with_context(|context| {
            let record = Record::new("Foo");
            assert_eq!(
                interpret(Verdict::Replace(record.clone()), context).unwrap(),
                Action::Succeed(record)
            );
        });
    }

    #[test]
    fn foreign_model_replacement_is_a_contract_violation() {
        with_context(|context| {
            let err = interpret(Verdict::Replace(Record::new("Bar")), context).unwrap_err();
            assert_eq!(err.model, ModelName::new("Foo"));
            assert!(err.returned.contains("Bar"));
        });
    }

    #[test]
    fn false_payload_is_a_contract_violation_not_a_result() {
        with_context(|context| {
            let err = interpret(Verdict::Payload(json!(false)), context).unwrap_err();
            assert_eq!(err.returned, "the value `false`");
            assert!(err.to_string().contains("must return Empty, Raise, Retry"));
        });
    }
}
