//! Error taxonomy of the recovery protocol.

use crate::model::record::ModelName;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RecoveryResult<T, E> = Result<T, RecoveryError<E>>;

/// Handler or column-filter arguments could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentShapeError {
    message: String,
}

impl ArgumentShapeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ArgumentShapeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid lifecycle arguments: {}", self.message)
    }
}

impl Error for ArgumentShapeError {}

/// A handler returned something outside `Empty | Raise | Retry | same-model record`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractViolation {
    pub model: ModelName,
    /// Short description of what the handler returned.
    pub returned: String,
}

impl Display for ContractViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "an error handler for `{}` must return Empty, Raise, Retry or an instance of `{}`, got {}",
            self.model, self.model, self.returned
        )
    }
}

impl Error for ContractViolation {}

/// Outcome of a lifecycle operation that was not recovered.
#[derive(Debug)]
pub enum RecoveryError<E> {
    /// The collaborator's failure, surfaced unchanged.
    Original(E),
    ContractViolation(ContractViolation),
    ArgumentShape(ArgumentShapeError),
    /// Handlers kept asking for retries past the configured attempt limit.
    RetryLimitExceeded {
        model: ModelName,
        attempts: u32,
        last: E,
    },
}

impl<E> RecoveryError<E> {
    /// Returns the collaborator failure carried by this error, if any.
    pub fn original(&self) -> Option<&E> {
        match self {
            Self::Original(err) | Self::RetryLimitExceeded { last: err, .. } => Some(err),
            Self::ContractViolation(_) | Self::ArgumentShape(_) => None,
        }
    }

    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::ContractViolation(_))
    }

    /// Consumes the error and returns the collaborator failure, if any.
    pub fn into_original(self) -> Option<E> {
        match self {
            Self::Original(err) | Self::RetryLimitExceeded { last: err, .. } => Some(err),
            Self::ContractViolation(_) | Self::ArgumentShape(_) => None,
        }
    }
}

impl<E: Display> Display for RecoveryError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Original(err) => write!(f, "{err}"),
            Self::ContractViolation(err) => write!(f, "{err}"),
            Self::ArgumentShape(err) => write!(f, "{err}"),
            Self::RetryLimitExceeded {
                model,
                attempts,
                last,
            } => write!(
                f,
                "gave up on `{model}` after {attempts} attempts; last failure: {last}"
            ),
        }
    }
}

impl<E: Error + 'static> Error for RecoveryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Original(err) => Some(err),
            Self::RetryLimitExceeded { last, .. } => Some(last),
            Self::ContractViolation(err) => Some(err),
            Self::ArgumentShape(err) => Some(err),
        }
    }
}

impl<E> From<ArgumentShapeError> for RecoveryError<E> {
    fn from(value: ArgumentShapeError) -> Self {
        Self::ArgumentShape(value)
    }
}

impl<E> From<ContractViolation> for RecoveryError<E> {
    fn from(value: ContractViolation) -> Self {
        Self::ContractViolation(value)
    }
}
