//! # Engine Error Types
//!
//! One taxonomy for every engine operation. The HTTP layer maps each variant
//! to a status code; nothing here knows about HTTP.

use thiserror::Error;

use rosp_state::{PaymentError, TransitionError};

#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Missing or malformed input. Never retried.
    #[error("{0}")]
    Validation(String),

    /// Email or company number already registered.
    #[error("{}", duplicate_message(*.email_taken, *.company_taken))]
    DuplicateIdentity {
        email_taken: bool,
        company_taken: bool,
    },

    /// The current status does not allow the attempted action.
    #[error("{0}")]
    InvalidTransition(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The payment event was already applied; nothing was changed.
    #[error("payment event {token} already applied")]
    DuplicateEvent { token: String },

    /// Another writer changed the record since it was read.
    #[error("{entity} {id} was modified concurrently")]
    ConcurrentModification { entity: &'static str, id: String },

    /// A collaborator call that is the operation itself failed.
    #[error("{service} call failed: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
    },

    /// The unit of work could not commit. Detail is for logs only.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

fn duplicate_message(email_taken: bool, company_taken: bool) -> &'static str {
    match (email_taken, company_taken) {
        (true, true) => "email address and company number are already registered",
        (true, false) => "email address is already registered",
        _ => "company number is already registered",
    }
}

impl LifecycleError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<TransitionError> for LifecycleError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::ReasonRequired { .. }
            | TransitionError::UnknownAction(_)
            | TransitionError::UnknownStatus(_) => Self::Validation(err.to_string()),
            TransitionError::InvalidTransition { .. } | TransitionError::GuardRejected { .. } => {
                Self::InvalidTransition(err.to_string())
            }
        }
    }
}

impl From<PaymentError> for LifecycleError {
    fn from(err: PaymentError) -> Self {
        Self::InvalidTransition(err.to_string())
    }
}

impl From<rosp_core::ValidationError> for LifecycleError {
    fn from(err: rosp_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<sqlx::Error> for LifecycleError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for LifecycleError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosp_state::{AdminAction, SubscriptionStatus, Trigger};

    #[test]
    fn missing_reason_is_validation() {
        let err: LifecycleError = TransitionError::ReasonRequired {
            action: AdminAction::Reject,
        }
        .into();
        assert!(matches!(err, LifecycleError::Validation(_)));
    }

    #[test]
    fn invalid_pair_keeps_state_and_action_in_message() {
        let err: LifecycleError = TransitionError::InvalidTransition {
            from: SubscriptionStatus::Withdrawn,
            action: Trigger::Admin(AdminAction::Approve),
        }
        .into();
        assert_eq!(err.to_string(), "cannot APPROVE a subscription in status WITHDRAWN");
    }

    #[test]
    fn duplicate_identity_message() {
        let err = LifecycleError::DuplicateIdentity {
            email_taken: true,
            company_taken: false,
        };
        assert_eq!(err.to_string(), "email address is already registered");
    }
}
