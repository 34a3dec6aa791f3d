//! Error taxonomy for workflow operations.

use crate::store::{Constraint, StoreError};
use crate::types::{RegistrationStatus, TicketStatus};
use thiserror::Error;

/// Result type alias for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors returned by the registration workflow and its collaborators.
///
/// Store-level failures are translated into these kinds before they reach a
/// caller; only genuinely unexpected persistence failures surface as
/// [`WorkflowError::Store`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Malformed input; retry with corrected input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The user already holds an active registration for the event.
    #[error("An active registration already exists for this event")]
    DuplicateRegistration,

    /// Not enough tickets of the requested type are left.
    #[error("Only {available} '{ticket_type}' tickets left, {requested} requested")]
    OutOfStock {
        /// Ticket type name
        ticket_type: String,
        /// Tickets requested
        requested: u32,
        /// Tickets still available
        available: u32,
    },

    /// The registration is not in a state that allows the operation.
    #[error("Cannot {operation} a registration that is {status}")]
    InvalidTransition {
        /// Attempted operation
        operation: &'static str,
        /// Current status
        status: RegistrationStatus,
    },

    /// A ticket was already issued for the registration.
    #[error("A ticket has already been issued for this registration")]
    AlreadyIssued,

    /// The ticket cannot be scanned again.
    #[error("Ticket is {status}, not valid for check-in")]
    AlreadyUsed {
        /// Current ticket status
        status: TicketStatus,
    },

    /// Referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Credentials were missing, wrong or expired.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller's role or ownership does not allow the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A collaborator (mail, file storage) failed.
    #[error("Dependency failure: {0}")]
    DependencyFailure(String),

    /// Unexpected persistence failure.
    #[error("Store error: {0}")]
    Store(String),
}

impl WorkflowError {
    /// Shorthand for [`WorkflowError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for [`WorkflowError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`WorkflowError::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientInventory {
                ticket_type,
                requested,
                available,
                ..
            } => Self::OutOfStock {
                ticket_type,
                requested,
                available,
            },
            StoreError::Conflict(Constraint::ActiveRegistration) => Self::DuplicateRegistration,
            StoreError::Conflict(Constraint::UtrNumber) => {
                Self::validation("UTR number has already been used for another registration")
            }
            StoreError::Conflict(Constraint::TicketForRegistration) => Self::AlreadyIssued,
            StoreError::Conflict(Constraint::UserEmail) => {
                Self::validation("An account with this email already exists")
            }
            StoreError::Conflict(Constraint::ReferralCode) => {
                Self::validation("Referral code is already taken")
            }
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_shortfall_becomes_out_of_stock() {
        let err = WorkflowError::from(StoreError::InsufficientInventory {
            event_id: crate::types::EventId::new(),
            ticket_type: "VIP".into(),
            requested: 2,
            available: 1,
        });
        assert_eq!(
            err,
            WorkflowError::OutOfStock {
                ticket_type: "VIP".into(),
                requested: 2,
                available: 1,
            }
        );
    }

    #[test]
    fn unique_violations_map_to_domain_errors() {
        assert_eq!(
            WorkflowError::from(StoreError::Conflict(Constraint::ActiveRegistration)),
            WorkflowError::DuplicateRegistration
        );
        assert_eq!(
            WorkflowError::from(StoreError::Conflict(Constraint::TicketForRegistration)),
            WorkflowError::AlreadyIssued
        );
        assert!(matches!(
            WorkflowError::from(StoreError::Conflict(Constraint::UtrNumber)),
            WorkflowError::Validation(_)
        ));
    }

    #[test]
    fn database_failures_are_opaque() {
        let err = WorkflowError::from(StoreError::Database("connection reset".into()));
        assert!(matches!(err, WorkflowError::Store(_)));
    }
}
