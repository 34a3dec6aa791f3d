//! Injected dependencies.
//!
//! Every service takes an [`Environment`] holding its collaborators behind
//! traits, so production wires PostgreSQL and SMTP while tests wire the
//! in-memory store, a fixed clock and a recording notifier.

use crate::error::{Result, WorkflowError};
use crate::notification::NotificationDispatcher;
use crate::store::EntityStore;
use crate::types::{Role, UserId};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Collaborators shared by the EventPass services.
#[derive(Clone)]
pub struct Environment {
    /// Persistence
    pub store: Arc<dyn EntityStore>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Best-effort email dispatch
    pub notifications: NotificationDispatcher,
}

impl Environment {
    /// Creates a new `Environment`
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        clock: Arc<dyn Clock>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            clock,
            notifications,
        }
    }
}

/// The authenticated caller, resolved from a bearer credential.
///
/// Services trust this identity and never a user id taken from a request
/// body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// Caller
    pub user_id: UserId,
    /// Caller's role
    pub role: Role,
}

impl Actor {
    /// Creates a new `Actor`
    #[must_use]
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Whether the caller is an admin
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Fails unless the caller is an admin.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Forbidden`] for any other role.
    pub fn require_admin(&self, operation: &str) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(WorkflowError::forbidden(format!("only admins may {operation}")))
        }
    }

    /// Fails unless the caller is an admin or coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Forbidden`] for any other role.
    pub fn require_staff(&self, operation: &str) -> Result<()> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(WorkflowError::forbidden(format!(
                "only admins and coordinators may {operation}"
            )))
        }
    }

    /// Fails unless the caller is `owner` or an admin.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Forbidden`] otherwise.
    pub fn require_owner_or_admin(&self, owner: UserId, operation: &str) -> Result<()> {
        if self.user_id == owner || self.is_admin() {
            Ok(())
        } else {
            Err(WorkflowError::forbidden(format!(
                "only the registrant or an admin may {operation}"
            )))
        }
    }

    /// Fails unless the caller is `owner`, an admin or a coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Forbidden`] otherwise.
    pub fn require_owner_or_staff(&self, owner: UserId, operation: &str) -> Result<()> {
        if self.user_id == owner || self.role.is_staff() {
            Ok(())
        } else {
            Err(WorkflowError::forbidden(format!(
                "only the registrant or event staff may {operation}"
            )))
        }
    }
}
