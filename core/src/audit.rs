//! Append-only audit log of administrative and workflow actions.

use crate::types::{AuditEntryId, EventId, RegistrationId, TicketId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action recorded in the audit log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A registration was submitted
    SubmitRegistration,
    /// A rejected registration was resubmitted
    ResubmitRegistration,
    /// An admin verified a payment
    ApproveRegistration,
    /// An admin rejected a payment
    RejectRegistration,
    /// A registration was cancelled
    CancelRegistration,
    /// A ticket was scanned at the venue
    CheckIn,
    /// An event was created
    CreateEvent,
    /// An event changed lifecycle status
    UpdateEventStatus,
    /// A user was promoted to ambassador
    PromoteAmbassador,
    /// An admin changed a user's role
    ChangeRole,
    /// Payment settings were changed
    UpdateSettings,
}

impl AuditAction {
    /// Database representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SubmitRegistration => "submit_registration",
            Self::ResubmitRegistration => "resubmit_registration",
            Self::ApproveRegistration => "approve_registration",
            Self::RejectRegistration => "reject_registration",
            Self::CancelRegistration => "cancel_registration",
            Self::CheckIn => "check_in",
            Self::CreateEvent => "create_event",
            Self::UpdateEventStatus => "update_event_status",
            Self::PromoteAmbassador => "promote_ambassador",
            Self::ChangeRole => "change_role",
            Self::UpdateSettings => "update_settings",
        }
    }

    /// Parses the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::SubmitRegistration,
            Self::ResubmitRegistration,
            Self::ApproveRegistration,
            Self::RejectRegistration,
            Self::CancelRegistration,
            Self::CheckIn,
            Self::CreateEvent,
            Self::UpdateEventStatus,
            Self::PromoteAmbassador,
            Self::ChangeRole,
            Self::UpdateSettings,
        ]
        .into_iter()
        .find(|action| action.as_str() == s)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write-once audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Identity
    pub id: AuditEntryId,
    /// What happened
    pub action: AuditAction,
    /// Who did it
    pub actor_id: UserId,
    /// Registration affected
    pub registration_id: Option<RegistrationId>,
    /// Event affected
    pub event_id: Option<EventId>,
    /// Ticket affected
    pub ticket_id: Option<TicketId>,
    /// User affected
    pub target_user_id: Option<UserId>,
    /// Free-form detail (e.g. rejection reason)
    pub detail: Option<String>,
    /// When it happened
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Starts an entry for `action` performed by `actor_id` at `at`.
    #[must_use]
    pub fn new(action: AuditAction, actor_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            id: AuditEntryId::new(),
            action,
            actor_id,
            registration_id: None,
            event_id: None,
            ticket_id: None,
            target_user_id: None,
            detail: None,
            created_at: at,
        }
    }

    /// Attaches the registration and its event and owner.
    #[must_use]
    pub const fn for_registration(
        mut self,
        registration_id: RegistrationId,
        event_id: EventId,
        user_id: UserId,
    ) -> Self {
        self.registration_id = Some(registration_id);
        self.event_id = Some(event_id);
        self.target_user_id = Some(user_id);
        self
    }

    /// Attaches an event.
    #[must_use]
    pub const fn for_event(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }

    /// Attaches a ticket.
    #[must_use]
    pub const fn with_ticket(mut self, ticket_id: TicketId) -> Self {
        self.ticket_id = Some(ticket_id);
        self
    }

    /// Attaches a target user.
    #[must_use]
    pub const fn for_user(mut self, user_id: UserId) -> Self {
        self.target_user_id = Some(user_id);
        self
    }

    /// Attaches free-form detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_action_uses_log_name() {
        assert_eq!(AuditAction::ApproveRegistration.as_str(), "approve_registration");
        assert_eq!(
            AuditAction::parse("reject_registration"),
            Some(AuditAction::RejectRegistration)
        );
        assert_eq!(AuditAction::parse("delete_everything"), None);
    }

    #[test]
    fn builder_attaches_targets() {
        let actor = UserId::new();
        let registration = RegistrationId::new();
        let event = EventId::new();
        let user = UserId::new();
        let entry = AuditEntry::new(AuditAction::RejectRegistration, actor, Utc::now())
            .for_registration(registration, event, user)
            .with_detail("blurry screenshot");

        assert_eq!(entry.registration_id, Some(registration));
        assert_eq!(entry.event_id, Some(event));
        assert_eq!(entry.target_user_id, Some(user));
        assert_eq!(entry.detail.as_deref(), Some("blurry screenshot"));
    }
}
