//! Registration workflow.
//!
//! ```text
//!            submit                verify
//!   (none) ─────────▶ pending ─────────────▶ verified
//!                      │  ▲                     │
//!               reject │  │ resubmit            │
//!                      ▼  │                     │
//!                    rejected                   │
//!                                               │
//!   pending | verified ──────── cancel ────────▶ cancelled (terminal)
//! ```
//!
//! Every transition loads the registration, decides against the loaded
//! status and commits one mutation batch that names that status as the
//! expected one. If another request changed the registration in between, the
//! commit fails as a whole and the caller gets
//! [`WorkflowError::InvalidTransition`] with the status that won.
//!
//! Inventory is reserved at submit and resubmit and released at reject and
//! cancel, always in the same commit as the status change. Notifications go
//! out after the commit and never influence its outcome.

use crate::audit::{AuditAction, AuditEntry};
use crate::environment::{Actor, Environment};
use crate::error::{Result, WorkflowError};
use crate::inventory::InventoryManager;
use crate::notification::{Notification, Recipient, TemplateKind};
use crate::referral::{ReferralLedger, ReferralOutcome};
use crate::store::{Mutation, RegistrationFilter, StoreError};
use crate::team;
use crate::tickets::TicketIssuer;
use crate::types::{
    CheckInStatus, Event, EventId, EventStatus, Money, PaymentStatus, Registration,
    RegistrationId, RegistrationStatus, TeamMember, TicketStatus, User,
};
use serde::{Deserialize, Serialize};

/// Shortest and longest accepted UTR after normalisation.
const UTR_LEN: std::ops::RangeInclusive<usize> = 6..=32;

/// Registration request from a user.
///
/// Carries no amount: the total is derived from the ticket type's price and
/// anything the client sends for it is ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRegistration {
    /// Event to register for
    pub event_id: EventId,
    /// Ticket type name
    pub ticket_type: String,
    /// Number of tickets
    pub quantity: u32,
    /// Team name (team events)
    #[serde(default)]
    pub team_name: Option<String>,
    /// Team members excluding the registrant
    #[serde(default)]
    pub team_members: Vec<TeamMember>,
    /// Payment transaction reference
    pub utr_number: String,
    /// URL of the uploaded payment screenshot
    pub payment_proof_url: String,
}

/// Corrections to a rejected registration; absent fields keep their value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResubmitRegistration {
    /// New payment transaction reference
    #[serde(default)]
    pub utr_number: Option<String>,
    /// New payment screenshot URL
    #[serde(default)]
    pub payment_proof_url: Option<String>,
    /// New team name
    #[serde(default)]
    pub team_name: Option<String>,
    /// New team member list
    #[serde(default)]
    pub team_members: Option<Vec<TeamMember>>,
}

/// Upper-cases a UTR and strips whitespace.
///
/// # Errors
///
/// Returns [`WorkflowError::Validation`] unless the result is 6 to 32
/// alphanumerics.
pub fn normalize_utr(utr: &str) -> Result<String> {
    let utr: String = utr
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    if !UTR_LEN.contains(&utr.len()) || !utr.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(WorkflowError::validation(
            "UTR number must be 6 to 32 letters or digits",
        ));
    }
    Ok(utr)
}

fn require_proof_url(url: &str) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(WorkflowError::validation("payment proof is required"));
    }
    Ok(url.to_string())
}

/// Drives registrations through their lifecycle.
#[derive(Clone)]
pub struct RegistrationWorkflow {
    env: Environment,
    inventory: InventoryManager,
    tickets: TicketIssuer,
    referrals: ReferralLedger,
}

impl RegistrationWorkflow {
    /// Creates a new `RegistrationWorkflow`
    #[must_use]
    pub const fn new(env: Environment, tickets: TicketIssuer, referrals: ReferralLedger) -> Self {
        Self {
            env,
            inventory: InventoryManager::new(),
            tickets,
            referrals,
        }
    }

    /// Registers the caller for an event and reserves their tickets.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Validation`] for bad input or an event that is not
    ///   open for registration
    /// - [`WorkflowError::NotFound`] if the event or caller does not exist
    /// - [`WorkflowError::DuplicateRegistration`] if the caller already has an
    ///   active registration for the event
    /// - [`WorkflowError::OutOfStock`] if too few tickets are left
    #[tracing::instrument(skip(self, actor, request), fields(event_id = %request.event_id, user_id = %actor.user_id))]
    pub async fn submit(&self, actor: &Actor, request: SubmitRegistration) -> Result<Registration> {
        let utr_number = normalize_utr(&request.utr_number)?;
        let payment_proof_url = require_proof_url(&request.payment_proof_url)?;

        let event = self.load_event(request.event_id).await?;
        if event.status != EventStatus::Published {
            return Err(WorkflowError::validation(format!(
                "event is {} and not open for registration",
                event.status.as_str()
            )));
        }
        let user = self.load_user(actor).await?;

        let reservation = self
            .inventory
            .reserve(&event, &request.ticket_type, request.quantity)?;
        let total_amount = Self::total_amount(&event, &request.ticket_type, request.quantity)?;
        let roster = team::build_roster(
            &event.format,
            &user,
            request.team_name,
            &request.team_members,
        )?;

        if self
            .env
            .store
            .find_active_registration(event.id, user.id)
            .await?
            .is_some()
        {
            return Err(WorkflowError::DuplicateRegistration);
        }

        let now = self.env.clock.now();
        let registration = Registration {
            id: RegistrationId::new(),
            event_id: event.id,
            user_id: user.id,
            ticket_type: request.ticket_type,
            quantity: request.quantity,
            team_name: roster.team_name,
            team_members: roster.members,
            utr_number,
            payment_proof_url,
            total_amount,
            payment_status: PaymentStatus::Pending,
            status: RegistrationStatus::Pending,
            rejection_reason: None,
            check_in_status: CheckInStatus::NotCheckedIn,
            checked_in_at: None,
            qr_code_hash: None,
            verified_by: None,
            verified_at: None,
            created_at: now,
            updated_at: now,
        };
        let audit = AuditEntry::new(AuditAction::SubmitRegistration, actor.user_id, now)
            .for_registration(registration.id, event.id, user.id);

        self.env
            .store
            .commit(vec![
                reservation,
                Mutation::InsertRegistration(registration.clone()),
                Mutation::AppendAudit(audit),
            ])
            .await?;

        metrics::counter!("registrations.submitted").increment(1);
        tracing::info!(
            registration_id = %registration.id,
            ticket_type = %registration.ticket_type,
            quantity = registration.quantity,
            total_amount = %registration.total_amount,
            "Registration submitted"
        );
        self.notify(TemplateKind::Submitted, &user, &event, &registration, |n| n);

        Ok(registration)
    }

    /// Resubmits a rejected registration with corrected payment details.
    ///
    /// Inventory released at rejection is reserved again.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller owns the registration
    /// - [`WorkflowError::InvalidTransition`] unless it is rejected
    /// - [`WorkflowError::Validation`] for bad input
    /// - [`WorkflowError::OutOfStock`] if the tickets sold out meanwhile
    #[tracing::instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn resubmit(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
        request: ResubmitRegistration,
    ) -> Result<Registration> {
        let current = self.load_registration(registration_id).await?;
        if current.user_id != actor.user_id {
            return Err(WorkflowError::forbidden(
                "only the registrant may resubmit a registration",
            ));
        }
        if current.status != RegistrationStatus::Rejected {
            return Err(WorkflowError::InvalidTransition {
                operation: "resubmit",
                status: current.status,
            });
        }

        let utr_number = match request.utr_number.as_deref() {
            Some(utr) => normalize_utr(utr)?,
            None => current.utr_number.clone(),
        };
        let payment_proof_url = match request.payment_proof_url.as_deref() {
            Some(url) => require_proof_url(url)?,
            None => current.payment_proof_url.clone(),
        };

        let event = self.load_event(current.event_id).await?;
        let user = self.load_user(actor).await?;
        let roster = team::build_roster(
            &event.format,
            &user,
            request.team_name.or_else(|| current.team_name.clone()),
            request
                .team_members
                .as_deref()
                .unwrap_or(current.team_members.as_slice()),
        )?;
        let reservation = self
            .inventory
            .reserve(&event, &current.ticket_type, current.quantity)?;
        let total_amount = Self::total_amount(&event, &current.ticket_type, current.quantity)?;

        let now = self.env.clock.now();
        let updated = Registration {
            team_name: roster.team_name,
            team_members: roster.members,
            utr_number,
            payment_proof_url,
            total_amount,
            payment_status: PaymentStatus::Pending,
            status: RegistrationStatus::Pending,
            rejection_reason: None,
            updated_at: now,
            ..current
        };
        let audit = AuditEntry::new(AuditAction::ResubmitRegistration, actor.user_id, now)
            .for_registration(updated.id, updated.event_id, updated.user_id);

        self.commit_transition(
            "resubmit",
            RegistrationStatus::Rejected,
            &updated,
            vec![reservation, Mutation::AppendAudit(audit)],
        )
        .await?;

        metrics::counter!("registrations.resubmitted").increment(1);
        tracing::info!(registration_id = %updated.id, event_id = %updated.event_id, "Registration resubmitted");
        self.notify(TemplateKind::Resubmitted, &user, &event, &updated, |n| n);

        Ok(updated)
    }

    /// Verifies a pending registration's payment and issues its ticket.
    ///
    /// The status change, ticket, attendee count and audit entry are one
    /// commit. Referral points and the approval email follow; their failures
    /// are logged and do not undo the verification.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller is an admin
    /// - [`WorkflowError::InvalidTransition`] unless the registration is pending
    /// - [`WorkflowError::AlreadyIssued`] if a ticket already exists
    #[tracing::instrument(skip(self, actor), fields(admin_id = %actor.user_id))]
    pub async fn verify(&self, actor: &Actor, registration_id: RegistrationId) -> Result<Registration> {
        actor.require_admin("verify payments")?;

        let current = self.load_registration(registration_id).await?;
        if current.status != RegistrationStatus::Pending {
            return Err(WorkflowError::InvalidTransition {
                operation: "verify",
                status: current.status,
            });
        }
        let event = self.load_event(current.event_id).await?;

        let issued = self.tickets.issue(&current).await?;
        let now = self.env.clock.now();
        let updated = Registration {
            status: RegistrationStatus::Verified,
            payment_status: PaymentStatus::Completed,
            qr_code_hash: Some(issued.qr_code_hash.clone()),
            verified_by: Some(actor.user_id),
            verified_at: Some(now),
            updated_at: now,
            ..current
        };
        let audit = AuditEntry::new(AuditAction::ApproveRegistration, actor.user_id, now)
            .for_registration(updated.id, updated.event_id, updated.user_id)
            .with_ticket(issued.ticket.id);

        self.commit_transition(
            "verify",
            RegistrationStatus::Pending,
            &updated,
            vec![
                Mutation::InsertTicket(issued.ticket.clone()),
                Mutation::AdjustRegisteredCount {
                    event_id: updated.event_id,
                    delta: i64::from(updated.quantity),
                },
                Mutation::AppendAudit(audit),
            ],
        )
        .await?;

        metrics::counter!("registrations.verified").increment(1);
        tracing::info!(
            registration_id = %updated.id,
            event_id = %updated.event_id,
            user_id = %updated.user_id,
            ticket_number = %issued.ticket.ticket_number,
            "Registration verified, ticket issued"
        );

        match self.env.store.get_user(updated.user_id).await {
            Ok(Some(user)) => {
                self.award_referral(&user).await;
                let ticket_number = issued.ticket.ticket_number.clone();
                self.notify(TemplateKind::Approved, &user, &event, &updated, |n| {
                    n.var("ticket_number", ticket_number)
                });
            }
            Ok(None) => {
                tracing::warn!(user_id = %updated.user_id, "Registrant missing after verification");
            }
            Err(error) => {
                tracing::warn!(user_id = %updated.user_id, error = %error, "Could not load registrant after verification");
            }
        }

        Ok(updated)
    }

    /// Rejects a pending registration's payment proof and releases its
    /// tickets.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller is an admin
    /// - [`WorkflowError::Validation`] for a blank reason
    /// - [`WorkflowError::InvalidTransition`] unless the registration is pending
    #[tracing::instrument(skip(self, actor, reason), fields(admin_id = %actor.user_id))]
    pub async fn reject(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
        reason: &str,
    ) -> Result<Registration> {
        actor.require_admin("reject payments")?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::validation("a rejection reason is required"));
        }

        let current = self.load_registration(registration_id).await?;
        if current.status != RegistrationStatus::Pending {
            return Err(WorkflowError::InvalidTransition {
                operation: "reject",
                status: current.status,
            });
        }
        let event = self.load_event(current.event_id).await?;
        let release = self
            .inventory
            .release(&event, &current.ticket_type, current.quantity)?;

        let now = self.env.clock.now();
        let updated = Registration {
            status: RegistrationStatus::Rejected,
            payment_status: PaymentStatus::Failed,
            rejection_reason: Some(reason.to_string()),
            updated_at: now,
            ..current
        };
        let audit = AuditEntry::new(AuditAction::RejectRegistration, actor.user_id, now)
            .for_registration(updated.id, updated.event_id, updated.user_id)
            .with_detail(reason);

        self.commit_transition(
            "reject",
            RegistrationStatus::Pending,
            &updated,
            vec![release, Mutation::AppendAudit(audit)],
        )
        .await?;

        metrics::counter!("registrations.rejected").increment(1);
        tracing::info!(registration_id = %updated.id, event_id = %updated.event_id, "Registration rejected");

        match self.env.store.get_user(updated.user_id).await {
            Ok(Some(user)) => {
                let reason = reason.to_string();
                self.notify(TemplateKind::Rejected, &user, &event, &updated, |n| {
                    n.var("reason", reason)
                });
            }
            Ok(None) => tracing::warn!(user_id = %updated.user_id, "Registrant missing, rejection email skipped"),
            Err(error) => tracing::warn!(error = %error, "Could not load registrant, rejection email skipped"),
        }

        Ok(updated)
    }

    /// Cancels a pending or verified registration.
    ///
    /// Reserved tickets are released; a valid issued ticket is cancelled and
    /// the event's attendee count drops for verified registrations. A ticket
    /// that was already scanned at the venue blocks cancellation.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller owns the registration
    ///   or is an admin
    /// - [`WorkflowError::InvalidTransition`] from any other status, or when
    ///   the ticket was already used
    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn cancel(&self, actor: &Actor, registration_id: RegistrationId) -> Result<Registration> {
        let current = self.load_registration(registration_id).await?;
        actor.require_owner_or_admin(current.user_id, "cancel this registration")?;
        if !current.status.holds_inventory() {
            return Err(WorkflowError::InvalidTransition {
                operation: "cancel",
                status: current.status,
            });
        }

        let event = self.load_event(current.event_id).await?;
        let mut mutations = vec![self
            .inventory
            .release(&event, &current.ticket_type, current.quantity)?];

        let now = self.env.clock.now();
        let mut audit = AuditEntry::new(AuditAction::CancelRegistration, actor.user_id, now)
            .for_registration(current.id, current.event_id, current.user_id);

        if current.status == RegistrationStatus::Verified {
            if let Some(ticket) = self.env.store.find_ticket_by_registration(current.id).await? {
                match ticket.status {
                    TicketStatus::Valid => {
                        mutations.push(Mutation::TransitionTicket {
                            ticket_id: ticket.id,
                            expected: TicketStatus::Valid,
                            status: TicketStatus::Cancelled,
                            at: now,
                        });
                        audit = audit.with_ticket(ticket.id);
                    }
                    TicketStatus::Used => {
                        return Err(WorkflowError::InvalidTransition {
                            operation: "cancel",
                            status: current.status,
                        });
                    }
                    TicketStatus::Cancelled | TicketStatus::Expired => {}
                }
            }
            mutations.push(Mutation::AdjustRegisteredCount {
                event_id: current.event_id,
                delta: -i64::from(current.quantity),
            });
        }
        mutations.push(Mutation::AppendAudit(audit));

        let expected = current.status;
        let updated = Registration {
            status: RegistrationStatus::Cancelled,
            updated_at: now,
            ..current
        };
        self.commit_transition("cancel", expected, &updated, mutations)
            .await?;

        metrics::counter!("registrations.cancelled").increment(1);
        tracing::info!(
            registration_id = %updated.id,
            event_id = %updated.event_id,
            previous_status = %expected,
            "Registration cancelled"
        );

        Ok(updated)
    }

    /// A single registration, for its owner or staff.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`] if it does not exist
    /// - [`WorkflowError::Forbidden`] for other users
    pub async fn get(&self, actor: &Actor, registration_id: RegistrationId) -> Result<Registration> {
        let registration = self.load_registration(registration_id).await?;
        actor.require_owner_or_staff(registration.user_id, "view this registration")?;
        Ok(registration)
    }

    /// The caller's own registrations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] on persistence failures.
    pub async fn list_mine(&self, actor: &Actor) -> Result<Vec<Registration>> {
        Ok(self
            .env
            .store
            .list_registrations(RegistrationFilter {
                user_id: Some(actor.user_id),
                ..RegistrationFilter::default()
            })
            .await?)
    }

    /// Registrations for an event, optionally by status (staff only).
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller is staff
    /// - [`WorkflowError::NotFound`] if the event does not exist
    pub async fn list_for_event(
        &self,
        actor: &Actor,
        event_id: EventId,
        status: Option<RegistrationStatus>,
    ) -> Result<Vec<Registration>> {
        actor.require_staff("list event registrations")?;
        self.load_event(event_id).await?;
        Ok(self
            .env
            .store
            .list_registrations(RegistrationFilter {
                event_id: Some(event_id),
                status,
                ..RegistrationFilter::default()
            })
            .await?)
    }

    fn total_amount(event: &Event, ticket_type: &str, quantity: u32) -> Result<Money> {
        let price = event
            .ticket_type(ticket_type)
            .map(|t| t.price)
            .ok_or_else(|| {
                WorkflowError::validation(format!("event has no ticket type named '{ticket_type}'"))
            })?;
        price
            .checked_mul(quantity)
            .ok_or_else(|| WorkflowError::validation("total amount overflows"))
    }

    async fn load_event(&self, id: EventId) -> Result<Event> {
        self.env
            .store
            .get_event(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Event", id))
    }

    async fn load_user(&self, actor: &Actor) -> Result<User> {
        self.env
            .store
            .get_user(actor.user_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("User", actor.user_id))
    }

    async fn load_registration(&self, id: RegistrationId) -> Result<Registration> {
        self.env
            .store
            .get_registration(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Registration", id))
    }

    /// Commits a status change plus its side mutations. A stale status is
    /// reported as an invalid transition from whatever status won the race.
    async fn commit_transition(
        &self,
        operation: &'static str,
        expected: RegistrationStatus,
        updated: &Registration,
        side_effects: Vec<Mutation>,
    ) -> Result<()> {
        let mut batch = Vec::with_capacity(side_effects.len() + 1);
        batch.push(Mutation::TransitionRegistration {
            expected,
            registration: updated.clone(),
        });
        batch.extend(side_effects);

        match self.env.store.commit(batch).await {
            Ok(()) => Ok(()),
            Err(StoreError::StaleState { entity, .. }) => {
                tracing::debug!(registration_id = %updated.id, entity, operation, "Lost a concurrent transition");
                let status = self
                    .env
                    .store
                    .get_registration(updated.id)
                    .await?
                    .map_or(expected, |r| r.status);
                Err(WorkflowError::InvalidTransition { operation, status })
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn award_referral(&self, user: &User) {
        match self.referrals.award_on_verification(user).await {
            Ok(ReferralOutcome::ReferrerMissing) => {
                tracing::warn!(user_id = %user.id, "Referral skipped, referrer missing");
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(user_id = %user.id, error = %error, "Referral award failed");
            }
        }
    }

    fn notify(
        &self,
        kind: TemplateKind,
        user: &User,
        event: &Event,
        registration: &Registration,
        extra: impl FnOnce(Notification) -> Notification,
    ) {
        let notification = Notification::new(
            kind,
            Recipient {
                name: user.name.clone(),
                email: user.email.clone(),
            },
        )
        .var("name", &user.name)
        .var("event_title", &event.title)
        .var("venue", &event.venue)
        .var("starts_at", event.starts_at.format("%d %b %Y, %H:%M UTC"))
        .var("registration_id", registration.id)
        .var("ticket_type", &registration.ticket_type)
        .var("quantity", registration.quantity)
        .var("total_amount", registration.total_amount);

        self.env.notifications.dispatch(extra(notification));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utr_is_normalized() {
        assert_eq!(normalize_utr(" 4123 4567 8901 "), Ok("412345678901".into()));
        assert_eq!(normalize_utr("axis1234abcd"), Ok("AXIS1234ABCD".into()));
    }

    #[test]
    fn malformed_utrs_are_rejected() {
        assert!(normalize_utr("").is_err());
        assert!(normalize_utr("12345").is_err());
        assert!(normalize_utr("4123-4567-8901").is_err());
        assert!(normalize_utr(&"9".repeat(33)).is_err());
    }

    #[test]
    fn proof_url_is_required() {
        assert!(require_proof_url("   ").is_err());
        assert_eq!(require_proof_url(" /uploads/a.png "), Ok("/uploads/a.png".into()));
    }

    #[test]
    fn total_is_price_times_quantity() {
        let event = crate::fixtures::event();
        assert_eq!(
            RegistrationWorkflow::total_amount(&event, "Standard", 2),
            Ok(Money::from_major(202))
        );
        assert!(RegistrationWorkflow::total_amount(&event, "Backstage", 1).is_err());
    }
}
