//! Ticket issuing and venue check-in.
//!
//! A ticket is minted exactly once, when its registration is verified. The
//! QR code printed on it is a self-contained signed payload:
//!
//! ```text
//! base64url(json claims) "." base64url(hmac_sha256(secret, first segment))
//! ```
//!
//! Scanners can resolve the registration, event and holder from the claims
//! without a store lookup, and a code cannot be forged without the secret.
//! The registration keeps the hex SHA-256 of the payload as `qr_code_hash`.

use crate::audit::{AuditAction, AuditEntry};
use crate::environment::{Actor, Environment};
use crate::error::{Result, WorkflowError};
use crate::signing::{TokenSigner, sha256_hex};
use crate::store::{Mutation, StoreError};
use crate::types::{EventId, Registration, RegistrationId, Ticket, TicketId, TicketStatus, UserId};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Prefix of every ticket number.
pub const TICKET_NUMBER_PREFIX: &str = "TKT-";

const TICKET_NUMBER_LEN: usize = 12;
const TICKET_NUMBER_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generates a random ticket number, `TKT-` followed by 12 upper-case
/// alphanumerics.
#[must_use]
pub fn generate_ticket_number() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TICKET_NUMBER_LEN)
        .map(|_| char::from(TICKET_NUMBER_CHARSET[rng.gen_range(0..TICKET_NUMBER_CHARSET.len())]))
        .collect();
    format!("{TICKET_NUMBER_PREFIX}{suffix}")
}

/// Hex SHA-256 of a QR payload, stored on the registration.
#[must_use]
pub fn qr_code_hash(code: &str) -> String {
    sha256_hex(code)
}

/// Claims carried by a ticket's QR code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrClaims {
    /// Ticket number
    #[serde(rename = "tn")]
    pub ticket_number: String,
    /// Registration
    #[serde(rename = "rid")]
    pub registration_id: RegistrationId,
    /// Event
    #[serde(rename = "eid")]
    pub event_id: EventId,
    /// Holder
    #[serde(rename = "uid")]
    pub user_id: UserId,
    /// Issue time (unix seconds)
    #[serde(rename = "iat")]
    pub issued_at: i64,
}

/// A freshly minted ticket, not yet persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedTicket {
    /// The ticket row
    pub ticket: Ticket,
    /// Hex SHA-256 of `ticket.qr_code`
    pub qr_code_hash: String,
}

/// Mints tickets for verified registrations and checks them in at the venue.
#[derive(Clone)]
pub struct TicketIssuer {
    env: Environment,
    signer: TokenSigner,
}

impl TicketIssuer {
    /// Creates a new `TicketIssuer`
    #[must_use]
    pub const fn new(env: Environment, signer: TokenSigner) -> Self {
        Self { env, signer }
    }

    /// Mints the ticket for `registration` after checking none exists yet.
    ///
    /// The caller persists the ticket with [`Mutation::InsertTicket`] in the
    /// same commit as the verification; the store's one-ticket-per-registration
    /// constraint closes the window between this check and that commit.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::AlreadyIssued`] if a ticket already references the
    ///   registration
    /// - [`WorkflowError::Store`] on persistence failures
    pub async fn issue(&self, registration: &Registration) -> Result<IssuedTicket> {
        if self
            .env
            .store
            .find_ticket_by_registration(registration.id)
            .await?
            .is_some()
        {
            return Err(WorkflowError::AlreadyIssued);
        }
        self.mint(registration, self.env.clock.now())
    }

    /// Builds a ticket and its signed QR code without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::DependencyFailure`] if signing fails.
    pub fn mint(&self, registration: &Registration, at: DateTime<Utc>) -> Result<IssuedTicket> {
        let ticket_number = generate_ticket_number();
        let claims = QrClaims {
            ticket_number: ticket_number.clone(),
            registration_id: registration.id,
            event_id: registration.event_id,
            user_id: registration.user_id,
            issued_at: at.timestamp(),
        };
        let qr_code = self.signer.sign(&claims)?;
        let qr_code_hash = qr_code_hash(&qr_code);

        Ok(IssuedTicket {
            ticket: Ticket {
                id: TicketId::new(),
                ticket_number,
                registration_id: registration.id,
                event_id: registration.event_id,
                user_id: registration.user_id,
                qr_code,
                status: TicketStatus::Valid,
                issued_at: at,
                used_at: None,
            },
            qr_code_hash,
        })
    }

    /// Verifies and decodes a scanned QR code.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] for malformed or forged codes.
    pub fn decode(&self, code: &str) -> Result<QrClaims> {
        self.signer
            .verify(code)
            .map_err(|_| WorkflowError::validation("invalid ticket code"))
    }

    /// Checks a ticket in at the venue.
    ///
    /// The `valid → used` change is a compare-and-set, so of two concurrent
    /// scans of the same code exactly one succeeds and the other fails with
    /// [`WorkflowError::AlreadyUsed`].
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller is staff
    /// - [`WorkflowError::Validation`] for malformed, forged or superseded codes
    /// - [`WorkflowError::NotFound`] if the ticket does not exist
    /// - [`WorkflowError::AlreadyUsed`] if the ticket is not valid
    pub async fn check_in(&self, actor: &Actor, code: &str) -> Result<Ticket> {
        actor.require_staff("check attendees in")?;
        let claims = self.decode(code)?;

        let ticket = self
            .env
            .store
            .find_ticket_by_number(claims.ticket_number.clone())
            .await?
            .ok_or_else(|| WorkflowError::not_found("Ticket", &claims.ticket_number))?;
        if ticket.registration_id != claims.registration_id || ticket.qr_code != code.trim() {
            return Err(WorkflowError::validation("ticket code does not match the issued ticket"));
        }
        if ticket.status != TicketStatus::Valid {
            return Err(WorkflowError::AlreadyUsed {
                status: ticket.status,
            });
        }

        let now = self.env.clock.now();
        let audit = AuditEntry::new(AuditAction::CheckIn, actor.user_id, now)
            .for_registration(ticket.registration_id, ticket.event_id, ticket.user_id)
            .with_ticket(ticket.id);
        let result = self
            .env
            .store
            .commit(vec![
                Mutation::TransitionTicket {
                    ticket_id: ticket.id,
                    expected: TicketStatus::Valid,
                    status: TicketStatus::Used,
                    at: now,
                },
                Mutation::RecordCheckIn {
                    registration_id: ticket.registration_id,
                    at: now,
                },
                Mutation::AppendAudit(audit),
            ])
            .await;

        match result {
            Ok(()) => {}
            Err(StoreError::StaleState { .. }) => {
                let status = self
                    .env
                    .store
                    .get_ticket(ticket.id)
                    .await?
                    .map_or(TicketStatus::Used, |t| t.status);
                return Err(WorkflowError::AlreadyUsed { status });
            }
            Err(other) => return Err(other.into()),
        }

        metrics::counter!("tickets.checked_in").increment(1);
        tracing::info!(
            ticket_number = %ticket.ticket_number,
            registration_id = %ticket.registration_id,
            event_id = %ticket.event_id,
            "Ticket checked in"
        );

        Ok(Ticket {
            status: TicketStatus::Used,
            used_at: Some(now),
            ..ticket
        })
    }

    /// The ticket issued for a registration, for its owner or staff.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`] if the registration or ticket is missing
    /// - [`WorkflowError::Forbidden`] for other users
    pub async fn ticket_for_registration(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
    ) -> Result<Ticket> {
        let registration = self
            .env
            .store
            .get_registration(registration_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Registration", registration_id))?;
        actor.require_owner_or_staff(registration.user_id, "view this ticket")?;

        self.env
            .store
            .find_ticket_by_registration(registration_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Ticket for registration", registration_id))
    }
}
