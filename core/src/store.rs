//! Entity store abstraction.
//!
//! The store is the only shared mutable resource in the system. Reads are
//! plain lookups; every write goes through [`EntityStore::commit`], which
//! applies a batch of [`Mutation`]s atomically:
//!
//! - either every mutation in the batch is applied, or none is;
//! - inventory changes are compare-and-set on `available`
//!   ([`Mutation::ReserveTickets`] never takes `available` below zero,
//!   [`Mutation::ReleaseTickets`] never takes it above `quantity`);
//! - status changes on registrations and tickets name the status they expect
//!   to replace and fail with [`StoreError::StaleState`] when another request
//!   got there first;
//! - uniqueness (one active registration per event and user, one ticket per
//!   registration, one referral award per pair, …) is enforced by the store
//!   and reported as [`StoreError::Conflict`].
//!
//! # Implementations
//!
//! - `PostgresEntityStore` (in `eventpass-postgres`): production backend,
//!   one database transaction per commit
//! - `InMemoryEntityStore` (in `eventpass-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures instead of using `async fn` so the store can
//! be shared as `Arc<dyn EntityStore>`.

use crate::audit::AuditEntry;
use crate::types::{
    Event, EventId, EventStatus, Registration, RegistrationId, RegistrationStatus, Settings,
    Ticket, TicketId, TicketStatus, User, UserId,
};
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Uniqueness constraints enforced by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// At most one non-cancelled registration per (event, user)
    ActiveRegistration,
    /// UTR numbers are unique across registrations
    UtrNumber,
    /// QR hashes are unique across registrations
    QrCodeHash,
    /// At most one ticket per registration
    TicketForRegistration,
    /// Ticket numbers are globally unique
    TicketNumber,
    /// One award per (ambassador, referred user)
    ReferralAward,
    /// Emails are unique across users
    UserEmail,
    /// Referral codes are unique across users
    ReferralCode,
    /// Primary key collision
    PrimaryKey,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ActiveRegistration => "active_registration",
            Self::UtrNumber => "utr_number",
            Self::QrCodeHash => "qr_code_hash",
            Self::TicketForRegistration => "ticket_for_registration",
            Self::TicketNumber => "ticket_number",
            Self::ReferralAward => "referral_award",
            Self::UserEmail => "user_email",
            Self::ReferralCode => "referral_code",
            Self::PrimaryKey => "primary_key",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint would be violated.
    #[error("Unique constraint violated: {0}")]
    Conflict(Constraint),

    /// A reservation asked for more tickets than are available.
    #[error("Insufficient inventory for '{ticket_type}' on event {event_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        /// Event the ticket type belongs to
        event_id: EventId,
        /// Ticket type name
        ticket_type: String,
        /// Tickets requested
        requested: u32,
        /// Tickets available when the commit ran
        available: u32,
    },

    /// A compare-and-set found a different status than expected.
    #[error("{entity} {id} changed concurrently: expected {expected}, found {actual}")]
    StaleState {
        /// Entity kind
        entity: &'static str,
        /// Identifier
        id: String,
        /// Status the caller expected
        expected: String,
        /// Status actually stored
        actual: String,
    },

    /// A mutation referenced a missing entity.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier
        id: String,
    },

    /// Database connection or query failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Stored data could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A single write applied as part of an atomic [`EntityStore::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Create a user (unique email and referral code)
    InsertUser(User),
    /// Overwrite a user's profile, role and referral code; `points` is left
    /// untouched (only [`Mutation::AwardReferral`] changes it)
    UpdateUser(User),
    /// Replace a user's password hash
    SetPasswordHash {
        /// User
        user_id: UserId,
        /// PHC-format hash
        password_hash: String,
    },
    /// Create an event together with its ticket types
    InsertEvent(Event),
    /// Change an event's lifecycle status
    SetEventStatus {
        /// Event
        event_id: EventId,
        /// Status the caller expects to replace
        expected: EventStatus,
        /// New status
        status: EventStatus,
        /// Change time
        at: DateTime<Utc>,
    },
    /// Decrement `available`, failing with
    /// [`StoreError::InsufficientInventory`] when fewer than `quantity` remain
    ReserveTickets {
        /// Event
        event_id: EventId,
        /// Ticket type name
        ticket_type: String,
        /// Tickets to reserve
        quantity: u32,
    },
    /// Increment `available`, clamped to the ticket type's `quantity`
    ReleaseTickets {
        /// Event
        event_id: EventId,
        /// Ticket type name
        ticket_type: String,
        /// Tickets to release
        quantity: u32,
    },
    /// Adjust the event's verified attendee count (never below zero)
    AdjustRegisteredCount {
        /// Event
        event_id: EventId,
        /// Signed change
        delta: i64,
    },
    /// Create a registration (one active per event and user, unique UTR)
    InsertRegistration(Registration),
    /// Overwrite a registration if its stored status is still `expected`
    TransitionRegistration {
        /// Status the caller read before deciding
        expected: RegistrationStatus,
        /// New full registration row
        registration: Registration,
    },
    /// Mark a registration as checked in
    RecordCheckIn {
        /// Registration
        registration_id: RegistrationId,
        /// Scan time
        at: DateTime<Utc>,
    },
    /// Create a ticket (one per registration, unique number)
    InsertTicket(Ticket),
    /// Change a ticket's status if it is still `expected`
    TransitionTicket {
        /// Ticket
        ticket_id: TicketId,
        /// Status the caller expects to replace
        expected: TicketStatus,
        /// New status
        status: TicketStatus,
        /// Recorded as `used_at` when moving to [`TicketStatus::Used`]
        at: DateTime<Utc>,
    },
    /// Record a referral award and add `points` to the ambassador; fails
    /// with [`Constraint::ReferralAward`] if the pair was already awarded
    AwardReferral {
        /// Ambassador credited
        ambassador_id: UserId,
        /// User whose verification triggered the award
        referred_user_id: UserId,
        /// Points to add
        points: u64,
        /// Award time
        at: DateTime<Utc>,
    },
    /// Append an audit entry (write-once)
    AppendAudit(AuditEntry),
    /// Replace the settings singleton
    SaveSettings(Settings),
}

/// Filter for registration listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationFilter {
    /// Only this event
    pub event_id: Option<EventId>,
    /// Only this registrant
    pub user_id: Option<UserId>,
    /// Only this status
    pub status: Option<RegistrationStatus>,
}

impl RegistrationFilter {
    /// Whether a registration passes the filter
    #[must_use]
    pub fn matches(&self, registration: &Registration) -> bool {
        self.event_id.is_none_or(|id| registration.event_id == id)
            && self.user_id.is_none_or(|id| registration.user_id == id)
            && self.status.is_none_or(|s| registration.status == s)
    }
}

/// Persistence for users, events, registrations, tickets, settings and the
/// audit log.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one store instance is shared by
/// every in-flight request.
pub trait EntityStore: Send + Sync {
    /// Load a user by id.
    fn get_user(&self, id: UserId) -> StoreFuture<'_, Option<User>>;

    /// Load a user by (lowercased) email.
    fn find_user_by_email(&self, email: String) -> StoreFuture<'_, Option<User>>;

    /// Load a user by referral code.
    fn find_user_by_referral_code(&self, code: String) -> StoreFuture<'_, Option<User>>;

    /// The stored password hash of a user, if one was set.
    fn get_password_hash(&self, id: UserId) -> StoreFuture<'_, Option<String>>;

    /// Ambassadors ordered by points, highest first.
    fn list_ambassadors(&self, limit: usize) -> StoreFuture<'_, Vec<User>>;

    /// Load an event with its ticket types.
    fn get_event(&self, id: EventId) -> StoreFuture<'_, Option<Event>>;

    /// List events, optionally by status, ordered by start time.
    fn list_events(&self, status: Option<EventStatus>) -> StoreFuture<'_, Vec<Event>>;

    /// Load a registration.
    fn get_registration(&self, id: RegistrationId) -> StoreFuture<'_, Option<Registration>>;

    /// The non-cancelled registration of a user for an event, if any.
    fn find_active_registration(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, Option<Registration>>;

    /// List registrations matching a filter, oldest first.
    fn list_registrations(&self, filter: RegistrationFilter) -> StoreFuture<'_, Vec<Registration>>;

    /// Load a ticket.
    fn get_ticket(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>>;

    /// Load a ticket by its number.
    fn find_ticket_by_number(&self, ticket_number: String) -> StoreFuture<'_, Option<Ticket>>;

    /// Load the ticket issued for a registration.
    fn find_ticket_by_registration(
        &self,
        registration_id: RegistrationId,
    ) -> StoreFuture<'_, Option<Ticket>>;

    /// Audit entries, newest first, optionally for one registration.
    fn list_audit(
        &self,
        registration_id: Option<RegistrationId>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<AuditEntry>>;

    /// Return the settings singleton, inserting `defaults` if none exists.
    ///
    /// Concurrent first reads must agree on a single stored document.
    fn load_or_init_settings(&self, defaults: Settings) -> StoreFuture<'_, Settings>;

    /// Apply a batch of mutations atomically.
    ///
    /// # Errors
    ///
    /// - `Conflict`: a uniqueness constraint would be violated
    /// - `InsufficientInventory`: a reservation exceeded `available`
    /// - `StaleState`: a compare-and-set found a different status
    /// - `NotFound`: a mutation referenced a missing entity
    /// - `Database`: the backend failed
    ///
    /// On any error no mutation of the batch is visible.
    fn commit(&self, batch: Vec<Mutation>) -> StoreFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let filter = RegistrationFilter::default();
        let registration = crate::fixtures::registration();
        assert!(filter.matches(&registration));
    }

    #[test]
    fn filter_checks_each_field() {
        let registration = crate::fixtures::registration();
        let by_status = RegistrationFilter {
            status: Some(RegistrationStatus::Verified),
            ..RegistrationFilter::default()
        };
        assert!(!by_status.matches(&registration));

        let by_event = RegistrationFilter {
            event_id: Some(registration.event_id),
            user_id: Some(registration.user_id),
            status: Some(RegistrationStatus::Pending),
        };
        assert!(by_event.matches(&registration));
    }

    #[test]
    fn constraint_names_are_stable() {
        assert_eq!(Constraint::ActiveRegistration.to_string(), "active_registration");
        assert_eq!(
            StoreError::Conflict(Constraint::TicketNumber).to_string(),
            "Unique constraint violated: ticket_number"
        );
    }
}
