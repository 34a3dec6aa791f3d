//! Domain types for the EventPass ticketing platform.
//!
//! Identifiers, value objects and the persisted entities: users, events with
//! their ticket types, registrations, tickets and the payment settings
//! singleton.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner `Uuid`
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a user account
    UserId
);
entity_id!(
    /// Unique identifier for an event
    EventId
);
entity_id!(
    /// Unique identifier for a registration
    RegistrationId
);
entity_id!(
    /// Unique identifier for an issued ticket
    TicketId
);
entity_id!(
    /// Unique identifier for an audit log entry
    AuditEntryId
);

// ============================================================================
// Money (minor units to avoid floating point errors)
// ============================================================================

/// An amount of money in minor units (paise).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates an amount from minor units
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Creates an amount from major units (rupees), saturating on overflow
    #[must_use]
    pub const fn from_major(major: u64) -> Self {
        Self(major.saturating_mul(100))
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Whether the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies by a quantity, returning `None` on overflow
    #[must_use]
    pub const fn checked_mul(&self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(minor) => Some(Self(minor)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Users
// ============================================================================

/// Role of a user account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular registrant
    User,
    /// Platform administrator (verifies payments)
    Admin,
    /// Event coordinator (creates events, checks attendees in)
    Coordinator,
    /// Campus ambassador (earns referral points)
    Ambassador,
}

impl Role {
    /// Database representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Coordinator => "coordinator",
            Self::Ambassador => "ambassador",
        }
    }

    /// Parses the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            "coordinator" => Some(Self::Coordinator),
            "ambassador" => Some(Self::Ambassador),
            _ => None,
        }
    }

    /// Admins and coordinators run events on site
    #[must_use]
    pub const fn is_staff(&self) -> bool {
        matches!(self, Self::Admin | Self::Coordinator)
    }
}

/// A user account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identity
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Email address (lowercased)
    pub email: String,
    /// Phone number (digits only)
    pub phone: Option<String>,
    /// Role
    pub role: Role,
    /// Referral code handed out by ambassadors
    pub referral_code: Option<String>,
    /// Ambassador who referred this user
    pub referred_by: Option<UserId>,
    /// Referral points (ambassadors only)
    pub points: u64,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Events
// ============================================================================

/// Lifecycle status of an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Being prepared, not open for registration
    Draft,
    /// Open for registration
    Published,
    /// Called off
    Cancelled,
    /// Took place
    Completed,
}

impl EventStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    /// Parses the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Whether an event is entered alone or as a team
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventFormat {
    /// Individual participation
    Solo,
    /// Team participation; sizes include the leader
    Team {
        /// Smallest allowed team
        min_team_size: u32,
        /// Largest allowed team
        max_team_size: u32,
    },
}

impl EventFormat {
    /// Database representation of the format kind
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Solo => "solo",
            Self::Team { .. } => "team",
        }
    }
}

/// A priced inventory line within an event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    /// Name, unique within the event (e.g. "Standard", "VIP")
    pub name: String,
    /// Price per ticket
    pub price: Money,
    /// Total tickets of this type
    pub quantity: u32,
    /// Tickets not yet reserved; `0 <= available <= quantity`
    pub available: u32,
    /// Free-form description
    pub description: String,
}

/// An event open for registration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Identity
    pub id: EventId,
    /// Organizer who owns the event
    pub organizer_id: UserId,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Venue
    pub venue: String,
    /// When the event starts
    pub starts_at: DateTime<Utc>,
    /// Ticket types on sale
    pub ticket_types: Vec<TicketType>,
    /// Maximum attendees
    pub capacity: u32,
    /// Attendees with a verified registration
    pub registered_count: u32,
    /// Lifecycle status
    pub status: EventStatus,
    /// Solo or team participation
    pub format: EventFormat,
    /// When the event was created
    pub created_at: DateTime<Utc>,
    /// When the event was last changed
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Looks up a ticket type by name
    #[must_use]
    pub fn ticket_type(&self, name: &str) -> Option<&TicketType> {
        self.ticket_types.iter().find(|t| t.name == name)
    }
}

// ============================================================================
// Registrations
// ============================================================================

/// Workflow status of a registration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Submitted, awaiting payment verification
    Pending,
    /// Payment verified, ticket issued
    Verified,
    /// Payment proof rejected; may be resubmitted
    Rejected,
    /// Withdrawn (terminal)
    Cancelled,
}

impl RegistrationStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "verified" => Some(Self::Verified),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether the registration still occupies its (event, user) slot
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Whether the registration currently holds reserved inventory
    #[must_use]
    pub const fn holds_inventory(&self) -> bool {
        matches!(self, Self::Pending | Self::Verified)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status of a registration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Proof submitted, not yet checked
    Pending,
    /// Verified by an admin
    Completed,
    /// Proof rejected
    Failed,
    /// Money returned
    Refunded,
}

impl PaymentStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Parses the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

/// Attendance status of a registration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    /// Not yet at the venue
    #[default]
    NotCheckedIn,
    /// Ticket scanned at the venue
    CheckedIn,
}

impl CheckInStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotCheckedIn => "not_checked_in",
            Self::CheckedIn => "checked_in",
        }
    }

    /// Parses the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_checked_in" => Some(Self::NotCheckedIn),
            "checked_in" => Some(Self::CheckedIn),
            _ => None,
        }
    }
}

/// A member of a registrant's team (the leader is not listed)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    /// Full name
    pub name: String,
    /// Email address
    pub email: String,
    /// Phone number
    pub phone: Option<String>,
}

/// A user's registration for an event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Identity
    pub id: RegistrationId,
    /// Event registered for
    pub event_id: EventId,
    /// Registrant (team leader for team events)
    pub user_id: UserId,
    /// Ticket type name on the event
    pub ticket_type: String,
    /// Number of tickets
    pub quantity: u32,
    /// Team name (team events)
    pub team_name: Option<String>,
    /// Team members excluding the leader
    pub team_members: Vec<TeamMember>,
    /// Payment transaction reference
    pub utr_number: String,
    /// Where the payment screenshot is stored
    pub payment_proof_url: String,
    /// `price × quantity`, computed server-side
    pub total_amount: Money,
    /// Payment status
    pub payment_status: PaymentStatus,
    /// Workflow status
    pub status: RegistrationStatus,
    /// Why the payment proof was rejected
    pub rejection_reason: Option<String>,
    /// Attendance
    pub check_in_status: CheckInStatus,
    /// When the ticket was scanned
    pub checked_in_at: Option<DateTime<Utc>>,
    /// SHA-256 of the issued ticket's QR payload
    pub qr_code_hash: Option<String>,
    /// Admin who verified the payment
    pub verified_by: Option<UserId>,
    /// When the payment was verified
    pub verified_at: Option<DateTime<Utc>>,
    /// When the registration was created
    pub created_at: DateTime<Utc>,
    /// When the registration last changed
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Tickets
// ============================================================================

/// Status of an issued ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Can be scanned
    Valid,
    /// Scanned at the venue
    Used,
    /// Registration was cancelled
    Cancelled,
    /// Event is over
    Expired,
}

impl TicketStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Used => "used",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// Parses the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(Self::Valid),
            "used" => Some(Self::Used),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ticket issued for a verified registration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Identity
    pub id: TicketId,
    /// Human readable unique number (`TKT-…`)
    pub ticket_number: String,
    /// Registration the ticket was issued for
    pub registration_id: RegistrationId,
    /// Event
    pub event_id: EventId,
    /// Holder
    pub user_id: UserId,
    /// Signed payload rendered as the QR code
    pub qr_code: String,
    /// Status
    pub status: TicketStatus,
    /// When the ticket was issued
    pub issued_at: DateTime<Utc>,
    /// When the ticket was scanned
    pub used_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Settings
// ============================================================================

/// Payment details shown to registrants (singleton)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// UPI id payments are sent to
    pub upi_id: String,
    /// Name of the payee
    pub payee_name: String,
    /// URL of the payment QR image
    pub qr_image_url: Option<String>,
    /// Extra instructions for registrants
    pub instructions: Option<String>,
    /// When the settings last changed
    pub updated_at: DateTime<Utc>,
    /// Admin who last changed them
    pub updated_by: Option<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_multiplies_by_quantity() {
        let price = Money::from_major(101);
        assert_eq!(price.checked_mul(2), Some(Money::from_major(202)));
        assert_eq!(Money::from_minor(u64::MAX).checked_mul(2), None);
    }

    #[test]
    fn money_displays_in_rupees() {
        assert_eq!(Money::from_minor(10_150).to_string(), "₹101.50");
    }

    #[test]
    fn statuses_round_trip_through_strings() {
        for status in [
            RegistrationStatus::Pending,
            RegistrationStatus::Verified,
            RegistrationStatus::Rejected,
            RegistrationStatus::Cancelled,
        ] {
            assert_eq!(RegistrationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TicketStatus::parse("bogus"), None);
    }

    #[test]
    fn only_pending_and_verified_hold_inventory() {
        assert!(RegistrationStatus::Pending.holds_inventory());
        assert!(RegistrationStatus::Verified.holds_inventory());
        assert!(!RegistrationStatus::Rejected.holds_inventory());
        assert!(!RegistrationStatus::Cancelled.holds_inventory());
        assert!(RegistrationStatus::Rejected.is_active());
    }

    #[test]
    fn event_format_serializes_with_tag() {
        let json = serde_json::to_value(EventFormat::Team {
            min_team_size: 2,
            max_team_size: 4,
        })
        .unwrap_or_default();
        assert_eq!(json["event_type"], "team");
        assert_eq!(json["max_team_size"], 4);
    }
}
