//! Sample entities for unit tests.

use crate::types::{
    CheckInStatus, Event, EventFormat, EventId, EventStatus, Money, PaymentStatus, Registration,
    RegistrationId, RegistrationStatus, Role, TicketType, User, UserId,
};
use chrono::{TimeZone, Utc};

pub(crate) fn user() -> User {
    User {
        id: UserId::new(),
        name: "Test User".into(),
        email: "user@example.com".into(),
        phone: None,
        role: Role::User,
        referral_code: None,
        referred_by: None,
        points: 0,
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    }
}

pub(crate) fn event() -> Event {
    let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    Event {
        id: EventId::new(),
        organizer_id: UserId::new(),
        title: "Hack Night".into(),
        description: "Overnight hackathon".into(),
        venue: "Main Auditorium".into(),
        starts_at: Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap(),
        ticket_types: vec![TicketType {
            name: "Standard".into(),
            price: Money::from_major(101),
            quantity: 100,
            available: 100,
            description: String::new(),
        }],
        capacity: 100,
        registered_count: 0,
        status: EventStatus::Published,
        format: EventFormat::Solo,
        created_at: at,
        updated_at: at,
    }
}

pub(crate) fn registration() -> Registration {
    let at = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
    Registration {
        id: RegistrationId::new(),
        event_id: EventId::new(),
        user_id: UserId::new(),
        ticket_type: "Standard".into(),
        quantity: 1,
        team_name: None,
        team_members: Vec::new(),
        utr_number: "412345678901".into(),
        payment_proof_url: "/uploads/proof.png".into(),
        total_amount: Money::from_major(101),
        payment_status: PaymentStatus::Pending,
        status: RegistrationStatus::Pending,
        rejection_reason: None,
        check_in_status: CheckInStatus::NotCheckedIn,
        checked_in_at: None,
        qr_code_hash: None,
        verified_by: None,
        verified_at: None,
        created_at: at,
        updated_at: at,
    }
}
