//! Row decoding and integer conversions.

use eventpass_core::audit::{AuditAction, AuditEntry};
use eventpass_core::store::StoreError;
use eventpass_core::types::{
    AuditEntryId, CheckInStatus, Event, EventFormat, EventId, EventStatus, Money, PaymentStatus,
    Registration, RegistrationId, RegistrationStatus, Role, Settings, TeamMember, Ticket, TicketId,
    TicketStatus, TicketType, User, UserId,
};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};
use uuid::Uuid;

pub(crate) const USER_COLUMNS: &str =
    "id, name, email, phone, role, referral_code, referred_by, points, created_at";

pub(crate) const EVENT_COLUMNS: &str = "id, organizer_id, title, description, venue, starts_at, \
     capacity, registered_count, status, format, created_at, updated_at";

pub(crate) const REGISTRATION_COLUMNS: &str = "id, event_id, user_id, ticket_type, quantity, \
     team_name, team_members, utr_number, payment_proof_url, total_amount_minor, payment_status, \
     status, rejection_reason, check_in_status, checked_in_at, qr_code_hash, verified_by, \
     verified_at, created_at, updated_at";

pub(crate) const TICKET_COLUMNS: &str =
    "id, ticket_number, registration_id, event_id, user_id, qr_code, status, issued_at, used_at";

pub(crate) const AUDIT_COLUMNS: &str = "id, action, actor_id, registration_id, event_id, \
     ticket_id, target_user_id, detail, created_at";

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Serialization(format!("column {name}: {e}")))
}

fn parsed<T>(value: &str, parse: impl Fn(&str) -> Option<T>, what: &str) -> Result<T, StoreError> {
    parse(value).ok_or_else(|| StoreError::Serialization(format!("invalid {what}: {value}")))
}

pub(crate) fn to_i64(value: u32) -> i64 {
    i64::from(value)
}

pub(crate) fn money_to_i64(money: Money) -> Result<i64, StoreError> {
    i64::try_from(money.minor())
        .map_err(|_| StoreError::Serialization(format!("amount out of range: {money}")))
}

fn to_u32(value: i64, what: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Serialization(format!("{what} out of range: {value}")))
}

fn to_money(value: i64) -> Result<Money, StoreError> {
    u64::try_from(value)
        .map(Money::from_minor)
        .map_err(|_| StoreError::Serialization(format!("negative amount: {value}")))
}

pub(crate) fn user(row: &PgRow) -> Result<User, StoreError> {
    let role: String = column(row, "role")?;
    let points: i64 = column(row, "points")?;
    Ok(User {
        id: UserId::from_uuid(column(row, "id")?),
        name: column(row, "name")?,
        email: column(row, "email")?,
        phone: column(row, "phone")?,
        role: parsed(&role, Role::parse, "role")?,
        referral_code: column(row, "referral_code")?,
        referred_by: column::<Option<Uuid>>(row, "referred_by")?.map(UserId::from_uuid),
        points: u64::try_from(points)
            .map_err(|_| StoreError::Serialization(format!("negative points: {points}")))?,
        created_at: column(row, "created_at")?,
    })
}

pub(crate) fn ticket_type(row: &PgRow) -> Result<TicketType, StoreError> {
    Ok(TicketType {
        name: column(row, "name")?,
        price: to_money(column(row, "price_minor")?)?,
        quantity: to_u32(column(row, "quantity")?, "quantity")?,
        available: to_u32(column(row, "available")?, "available")?,
        description: column(row, "description")?,
    })
}

/// Decodes an event row; ticket types are loaded separately.
pub(crate) fn event(row: &PgRow, ticket_types: Vec<TicketType>) -> Result<Event, StoreError> {
    let status: String = column(row, "status")?;
    let format: serde_json::Value = column(row, "format")?;
    Ok(Event {
        id: EventId::from_uuid(column(row, "id")?),
        organizer_id: UserId::from_uuid(column(row, "organizer_id")?),
        title: column(row, "title")?,
        description: column(row, "description")?,
        venue: column(row, "venue")?,
        starts_at: column(row, "starts_at")?,
        ticket_types,
        capacity: to_u32(column(row, "capacity")?, "capacity")?,
        registered_count: to_u32(column(row, "registered_count")?, "registered_count")?,
        status: parsed(&status, EventStatus::parse, "event status")?,
        format: serde_json::from_value::<EventFormat>(format)
            .map_err(|e| StoreError::Serialization(format!("event format: {e}")))?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn registration(row: &PgRow) -> Result<Registration, StoreError> {
    let payment_status: String = column(row, "payment_status")?;
    let status: String = column(row, "status")?;
    let check_in_status: String = column(row, "check_in_status")?;
    let team_members: serde_json::Value = column(row, "team_members")?;
    Ok(Registration {
        id: RegistrationId::from_uuid(column(row, "id")?),
        event_id: EventId::from_uuid(column(row, "event_id")?),
        user_id: UserId::from_uuid(column(row, "user_id")?),
        ticket_type: column(row, "ticket_type")?,
        quantity: to_u32(column(row, "quantity")?, "quantity")?,
        team_name: column(row, "team_name")?,
        team_members: serde_json::from_value::<Vec<TeamMember>>(team_members)
            .map_err(|e| StoreError::Serialization(format!("team members: {e}")))?,
        utr_number: column(row, "utr_number")?,
        payment_proof_url: column(row, "payment_proof_url")?,
        total_amount: to_money(column(row, "total_amount_minor")?)?,
        payment_status: parsed(&payment_status, PaymentStatus::parse, "payment status")?,
        status: parsed(&status, RegistrationStatus::parse, "registration status")?,
        rejection_reason: column(row, "rejection_reason")?,
        check_in_status: parsed(&check_in_status, CheckInStatus::parse, "check-in status")?,
        checked_in_at: column(row, "checked_in_at")?,
        qr_code_hash: column(row, "qr_code_hash")?,
        verified_by: column::<Option<Uuid>>(row, "verified_by")?.map(UserId::from_uuid),
        verified_at: column(row, "verified_at")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn ticket(row: &PgRow) -> Result<Ticket, StoreError> {
    let status: String = column(row, "status")?;
    Ok(Ticket {
        id: TicketId::from_uuid(column(row, "id")?),
        ticket_number: column(row, "ticket_number")?,
        registration_id: RegistrationId::from_uuid(column(row, "registration_id")?),
        event_id: EventId::from_uuid(column(row, "event_id")?),
        user_id: UserId::from_uuid(column(row, "user_id")?),
        qr_code: column(row, "qr_code")?,
        status: parsed(&status, TicketStatus::parse, "ticket status")?,
        issued_at: column(row, "issued_at")?,
        used_at: column(row, "used_at")?,
    })
}

pub(crate) fn audit_entry(row: &PgRow) -> Result<AuditEntry, StoreError> {
    let action: String = column(row, "action")?;
    Ok(AuditEntry {
        id: AuditEntryId::from_uuid(column(row, "id")?),
        action: parsed(&action, AuditAction::parse, "audit action")?,
        actor_id: UserId::from_uuid(column(row, "actor_id")?),
        registration_id: column::<Option<Uuid>>(row, "registration_id")?
            .map(RegistrationId::from_uuid),
        event_id: column::<Option<Uuid>>(row, "event_id")?.map(EventId::from_uuid),
        ticket_id: column::<Option<Uuid>>(row, "ticket_id")?.map(TicketId::from_uuid),
        target_user_id: column::<Option<Uuid>>(row, "target_user_id")?.map(UserId::from_uuid),
        detail: column(row, "detail")?,
        created_at: column(row, "created_at")?,
    })
}

pub(crate) fn settings(row: &PgRow) -> Result<Settings, StoreError> {
    Ok(Settings {
        upi_id: column(row, "upi_id")?,
        payee_name: column(row, "payee_name")?,
        qr_image_url: column(row, "qr_image_url")?,
        instructions: column(row, "instructions")?,
        updated_at: column(row, "updated_at")?,
        updated_by: column::<Option<Uuid>>(row, "updated_by")?.map(UserId::from_uuid),
    })
}
