//! `PostgreSQL` implementation of [`EntityStore`].

use crate::rows::{
    self, AUDIT_COLUMNS, EVENT_COLUMNS, REGISTRATION_COLUMNS, TICKET_COLUMNS, USER_COLUMNS,
    money_to_i64, to_i64,
};
use eventpass_core::audit::AuditEntry;
use eventpass_core::store::{
    Constraint, EntityStore, Mutation, RegistrationFilter, StoreError, StoreFuture,
};
use eventpass_core::types::{
    Event, EventId, EventStatus, Registration, RegistrationId, Settings, Ticket, TicketId,
    TicketType, User, UserId,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Maps a database error to a [`StoreError`], naming the violated constraint.
fn db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(constraint_for(db_err.constraint()));
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::NotFound {
                entity: "referenced row",
                id: db_err.constraint().unwrap_or("unknown").to_string(),
            };
        }
    }
    StoreError::Database(err.to_string())
}

fn constraint_for(name: Option<&str>) -> Constraint {
    match name {
        Some("registrations_active_key") => Constraint::ActiveRegistration,
        Some("registrations_utr_number_key") => Constraint::UtrNumber,
        Some("registrations_qr_code_hash_key") => Constraint::QrCodeHash,
        Some("tickets_registration_id_key") => Constraint::TicketForRegistration,
        Some("tickets_ticket_number_key") => Constraint::TicketNumber,
        Some("referral_awards_pkey") => Constraint::ReferralAward,
        Some("users_email_key") => Constraint::UserEmail,
        Some("users_referral_code_key") => Constraint::ReferralCode,
        _ => Constraint::PrimaryKey,
    }
}

fn json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[allow(clippy::cast_possible_wrap)] // Limits are small
const fn limit(value: usize) -> i64 {
    value as i64
}

/// `PostgreSQL`-backed entity store.
///
/// Every [`EntityStore::commit`] runs in one transaction. Inventory changes
/// are single conditional `UPDATE`s (`available >= n`), status changes
/// compare the stored status in their `WHERE` clause, and uniqueness is
/// enforced by named constraints and a partial unique index on active
/// registrations.
#[derive(Clone)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    /// Connects to `database_url` with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Checks the database answers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn ticket_types_for(&self, event_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<TicketType>>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT event_id, name, price_minor, quantity, available, description
            FROM ticket_types
            WHERE event_id = ANY($1)
            ORDER BY event_id, position
            ",
        )
        .bind(event_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut by_event: HashMap<Uuid, Vec<TicketType>> = HashMap::new();
        for row in &rows {
            let event_id: Uuid = row
                .try_get("event_id")
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            by_event.entry(event_id).or_default().push(rows::ticket_type(row)?);
        }
        Ok(by_event)
    }

    async fn events_from_rows(&self, event_rows: Vec<PgRow>) -> Result<Vec<Event>, StoreError> {
        let ids = event_rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut ticket_types = self.ticket_types_for(&ids).await?;
        event_rows
            .iter()
            .zip(ids)
            .map(|(row, id)| rows::event(row, ticket_types.remove(&id).unwrap_or_default()))
            .collect()
    }

    async fn fetch_user(&self, sql: &str, value: String) -> Result<Option<User>, StoreError> {
        sqlx::query(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .as_ref()
            .map(rows::user)
            .transpose()
    }

    async fn apply(tx: &mut Transaction<'static, Postgres>, mutation: Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::InsertUser(user) => {
                sqlx::query(
                    r"
                    INSERT INTO users
                        (id, name, email, phone, role, referral_code, referred_by, points, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    ",
                )
                .bind(*user.id.as_uuid())
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.phone)
                .bind(user.role.as_str())
                .bind(&user.referral_code)
                .bind(user.referred_by.map(|id| *id.as_uuid()))
                .bind(i64::try_from(user.points).unwrap_or(i64::MAX))
                .bind(user.created_at)
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
            }
            Mutation::UpdateUser(user) => {
                let result = sqlx::query(
                    r"
                    UPDATE users
                    SET name = $2, email = $3, phone = $4, role = $5,
                        referral_code = $6, referred_by = $7
                    WHERE id = $1
                    ",
                )
                .bind(*user.id.as_uuid())
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.phone)
                .bind(user.role.as_str())
                .bind(&user.referral_code)
                .bind(user.referred_by.map(|id| *id.as_uuid()))
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
                if result.rows_affected() == 0 {
                    return Err(not_found("user", user.id));
                }
            }
            Mutation::SetPasswordHash {
                user_id,
                password_hash,
            } => {
                let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
                    .bind(*user_id.as_uuid())
                    .bind(password_hash)
                    .execute(&mut **tx)
                    .await
                    .map_err(db_error)?;
                if result.rows_affected() == 0 {
                    return Err(not_found("user", user_id));
                }
            }
            Mutation::InsertEvent(event) => {
                sqlx::query(
                    r"
                    INSERT INTO events
                        (id, organizer_id, title, description, venue, starts_at, capacity,
                         registered_count, status, format, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    ",
                )
                .bind(*event.id.as_uuid())
                .bind(*event.organizer_id.as_uuid())
                .bind(&event.title)
                .bind(&event.description)
                .bind(&event.venue)
                .bind(event.starts_at)
                .bind(to_i64(event.capacity))
                .bind(to_i64(event.registered_count))
                .bind(event.status.as_str())
                .bind(json(&event.format)?)
                .bind(event.created_at)
                .bind(event.updated_at)
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;

                if event.ticket_types.is_empty() {
                    return Ok(());
                }
                let mut insert = QueryBuilder::<Postgres>::new(
                    "INSERT INTO ticket_types \
                     (event_id, name, position, price_minor, quantity, available, description) ",
                );
                let mut lines = Vec::with_capacity(event.ticket_types.len());
                for (position, line) in event.ticket_types.iter().enumerate() {
                    lines.push((
                        i32::try_from(position).unwrap_or(i32::MAX),
                        money_to_i64(line.price)?,
                        line,
                    ));
                }
                insert.push_values(lines, |mut values, (position, price, line)| {
                    values
                        .push_bind(*event.id.as_uuid())
                        .push_bind(line.name.clone())
                        .push_bind(position)
                        .push_bind(price)
                        .push_bind(to_i64(line.quantity))
                        .push_bind(to_i64(line.available))
                        .push_bind(line.description.clone());
                });
                insert.build().execute(&mut **tx).await.map_err(db_error)?;
            }
            Mutation::SetEventStatus {
                event_id,
                expected,
                status,
                at,
            } => {
                let result = sqlx::query(
                    "UPDATE events SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2",
                )
                .bind(*event_id.as_uuid())
                .bind(expected.as_str())
                .bind(status.as_str())
                .bind(at)
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
                if result.rows_affected() == 0 {
                    let actual = current_status(tx, "events", *event_id.as_uuid()).await?;
                    return Err(stale_or_missing("event", event_id, expected.as_str(), actual));
                }
            }
            Mutation::ReserveTickets {
                event_id,
                ticket_type,
                quantity,
            } => {
                let result = sqlx::query(
                    r"
                    UPDATE ticket_types
                    SET available = available - $3
                    WHERE event_id = $1 AND name = $2 AND available >= $3
                    ",
                )
                .bind(*event_id.as_uuid())
                .bind(&ticket_type)
                .bind(to_i64(quantity))
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
                if result.rows_affected() == 0 {
                    let available: Option<i64> = sqlx::query_scalar(
                        "SELECT available FROM ticket_types WHERE event_id = $1 AND name = $2",
                    )
                    .bind(*event_id.as_uuid())
                    .bind(&ticket_type)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(db_error)?;
                    let Some(available) = available else {
                        return Err(not_found("ticket type", &ticket_type));
                    };
                    return Err(StoreError::InsufficientInventory {
                        event_id,
                        ticket_type,
                        requested: quantity,
                        available: u32::try_from(available).unwrap_or(0),
                    });
                }
            }
            Mutation::ReleaseTickets {
                event_id,
                ticket_type,
                quantity,
            } => {
                let result = sqlx::query(
                    r"
                    UPDATE ticket_types
                    SET available = LEAST(quantity, available + $3)
                    WHERE event_id = $1 AND name = $2
                    ",
                )
                .bind(*event_id.as_uuid())
                .bind(&ticket_type)
                .bind(to_i64(quantity))
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
                if result.rows_affected() == 0 {
                    return Err(not_found("ticket type", &ticket_type));
                }
            }
            Mutation::AdjustRegisteredCount { event_id, delta } => {
                let result = sqlx::query(
                    "UPDATE events SET registered_count = GREATEST(0, registered_count + $2) WHERE id = $1",
                )
                .bind(*event_id.as_uuid())
                .bind(delta)
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
                if result.rows_affected() == 0 {
                    return Err(not_found("event", event_id));
                }
            }
            Mutation::InsertRegistration(registration) => {
                sqlx::query(
                    r"
                    INSERT INTO registrations
                        (id, event_id, user_id, ticket_type, quantity, team_name, team_members,
                         utr_number, payment_proof_url, total_amount_minor, payment_status, status,
                         rejection_reason, check_in_status, checked_in_at, qr_code_hash,
                         verified_by, verified_at, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                            $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
                    ",
                )
                .bind(*registration.id.as_uuid())
                .bind(*registration.event_id.as_uuid())
                .bind(*registration.user_id.as_uuid())
                .bind(&registration.ticket_type)
                .bind(to_i64(registration.quantity))
                .bind(&registration.team_name)
                .bind(json(&registration.team_members)?)
                .bind(&registration.utr_number)
                .bind(&registration.payment_proof_url)
                .bind(money_to_i64(registration.total_amount)?)
                .bind(registration.payment_status.as_str())
                .bind(registration.status.as_str())
                .bind(&registration.rejection_reason)
                .bind(registration.check_in_status.as_str())
                .bind(registration.checked_in_at)
                .bind(&registration.qr_code_hash)
                .bind(registration.verified_by.map(|id| *id.as_uuid()))
                .bind(registration.verified_at)
                .bind(registration.created_at)
                .bind(registration.updated_at)
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
            }
            Mutation::TransitionRegistration {
                expected,
                registration,
            } => {
                let result = sqlx::query(
                    r"
                    UPDATE registrations
                    SET team_name = $3, team_members = $4, utr_number = $5,
                        payment_proof_url = $6, total_amount_minor = $7, payment_status = $8,
                        status = $9, rejection_reason = $10, qr_code_hash = $11,
                        verified_by = $12, verified_at = $13, updated_at = $14
                    WHERE id = $1 AND status = $2
                    ",
                )
                .bind(*registration.id.as_uuid())
                .bind(expected.as_str())
                .bind(&registration.team_name)
                .bind(json(&registration.team_members)?)
                .bind(&registration.utr_number)
                .bind(&registration.payment_proof_url)
                .bind(money_to_i64(registration.total_amount)?)
                .bind(registration.payment_status.as_str())
                .bind(registration.status.as_str())
                .bind(&registration.rejection_reason)
                .bind(&registration.qr_code_hash)
                .bind(registration.verified_by.map(|id| *id.as_uuid()))
                .bind(registration.verified_at)
                .bind(registration.updated_at)
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
                if result.rows_affected() == 0 {
                    let actual = current_status(tx, "registrations", *registration.id.as_uuid()).await?;
                    return Err(stale_or_missing(
                        "registration",
                        registration.id,
                        expected.as_str(),
                        actual,
                    ));
                }
            }
            Mutation::RecordCheckIn {
                registration_id,
                at,
            } => {
                let result = sqlx::query(
                    r"
                    UPDATE registrations
                    SET check_in_status = 'checked_in', checked_in_at = $2, updated_at = $2
                    WHERE id = $1
                    ",
                )
                .bind(*registration_id.as_uuid())
                .bind(at)
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
                if result.rows_affected() == 0 {
                    return Err(not_found("registration", registration_id));
                }
            }
            Mutation::InsertTicket(ticket) => {
                sqlx::query(
                    r"
                    INSERT INTO tickets
                        (id, ticket_number, registration_id, event_id, user_id, qr_code,
                         status, issued_at, used_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    ",
                )
                .bind(*ticket.id.as_uuid())
                .bind(&ticket.ticket_number)
                .bind(*ticket.registration_id.as_uuid())
                .bind(*ticket.event_id.as_uuid())
                .bind(*ticket.user_id.as_uuid())
                .bind(&ticket.qr_code)
                .bind(ticket.status.as_str())
                .bind(ticket.issued_at)
                .bind(ticket.used_at)
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
            }
            Mutation::TransitionTicket {
                ticket_id,
                expected,
                status,
                at,
            } => {
                let result = sqlx::query(
                    r"
                    UPDATE tickets
                    SET status = $3,
                        used_at = CASE WHEN $3 = 'used' THEN $4 ELSE used_at END
                    WHERE id = $1 AND status = $2
                    ",
                )
                .bind(*ticket_id.as_uuid())
                .bind(expected.as_str())
                .bind(status.as_str())
                .bind(at)
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
                if result.rows_affected() == 0 {
                    let actual = current_status(tx, "tickets", *ticket_id.as_uuid()).await?;
                    return Err(stale_or_missing("ticket", ticket_id, expected.as_str(), actual));
                }
            }
            Mutation::AwardReferral {
                ambassador_id,
                referred_user_id,
                points,
                at,
            } => {
                let points = i64::try_from(points)
                    .map_err(|_| StoreError::Serialization(format!("points out of range: {points}")))?;
                let result = sqlx::query("UPDATE users SET points = points + $2 WHERE id = $1")
                    .bind(*ambassador_id.as_uuid())
                    .bind(points)
                    .execute(&mut **tx)
                    .await
                    .map_err(db_error)?;
                if result.rows_affected() == 0 {
                    return Err(not_found("user", ambassador_id));
                }

                sqlx::query(
                    r"
                    INSERT INTO referral_awards (ambassador_id, referred_user_id, points, awarded_at)
                    VALUES ($1, $2, $3, $4)
                    ",
                )
                .bind(*ambassador_id.as_uuid())
                .bind(*referred_user_id.as_uuid())
                .bind(points)
                .bind(at)
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
            }
            Mutation::AppendAudit(entry) => insert_audit(tx, &entry).await?,
            Mutation::SaveSettings(settings) => {
                sqlx::query(
                    r"
                    INSERT INTO settings (id, upi_id, payee_name, qr_image_url, instructions, updated_at, updated_by)
                    VALUES (1, $1, $2, $3, $4, $5, $6)
                    ON CONFLICT (id) DO UPDATE
                    SET upi_id = EXCLUDED.upi_id,
                        payee_name = EXCLUDED.payee_name,
                        qr_image_url = EXCLUDED.qr_image_url,
                        instructions = EXCLUDED.instructions,
                        updated_at = EXCLUDED.updated_at,
                        updated_by = EXCLUDED.updated_by
                    ",
                )
                .bind(&settings.upi_id)
                .bind(&settings.payee_name)
                .bind(&settings.qr_image_url)
                .bind(&settings.instructions)
                .bind(settings.updated_at)
                .bind(settings.updated_by.map(|id| *id.as_uuid()))
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
            }
        }
        Ok(())
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

fn stale_or_missing(
    entity: &'static str,
    id: impl ToString,
    expected: &str,
    actual: Option<String>,
) -> StoreError {
    match actual {
        Some(actual) => StoreError::StaleState {
            entity,
            id: id.to_string(),
            expected: expected.to_string(),
            actual,
        },
        None => not_found(entity, id),
    }
}

/// Status column of a row in `table`; `table` is always a literal.
async fn current_status(
    tx: &mut Transaction<'static, Postgres>,
    table: &'static str,
    id: Uuid,
) -> Result<Option<String>, StoreError> {
    sqlx::query_scalar(&format!("SELECT status FROM {table} WHERE id = $1"))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)
}

async fn insert_audit(
    tx: &mut Transaction<'static, Postgres>,
    entry: &AuditEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        r"
        INSERT INTO audit_log
            (id, action, actor_id, registration_id, event_id, ticket_id, target_user_id, detail, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ",
    )
    .bind(*entry.id.as_uuid())
    .bind(entry.action.as_str())
    .bind(*entry.actor_id.as_uuid())
    .bind(entry.registration_id.map(|id| *id.as_uuid()))
    .bind(entry.event_id.map(|id| *id.as_uuid()))
    .bind(entry.ticket_id.map(|id| *id.as_uuid()))
    .bind(entry.target_user_id.map(|id| *id.as_uuid()))
    .bind(&entry.detail)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await
    .map_err(db_error)?;
    Ok(())
}

impl EntityStore for PostgresEntityStore {
    fn get_user(&self, id: UserId) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move {
            sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?
                .as_ref()
                .map(rows::user)
                .transpose()
        })
    }

    fn find_user_by_email(&self, email: String) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move {
            self.fetch_user(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = lower($1)"),
                email,
            )
            .await
        })
    }

    fn find_user_by_referral_code(&self, code: String) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move {
            self.fetch_user(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE referral_code = $1"),
                code,
            )
            .await
        })
    }

    fn get_password_hash(&self, id: UserId) -> StoreFuture<'_, Option<String>> {
        Box::pin(async move {
            let hash: Option<Option<String>> =
                sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
                    .bind(*id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_error)?;
            Ok(hash.flatten())
        })
    }

    fn list_ambassadors(&self, max: usize) -> StoreFuture<'_, Vec<User>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE role = 'ambassador' \
                 ORDER BY points DESC, created_at ASC LIMIT $1"
            ))
            .bind(limit(max))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?
            .iter()
            .map(rows::user)
            .collect()
        })
    }

    fn get_event(&self, id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
                .bind(*id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
            Ok(self.events_from_rows(rows).await?.pop())
        })
    }

    fn list_events(&self, status: Option<EventStatus>) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {EVENT_COLUMNS} FROM events \
                 WHERE ($1::text IS NULL OR status = $1) ORDER BY starts_at, id"
            ))
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            self.events_from_rows(rows).await
        })
    }

    fn get_registration(&self, id: RegistrationId) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1"
            ))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .as_ref()
            .map(rows::registration)
            .transpose()
        })
    }

    fn find_active_registration(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations \
                 WHERE event_id = $1 AND user_id = $2 AND status <> 'cancelled'"
            ))
            .bind(*event_id.as_uuid())
            .bind(*user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .as_ref()
            .map(rows::registration)
            .transpose()
        })
    }

    fn list_registrations(&self, filter: RegistrationFilter) -> StoreFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations \
                 WHERE ($1::uuid IS NULL OR event_id = $1) \
                   AND ($2::uuid IS NULL OR user_id = $2) \
                   AND ($3::text IS NULL OR status = $3) \
                 ORDER BY created_at, id"
            ))
            .bind(filter.event_id.map(|id| *id.as_uuid()))
            .bind(filter.user_id.map(|id| *id.as_uuid()))
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?
            .iter()
            .map(rows::registration)
            .collect()
        })
    }

    fn get_ticket(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?
                .as_ref()
                .map(rows::ticket)
                .transpose()
        })
    }

    fn find_ticket_by_number(&self, ticket_number: String) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE ticket_number = $1"
            ))
            .bind(ticket_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .as_ref()
            .map(rows::ticket)
            .transpose()
        })
    }

    fn find_ticket_by_registration(
        &self,
        registration_id: RegistrationId,
    ) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE registration_id = $1"
            ))
            .bind(*registration_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .as_ref()
            .map(rows::ticket)
            .transpose()
        })
    }

    fn list_audit(
        &self,
        registration_id: Option<RegistrationId>,
        max: usize,
    ) -> StoreFuture<'_, Vec<AuditEntry>> {
        Box::pin(async move {
            sqlx::query(&format!(
                "SELECT {AUDIT_COLUMNS} FROM audit_log \
                 WHERE ($1::uuid IS NULL OR registration_id = $1) \
                 ORDER BY created_at DESC LIMIT $2"
            ))
            .bind(registration_id.map(|id| *id.as_uuid()))
            .bind(limit(max))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?
            .iter()
            .map(rows::audit_entry)
            .collect()
        })
    }

    fn load_or_init_settings(&self, defaults: Settings) -> StoreFuture<'_, Settings> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO settings (id, upi_id, payee_name, qr_image_url, instructions, updated_at, updated_by)
                VALUES (1, $1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO NOTHING
                ",
            )
            .bind(&defaults.upi_id)
            .bind(&defaults.payee_name)
            .bind(&defaults.qr_image_url)
            .bind(&defaults.instructions)
            .bind(defaults.updated_at)
            .bind(defaults.updated_by.map(|id| *id.as_uuid()))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

            let row = sqlx::query(
                "SELECT upi_id, payee_name, qr_image_url, instructions, updated_at, updated_by \
                 FROM settings WHERE id = 1",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
            rows::settings(&row)
        })
    }

    fn commit(&self, batch: Vec<Mutation>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let started = Instant::now();
            let size = batch.len();
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StoreError::Database(format!("Failed to start transaction: {e}")))?;

            for mutation in batch {
                if let Err(error) = Self::apply(&mut tx, mutation).await {
                    let _ = tx.rollback().await; // Ignore rollback errors
                    if matches!(
                        error,
                        StoreError::Conflict(_)
                            | StoreError::StaleState { .. }
                            | StoreError::InsufficientInventory { .. }
                    ) {
                        metrics::counter!("store.commit.rejected").increment(1);
                    }
                    tracing::debug!(error = %error, mutations = size, "Commit rolled back");
                    return Err(error);
                }
            }

            tx.commit()
                .await
                .map_err(|e| StoreError::Database(format!("Failed to commit transaction: {e}")))?;

            metrics::histogram!("store.commit.duration_seconds").record(started.elapsed().as_secs_f64());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_names_map_to_domain_constraints() {
        assert_eq!(
            constraint_for(Some("registrations_active_key")),
            Constraint::ActiveRegistration
        );
        assert_eq!(
            constraint_for(Some("tickets_registration_id_key")),
            Constraint::TicketForRegistration
        );
        assert_eq!(constraint_for(Some("referral_awards_pkey")), Constraint::ReferralAward);
        assert_eq!(constraint_for(Some("users_pkey")), Constraint::PrimaryKey);
        assert_eq!(constraint_for(None), Constraint::PrimaryKey);
    }

    #[test]
    fn missing_row_is_not_found_and_other_status_is_stale() {
        assert!(matches!(
            stale_or_missing("ticket", "t-1", "valid", None),
            StoreError::NotFound { entity: "ticket", .. }
        ));
        assert!(matches!(
            stale_or_missing("ticket", "t-1", "valid", Some("used".into())),
            StoreError::StaleState { ref actual, .. } if actual == "used"
        ));
    }
}
