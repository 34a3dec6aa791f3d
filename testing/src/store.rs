//! In-memory entity store for fast, deterministic tests.
//!
//! Enforces the same rules as the PostgreSQL backend: batches are applied
//! all-or-nothing, inventory and status changes are compare-and-set, and the
//! unique constraints report [`StoreError::Conflict`].

#![allow(clippy::unwrap_used)] // Mutex poison is unrecoverable in tests
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Utc};
use eventpass_core::audit::AuditEntry;
use eventpass_core::inventory::{apply_release, apply_reserve};
use eventpass_core::store::{
    Constraint, EntityStore, Mutation, RegistrationFilter, StoreError, StoreFuture,
};
use eventpass_core::types::{
    CheckInStatus, Event, EventId, EventStatus, Registration, RegistrationId, Role, Settings,
    Ticket, TicketId, TicketStatus, User, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    passwords: HashMap<UserId, String>,
    events: HashMap<EventId, Event>,
    registrations: HashMap<RegistrationId, Registration>,
    tickets: HashMap<TicketId, Ticket>,
    referral_awards: HashMap<(UserId, UserId), (u64, DateTime<Utc>)>,
    audit: Vec<AuditEntry>,
    settings: Option<Settings>,
}

fn stale(entity: &'static str, id: impl ToString, expected: &str, actual: &str) -> StoreError {
    StoreError::StaleState {
        entity,
        id: id.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn missing(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

impl Tables {
    fn check_user_unique(&self, user: &User) -> Result<(), StoreError> {
        for other in self.users.values().filter(|u| u.id != user.id) {
            if other.email.eq_ignore_ascii_case(&user.email) {
                return Err(StoreError::Conflict(Constraint::UserEmail));
            }
            if user.referral_code.is_some() && other.referral_code == user.referral_code {
                return Err(StoreError::Conflict(Constraint::ReferralCode));
            }
        }
        Ok(())
    }

    fn check_registration_unique(&self, registration: &Registration) -> Result<(), StoreError> {
        for other in self
            .registrations
            .values()
            .filter(|r| r.id != registration.id)
        {
            if registration.status.is_active()
                && other.status.is_active()
                && other.event_id == registration.event_id
                && other.user_id == registration.user_id
            {
                return Err(StoreError::Conflict(Constraint::ActiveRegistration));
            }
            if other.utr_number == registration.utr_number {
                return Err(StoreError::Conflict(Constraint::UtrNumber));
            }
            if registration.qr_code_hash.is_some() && other.qr_code_hash == registration.qr_code_hash {
                return Err(StoreError::Conflict(Constraint::QrCodeHash));
            }
        }
        Ok(())
    }

    fn event_mut(&mut self, id: EventId) -> Result<&mut Event, StoreError> {
        self.events.get_mut(&id).ok_or_else(|| missing("event", id))
    }

    #[allow(clippy::too_many_lines)]
    fn apply(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::InsertUser(user) => {
                if self.users.contains_key(&user.id) {
                    return Err(StoreError::Conflict(Constraint::PrimaryKey));
                }
                self.check_user_unique(&user)?;
                self.users.insert(user.id, user);
            }
            Mutation::UpdateUser(mut user) => {
                let points = self
                    .users
                    .get(&user.id)
                    .ok_or_else(|| missing("user", user.id))?
                    .points;
                self.check_user_unique(&user)?;
                user.points = points;
                self.users.insert(user.id, user);
            }
            Mutation::SetPasswordHash {
                user_id,
                password_hash,
            } => {
                if !self.users.contains_key(&user_id) {
                    return Err(missing("user", user_id));
                }
                self.passwords.insert(user_id, password_hash);
            }
            Mutation::InsertEvent(event) => {
                if self.events.contains_key(&event.id) {
                    return Err(StoreError::Conflict(Constraint::PrimaryKey));
                }
                self.events.insert(event.id, event);
            }
            Mutation::SetEventStatus {
                event_id,
                expected,
                status,
                at,
            } => {
                let event = self.event_mut(event_id)?;
                if event.status != expected {
                    return Err(stale("event", event_id, expected.as_str(), event.status.as_str()));
                }
                event.status = status;
                event.updated_at = at;
            }
            Mutation::ReserveTickets {
                event_id,
                ticket_type,
                quantity,
            } => {
                let event = self.event_mut(event_id)?;
                let line = event
                    .ticket_types
                    .iter_mut()
                    .find(|t| t.name == ticket_type)
                    .ok_or_else(|| missing("ticket type", &ticket_type))?;
                apply_reserve(line, quantity).map_err(|available| {
                    StoreError::InsufficientInventory {
                        event_id,
                        ticket_type,
                        requested: quantity,
                        available,
                    }
                })?;
            }
            Mutation::ReleaseTickets {
                event_id,
                ticket_type,
                quantity,
            } => {
                let event = self.event_mut(event_id)?;
                let line = event
                    .ticket_types
                    .iter_mut()
                    .find(|t| t.name == ticket_type)
                    .ok_or_else(|| missing("ticket type", &ticket_type))?;
                apply_release(line, quantity);
            }
            Mutation::AdjustRegisteredCount { event_id, delta } => {
                let event = self.event_mut(event_id)?;
                let count = (i64::from(event.registered_count) + delta).max(0);
                event.registered_count = u32::try_from(count).unwrap_or(u32::MAX);
            }
            Mutation::InsertRegistration(registration) => {
                if self.registrations.contains_key(&registration.id) {
                    return Err(StoreError::Conflict(Constraint::PrimaryKey));
                }
                self.check_registration_unique(&registration)?;
                self.registrations.insert(registration.id, registration);
            }
            Mutation::TransitionRegistration {
                expected,
                registration,
            } => {
                let current = self
                    .registrations
                    .get(&registration.id)
                    .ok_or_else(|| missing("registration", registration.id))?;
                if current.status != expected {
                    return Err(stale(
                        "registration",
                        registration.id,
                        expected.as_str(),
                        current.status.as_str(),
                    ));
                }
                self.check_registration_unique(&registration)?;
                self.registrations.insert(registration.id, registration);
            }
            Mutation::RecordCheckIn {
                registration_id,
                at,
            } => {
                let registration = self
                    .registrations
                    .get_mut(&registration_id)
                    .ok_or_else(|| missing("registration", registration_id))?;
                registration.check_in_status = CheckInStatus::CheckedIn;
                registration.checked_in_at = Some(at);
                registration.updated_at = at;
            }
            Mutation::InsertTicket(ticket) => {
                if self.tickets.contains_key(&ticket.id) {
                    return Err(StoreError::Conflict(Constraint::PrimaryKey));
                }
                for other in self.tickets.values() {
                    if other.registration_id == ticket.registration_id {
                        return Err(StoreError::Conflict(Constraint::TicketForRegistration));
                    }
                    if other.ticket_number == ticket.ticket_number {
                        return Err(StoreError::Conflict(Constraint::TicketNumber));
                    }
                }
                self.tickets.insert(ticket.id, ticket);
            }
            Mutation::TransitionTicket {
                ticket_id,
                expected,
                status,
                at,
            } => {
                let ticket = self
                    .tickets
                    .get_mut(&ticket_id)
                    .ok_or_else(|| missing("ticket", ticket_id))?;
                if ticket.status != expected {
                    return Err(stale("ticket", ticket_id, expected.as_str(), ticket.status.as_str()));
                }
                ticket.status = status;
                if status == TicketStatus::Used {
                    ticket.used_at = Some(at);
                }
            }
            Mutation::AwardReferral {
                ambassador_id,
                referred_user_id,
                points,
                at,
            } => {
                if self
                    .referral_awards
                    .contains_key(&(ambassador_id, referred_user_id))
                {
                    return Err(StoreError::Conflict(Constraint::ReferralAward));
                }
                let ambassador = self
                    .users
                    .get_mut(&ambassador_id)
                    .ok_or_else(|| missing("user", ambassador_id))?;
                ambassador.points = ambassador.points.saturating_add(points);
                self.referral_awards
                    .insert((ambassador_id, referred_user_id), (points, at));
            }
            Mutation::AppendAudit(entry) => self.audit.push(entry),
            Mutation::SaveSettings(settings) => self.settings = Some(settings),
        }
        Ok(())
    }
}

/// In-memory [`EntityStore`].
///
/// Cloning shares the underlying tables.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEntityStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryEntityStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&self.tables.lock().unwrap())
    }

    fn ready<T: Send + 'static>(value: T) -> StoreFuture<'static, T> {
        Box::pin(std::future::ready(Ok(value)))
    }

    /// Current state of an event (for assertions)
    #[must_use]
    pub fn event(&self, id: EventId) -> Option<Event> {
        self.read(|t| t.events.get(&id).cloned())
    }

    /// Current state of a user (for assertions)
    #[must_use]
    pub fn user(&self, id: UserId) -> Option<User> {
        self.read(|t| t.users.get(&id).cloned())
    }

    /// Every registration, oldest first
    #[must_use]
    pub fn registrations(&self) -> Vec<Registration> {
        self.read(|t| {
            let mut all: Vec<_> = t.registrations.values().cloned().collect();
            all.sort_by_key(|r| (r.created_at, r.id));
            all
        })
    }

    /// Every ticket issued so far
    #[must_use]
    pub fn tickets(&self) -> Vec<Ticket> {
        self.read(|t| t.tickets.values().cloned().collect())
    }

    /// Every audit entry, in append order
    #[must_use]
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.read(|t| t.audit.clone())
    }

    /// Number of referral awards recorded
    #[must_use]
    pub fn referral_award_count(&self) -> usize {
        self.read(|t| t.referral_awards.len())
    }
}

impl EntityStore for InMemoryEntityStore {
    fn get_user(&self, id: UserId) -> StoreFuture<'_, Option<User>> {
        Self::ready(self.read(|t| t.users.get(&id).cloned()))
    }

    fn find_user_by_email(&self, email: String) -> StoreFuture<'_, Option<User>> {
        Self::ready(self.read(|t| {
            t.users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(&email))
                .cloned()
        }))
    }

    fn find_user_by_referral_code(&self, code: String) -> StoreFuture<'_, Option<User>> {
        Self::ready(self.read(|t| {
            t.users
                .values()
                .find(|u| u.referral_code.as_deref() == Some(code.as_str()))
                .cloned()
        }))
    }

    fn get_password_hash(&self, id: UserId) -> StoreFuture<'_, Option<String>> {
        Self::ready(self.read(|t| t.passwords.get(&id).cloned()))
    }

    fn list_ambassadors(&self, limit: usize) -> StoreFuture<'_, Vec<User>> {
        Self::ready(self.read(|t| {
            let mut ambassadors: Vec<_> = t
                .users
                .values()
                .filter(|u| u.role == Role::Ambassador)
                .cloned()
                .collect();
            ambassadors.sort_by(|a, b| {
                b.points
                    .cmp(&a.points)
                    .then(a.created_at.cmp(&b.created_at))
            });
            ambassadors.truncate(limit);
            ambassadors
        }))
    }

    fn get_event(&self, id: EventId) -> StoreFuture<'_, Option<Event>> {
        Self::ready(self.event(id))
    }

    fn list_events(&self, status: Option<EventStatus>) -> StoreFuture<'_, Vec<Event>> {
        Self::ready(self.read(|t| {
            let mut events: Vec<_> = t
                .events
                .values()
                .filter(|e| status.is_none_or(|s| e.status == s))
                .cloned()
                .collect();
            events.sort_by_key(|e| (e.starts_at, e.id));
            events
        }))
    }

    fn get_registration(&self, id: RegistrationId) -> StoreFuture<'_, Option<Registration>> {
        Self::ready(self.read(|t| t.registrations.get(&id).cloned()))
    }

    fn find_active_registration(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, Option<Registration>> {
        Self::ready(self.read(|t| {
            t.registrations
                .values()
                .find(|r| r.event_id == event_id && r.user_id == user_id && r.status.is_active())
                .cloned()
        }))
    }

    fn list_registrations(&self, filter: RegistrationFilter) -> StoreFuture<'_, Vec<Registration>> {
        let mut matching = self.registrations();
        matching.retain(|r| filter.matches(r));
        Self::ready(matching)
    }

    fn get_ticket(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>> {
        Self::ready(self.read(|t| t.tickets.get(&id).cloned()))
    }

    fn find_ticket_by_number(&self, ticket_number: String) -> StoreFuture<'_, Option<Ticket>> {
        Self::ready(self.read(|t| {
            t.tickets
                .values()
                .find(|ticket| ticket.ticket_number == ticket_number)
                .cloned()
        }))
    }

    fn find_ticket_by_registration(
        &self,
        registration_id: RegistrationId,
    ) -> StoreFuture<'_, Option<Ticket>> {
        Self::ready(self.read(|t| {
            t.tickets
                .values()
                .find(|ticket| ticket.registration_id == registration_id)
                .cloned()
        }))
    }

    fn list_audit(
        &self,
        registration_id: Option<RegistrationId>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<AuditEntry>> {
        Self::ready(self.read(|t| {
            t.audit
                .iter()
                .rev()
                .filter(|e| registration_id.is_none_or(|id| e.registration_id == Some(id)))
                .take(limit)
                .cloned()
                .collect()
        }))
    }

    fn load_or_init_settings(&self, defaults: Settings) -> StoreFuture<'_, Settings> {
        let mut tables = self.tables.lock().unwrap();
        let settings = tables.settings.get_or_insert(defaults).clone();
        Self::ready(settings)
    }

    fn commit(&self, batch: Vec<Mutation>) -> StoreFuture<'_, ()> {
        let mut tables = self.tables.lock().unwrap();
        let mut staged = tables.clone();
        let result = batch
            .into_iter()
            .try_for_each(|mutation| staged.apply(mutation));
        if result.is_ok() {
            *tables = staged;
        }
        Box::pin(std::future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventpass_core::types::{Money, TicketType};

    fn event(available: u32) -> Event {
        let now = Utc::now();
        Event {
            id: EventId::new(),
            organizer_id: UserId::new(),
            title: "Hack Night".into(),
            description: String::new(),
            venue: "Hall A".into(),
            starts_at: now,
            ticket_types: vec![TicketType {
                name: "Standard".into(),
                price: Money::from_major(101),
                quantity: 10,
                available,
                description: String::new(),
            }],
            capacity: 10,
            registered_count: 0,
            status: EventStatus::Published,
            format: eventpass_core::types::EventFormat::Solo,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_trace() {
        let store = InMemoryEntityStore::new();
        let event = event(1);
        store
            .commit(vec![Mutation::InsertEvent(event.clone())])
            .await
            .unwrap();

        let result = store
            .commit(vec![
                Mutation::ReserveTickets {
                    event_id: event.id,
                    ticket_type: "Standard".into(),
                    quantity: 1,
                },
                Mutation::ReserveTickets {
                    event_id: event.id,
                    ticket_type: "Standard".into(),
                    quantity: 1,
                },
            ])
            .await;

        assert!(matches!(
            result,
            Err(StoreError::InsufficientInventory { available: 0, .. })
        ));
        assert_eq!(store.event(event.id).unwrap().ticket_types[0].available, 1);
    }

    #[tokio::test]
    async fn release_never_exceeds_quantity() {
        let store = InMemoryEntityStore::new();
        let event = event(9);
        store
            .commit(vec![
                Mutation::InsertEvent(event.clone()),
                Mutation::ReleaseTickets {
                    event_id: event.id,
                    ticket_type: "Standard".into(),
                    quantity: 5,
                },
            ])
            .await
            .unwrap();
        assert_eq!(store.event(event.id).unwrap().ticket_types[0].available, 10);
    }

    #[tokio::test]
    async fn event_status_is_compare_and_set() {
        let store = InMemoryEntityStore::new();
        let event = event(10);
        store
            .commit(vec![Mutation::InsertEvent(event.clone())])
            .await
            .unwrap();

        let result = store
            .commit(vec![Mutation::SetEventStatus {
                event_id: event.id,
                expected: EventStatus::Draft,
                status: EventStatus::Cancelled,
                at: Utc::now(),
            }])
            .await;
        assert!(matches!(result, Err(StoreError::StaleState { entity: "event", .. })));
    }

    #[tokio::test]
    async fn settings_are_created_once() {
        let store = InMemoryEntityStore::new();
        let defaults = |upi: &str| Settings {
            upi_id: upi.into(),
            payee_name: "EventPass".into(),
            qr_image_url: None,
            instructions: None,
            updated_at: Utc::now(),
            updated_by: None,
        };
        let first = store.load_or_init_settings(defaults("first@upi")).await.unwrap();
        let second = store.load_or_init_settings(defaults("second@upi")).await.unwrap();
        assert_eq!(first.upi_id, "first@upi");
        assert_eq!(second.upi_id, "first@upi");
    }
}
