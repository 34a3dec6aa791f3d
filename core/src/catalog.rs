//! Event catalog: creation and lifecycle of events.
//!
//! ```text
//! draft ──publish──▶ published ──complete──▶ completed
//!   │                    │
//!   └──────cancel────────┴──────▶ cancelled
//! ```
//!
//! Only published events accept registrations. Completing an event sends a
//! certificate-ready email to every attendee who was checked in.

use crate::audit::{AuditAction, AuditEntry};
use crate::environment::{Actor, Environment};
use crate::error::{Result, WorkflowError};
use crate::inventory::{InventoryManager, TicketTypeDraft};
use crate::notification::{Notification, Recipient, TemplateKind};
use crate::store::{Mutation, RegistrationFilter, StoreError};
use crate::types::{
    CheckInStatus, Event, EventFormat, EventId, EventStatus, RegistrationStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const fn solo() -> EventFormat {
    EventFormat::Solo
}

/// Request to create an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEvent {
    /// Title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Venue
    pub venue: String,
    /// Start time
    pub starts_at: DateTime<Utc>,
    /// Ticket types to put on sale
    pub ticket_types: Vec<TicketTypeDraft>,
    /// Maximum attendees; defaults to the total ticket quantity
    #[serde(default)]
    pub capacity: Option<u32>,
    /// Solo or team participation
    #[serde(default = "solo")]
    pub format: EventFormat,
}

/// Creates events and moves them through their lifecycle.
#[derive(Clone)]
pub struct EventCatalog {
    env: Environment,
    inventory: InventoryManager,
}

impl EventCatalog {
    /// Creates a new `EventCatalog`
    #[must_use]
    pub const fn new(env: Environment) -> Self {
        Self {
            env,
            inventory: InventoryManager::new(),
        }
    }

    /// Creates a draft event owned by the caller.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller is an admin or
    ///   coordinator
    /// - [`WorkflowError::Validation`] for blank fields, invalid ticket types,
    ///   a capacity below the ticket total or bad team bounds
    #[tracing::instrument(skip(self, actor, request), fields(organizer_id = %actor.user_id))]
    pub async fn create(&self, actor: &Actor, request: CreateEvent) -> Result<Event> {
        actor.require_staff("create events")?;

        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(WorkflowError::validation("event title is required"));
        }
        let venue = request.venue.trim().to_string();
        if venue.is_empty() {
            return Err(WorkflowError::validation("event venue is required"));
        }
        if let EventFormat::Team {
            min_team_size,
            max_team_size,
        } = request.format
        {
            if min_team_size == 0 || min_team_size > max_team_size {
                return Err(WorkflowError::validation(
                    "team size bounds must satisfy 1 <= min <= max",
                ));
            }
        }

        let ticket_types = self.inventory.open_ticket_types(request.ticket_types)?;
        let capacity = self.inventory.resolve_capacity(request.capacity, &ticket_types)?;

        let now = self.env.clock.now();
        let event = Event {
            id: EventId::new(),
            organizer_id: actor.user_id,
            title,
            description: request.description.trim().to_string(),
            venue,
            starts_at: request.starts_at,
            ticket_types,
            capacity,
            registered_count: 0,
            status: EventStatus::Draft,
            format: request.format,
            created_at: now,
            updated_at: now,
        };
        let audit = AuditEntry::new(AuditAction::CreateEvent, actor.user_id, now).for_event(event.id);

        self.env
            .store
            .commit(vec![
                Mutation::InsertEvent(event.clone()),
                Mutation::AppendAudit(audit),
            ])
            .await?;

        tracing::info!(event_id = %event.id, title = %event.title, "Event created");
        Ok(event)
    }

    /// Lists events. Anonymous callers and regular users only see published
    /// events; staff may filter by any status.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] on persistence failures.
    pub async fn list(&self, actor: Option<&Actor>, status: Option<EventStatus>) -> Result<Vec<Event>> {
        let status = if actor.is_some_and(|a| a.role.is_staff()) {
            status
        } else {
            Some(EventStatus::Published)
        };
        Ok(self.env.store.list_events(status).await?)
    }

    /// Loads an event. Drafts are only visible to staff.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] if the event does not exist or is
    /// not visible to the caller.
    pub async fn get(&self, actor: Option<&Actor>, id: EventId) -> Result<Event> {
        let event = self.load(id).await?;
        if event.status == EventStatus::Draft && !actor.is_some_and(|a| a.role.is_staff()) {
            return Err(WorkflowError::not_found("Event", id));
        }
        Ok(event)
    }

    /// Opens a draft event for registration.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller is staff
    /// - [`WorkflowError::Validation`] unless the event is a draft
    pub async fn publish(&self, actor: &Actor, id: EventId) -> Result<Event> {
        self.transition(actor, id, &[EventStatus::Draft], EventStatus::Published, "publish")
            .await
    }

    /// Calls off a draft or published event.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller is staff
    /// - [`WorkflowError::Validation`] if the event is already over
    pub async fn cancel(&self, actor: &Actor, id: EventId) -> Result<Event> {
        self.transition(
            actor,
            id,
            &[EventStatus::Draft, EventStatus::Published],
            EventStatus::Cancelled,
            "cancel",
        )
        .await
    }

    /// Marks a published event as completed and notifies checked-in
    /// attendees that their certificates are ready.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller is staff
    /// - [`WorkflowError::Validation`] unless the event is published
    pub async fn complete(&self, actor: &Actor, id: EventId) -> Result<Event> {
        let event = self
            .transition(actor, id, &[EventStatus::Published], EventStatus::Completed, "complete")
            .await?;

        let attendees = self
            .env
            .store
            .list_registrations(RegistrationFilter {
                event_id: Some(id),
                status: Some(RegistrationStatus::Verified),
                ..RegistrationFilter::default()
            })
            .await?;

        let mut sent = 0_usize;
        for registration in attendees
            .iter()
            .filter(|r| r.check_in_status == CheckInStatus::CheckedIn)
        {
            match self.env.store.get_user(registration.user_id).await {
                Ok(Some(user)) => {
                    self.env.notifications.dispatch(
                        Notification::new(
                            TemplateKind::CertificateReady,
                            Recipient {
                                name: user.name.clone(),
                                email: user.email.clone(),
                            },
                        )
                        .var("name", &user.name)
                        .var("event_title", &event.title)
                        .var("registration_id", registration.id),
                    );
                    sent += 1;
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(user_id = %registration.user_id, error = %error, "Skipping certificate email");
                }
            }
        }

        tracing::info!(event_id = %id, certificates = sent, "Event completed");
        Ok(event)
    }

    async fn load(&self, id: EventId) -> Result<Event> {
        self.env
            .store
            .get_event(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Event", id))
    }

    async fn transition(
        &self,
        actor: &Actor,
        id: EventId,
        from: &[EventStatus],
        to: EventStatus,
        operation: &str,
    ) -> Result<Event> {
        actor.require_staff(&format!("{operation} events"))?;

        let event = self.load(id).await?;
        if !from.contains(&event.status) {
            return Err(WorkflowError::validation(format!(
                "cannot {operation} an event that is {}",
                event.status.as_str()
            )));
        }

        let now = self.env.clock.now();
        let audit = AuditEntry::new(AuditAction::UpdateEventStatus, actor.user_id, now)
            .for_event(id)
            .with_detail(format!("{} -> {}", event.status.as_str(), to.as_str()));

        match self
            .env
            .store
            .commit(vec![
                Mutation::SetEventStatus {
                    event_id: id,
                    expected: event.status,
                    status: to,
                    at: now,
                },
                Mutation::AppendAudit(audit),
            ])
            .await
        {
            Ok(()) => {}
            Err(StoreError::StaleState { actual, .. }) => {
                return Err(WorkflowError::validation(format!(
                    "cannot {operation} an event that is {actual}"
                )));
            }
            Err(other) => return Err(other.into()),
        }

        tracing::info!(event_id = %id, from = event.status.as_str(), to = to.as_str(), "Event status changed");
        Ok(Event {
            status: to,
            updated_at: now,
            ..event
        })
    }
}
