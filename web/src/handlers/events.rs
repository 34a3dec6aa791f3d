//! Event management API endpoints.
//!
//! - POST /api/events - Create a draft event (admin or coordinator)
//! - GET /api/events - List events (drafts only for staff)
//! - GET /api/events/:id - Event details with live ticket availability
//! - POST /api/events/:id/publish - Open for registration
//! - POST /api/events/:id/cancel - Call off
//! - POST /api/events/:id/complete - Mark as held
//!
//! # Lifecycle
//!
//! ```text
//! Draft → Published → Completed
//!   ↓         ↓
//! Cancelled  Cancelled
//! ```

use crate::auth::{AuthUser, MaybeAuthUser};
use crate::error::AppError;
use crate::extractors::{ApiJson, ApiPath};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use eventpass_core::WorkflowError;
use eventpass_core::catalog::CreateEvent;
use eventpass_core::types::{EventId, EventStatus};
use serde::Deserialize;
use serde_json::{Value, json};

/// Event list filter.
#[derive(Debug, Default, Deserialize)]
pub struct ListEventsQuery {
    /// `draft`, `published`, `cancelled` or `completed`
    pub status: Option<String>,
}

/// Create a draft event.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{
///     "title": "Hack Night",
///     "venue": "Main Auditorium",
///     "starts_at": "2026-03-14T18:00:00Z",
///     "ticket_types": [{"name": "Standard", "price": 10100, "quantity": 100}],
///     "format": "solo"
///   }'
/// ```
///
/// Prices are in paise.
///
/// # Errors
///
/// - 400 VALIDATION_ERROR: blank fields, duplicate ticket names, capacity
///   below the ticket total
/// - 403 FORBIDDEN: caller is not staff
pub async fn create_event(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(request): ApiJson<CreateEvent>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let event = state.services.catalog.create(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "event": event }))))
}

/// List events, optionally by status.
pub async fn list_events(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<Value>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            EventStatus::parse(s)
                .ok_or_else(|| WorkflowError::validation(format!("unknown event status '{s}'")))
        })
        .transpose()?;
    let events = state.services.catalog.list(actor.as_ref(), status).await?;
    Ok(Json(json!({ "ok": true, "events": events })))
}

/// Event details. Drafts look missing to everyone but staff.
pub async fn get_event(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    ApiPath(id): ApiPath<EventId>,
) -> Result<Json<Value>, AppError> {
    let event = state.services.catalog.get(actor.as_ref(), id).await?;
    Ok(Json(json!({ "ok": true, "event": event })))
}

/// Open a draft for registration.
pub async fn publish_event(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<EventId>,
) -> Result<Json<Value>, AppError> {
    let event = state.services.catalog.publish(&actor, id).await?;
    Ok(Json(json!({ "ok": true, "event": event })))
}

/// Cancel a draft or published event.
pub async fn cancel_event(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<EventId>,
) -> Result<Json<Value>, AppError> {
    let event = state.services.catalog.cancel(&actor, id).await?;
    Ok(Json(json!({ "ok": true, "event": event })))
}

/// Mark a published event as held.
pub async fn complete_event(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<EventId>,
) -> Result<Json<Value>, AppError> {
    let event = state.services.catalog.complete(&actor, id).await?;
    Ok(Json(json!({ "ok": true, "event": event })))
}
