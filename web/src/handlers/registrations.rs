//! Registration API endpoints.
//!
//! - POST /api/events/:id/registrations - Register with payment proof
//! - GET /api/events/:id/registrations - Event registrations (staff)
//! - GET /api/registrations/mine - The caller's registrations
//! - GET /api/registrations/:id - One registration (owner or staff)
//! - POST /api/registrations/:id/resubmit - Correct a rejected registration
//! - POST /api/registrations/:id/verify - Approve payment, issue ticket (admin)
//! - POST /api/registrations/:id/reject - Reject payment (admin)
//! - POST /api/registrations/:id/cancel - Withdraw (owner or admin)
//! - GET /api/registrations/:id/ticket - The issued ticket (owner or staff)
//!
//! # State Machine
//!
//! ```text
//! pending  ── verify ───▶ verified
//! pending  ── reject ───▶ rejected
//! rejected ── resubmit ─▶ pending
//! pending  ── cancel ───▶ cancelled
//! verified ── cancel ───▶ cancelled
//! ```
//!
//! A rejected registration can only be resubmitted.

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::extractors::{ApiJson, ApiPath};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use eventpass_core::WorkflowError;
use eventpass_core::types::{EventId, RegistrationId, RegistrationStatus, TeamMember};
use eventpass_core::workflow::{ResubmitRegistration, SubmitRegistration};
use serde::Deserialize;
use serde_json::{Value, json};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Registration request; the event comes from the path.
///
/// There is no amount field. The total is computed from the ticket price.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
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
    /// UPI transaction reference
    pub utr_number: String,
    /// URL returned by the payment proof upload
    pub payment_proof_url: String,
}

/// Rejection request.
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    /// Shown to the registrant
    pub reason: String,
}

/// Event registration filter.
#[derive(Debug, Default, Deserialize)]
pub struct ListRegistrationsQuery {
    /// `pending`, `verified`, `rejected` or `cancelled`
    pub status: Option<String>,
}

fn registration_status(status: Option<&str>) -> Result<Option<RegistrationStatus>, AppError> {
    status
        .map(|s| {
            RegistrationStatus::parse(s).ok_or_else(|| {
                WorkflowError::validation(format!("unknown registration status '{s}'")).into()
            })
        })
        .transpose()
}

// ============================================================================
// Handlers
// ============================================================================

/// Register the caller for an event.
///
/// Reserves the tickets immediately; they are released again if the
/// registration is cancelled.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/<event_id>/registrations \
///   -H "Authorization: Bearer <token>" \
///   -H "Content-Type: application/json" \
///   -d '{
///     "ticket_type": "Standard",
///     "quantity": 2,
///     "utr_number": "412345678901",
///     "payment_proof_url": "/uploads/3f1c.png"
///   }'
/// ```
///
/// # Errors
///
/// - 400 VALIDATION_ERROR: bad input, a reused UTR, an event not open
/// - 400 DUPLICATE_REGISTRATION: the caller already registered
/// - 409 OUT_OF_STOCK: too few tickets left
pub async fn register(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(event_id): ApiPath<EventId>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let registration = state
        .services
        .workflow
        .submit(
            &actor,
            SubmitRegistration {
                event_id,
                ticket_type: request.ticket_type,
                quantity: request.quantity,
                team_name: request.team_name,
                team_members: request.team_members,
                utr_number: request.utr_number,
                payment_proof_url: request.payment_proof_url,
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "registration": registration })),
    ))
}

/// Registrations for an event (staff), optionally by status.
pub async fn list_for_event(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(event_id): ApiPath<EventId>,
    Query(query): Query<ListRegistrationsQuery>,
) -> Result<Json<Value>, AppError> {
    let status = registration_status(query.status.as_deref())?;
    let registrations = state
        .services
        .workflow
        .list_for_event(&actor, event_id, status)
        .await?;
    Ok(Json(json!({ "ok": true, "registrations": registrations })))
}

/// The caller's registrations, newest first.
pub async fn list_mine(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Value>, AppError> {
    let registrations = state.services.workflow.list_mine(&actor).await?;
    Ok(Json(json!({ "ok": true, "registrations": registrations })))
}

/// One registration.
pub async fn get_registration(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<RegistrationId>,
) -> Result<Json<Value>, AppError> {
    let registration = state.services.workflow.get(&actor, id).await?;
    Ok(Json(json!({ "ok": true, "registration": registration })))
}

/// Correct a rejected registration and send it back for review.
///
/// Absent fields keep their previous value.
pub async fn resubmit(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<RegistrationId>,
    ApiJson(request): ApiJson<ResubmitRegistration>,
) -> Result<Json<Value>, AppError> {
    let registration = state.services.workflow.resubmit(&actor, id, request).await?;
    Ok(Json(json!({ "ok": true, "registration": registration })))
}

/// Approve the payment and issue the ticket.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/registrations/<id>/verify \
///   -H "Authorization: Bearer <admin_token>"
/// ```
///
/// # Errors
///
/// - 403 FORBIDDEN: caller is not an admin
/// - 409 INVALID_TRANSITION: the registration is not pending
/// - 409 ALREADY_ISSUED: a ticket exists
pub async fn verify(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<RegistrationId>,
) -> Result<Json<Value>, AppError> {
    let registration = state.services.workflow.verify(&actor, id).await?;
    Ok(Json(json!({ "ok": true, "registration": registration })))
}

/// Reject the payment with a reason the registrant can act on.
pub async fn reject(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<RegistrationId>,
    ApiJson(request): ApiJson<RejectRequest>,
) -> Result<Json<Value>, AppError> {
    let registration = state
        .services
        .workflow
        .reject(&actor, id, &request.reason)
        .await?;
    Ok(Json(json!({ "ok": true, "registration": registration })))
}

/// Withdraw a registration and release its tickets.
pub async fn cancel(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<RegistrationId>,
) -> Result<Json<Value>, AppError> {
    let registration = state.services.workflow.cancel(&actor, id).await?;
    Ok(Json(json!({ "ok": true, "registration": registration })))
}

/// The ticket issued for a verified registration.
pub async fn ticket(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<RegistrationId>,
) -> Result<Json<Value>, AppError> {
    let ticket = state
        .services
        .tickets
        .ticket_for_registration(&actor, id)
        .await?;
    Ok(Json(json!({ "ok": true, "ticket": ticket })))
}
