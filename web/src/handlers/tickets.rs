//! Venue check-in.
//!
//! - POST /api/tickets/check-in - Scan a ticket QR code (staff)

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::extractors::ApiJson;
use crate::state::AppState;
use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

/// Check-in request.
#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    /// Payload read from the QR code
    pub code: String,
}

/// Mark a ticket as used.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/tickets/check-in \
///   -H "Authorization: Bearer <coordinator_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"code": "eyJyaWQiOi....Yk3x"}'
/// ```
///
/// # Errors
///
/// - 400 VALIDATION_ERROR: forged or malformed code
/// - 403 FORBIDDEN: caller is not staff
/// - 409 ALREADY_USED: scanned before, or cancelled
pub async fn check_in(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(request): ApiJson<CheckInRequest>,
) -> Result<Json<Value>, AppError> {
    let ticket = state.services.tickets.check_in(&actor, &request.code).await?;
    Ok(Json(json!({ "ok": true, "ticket": ticket })))
}
