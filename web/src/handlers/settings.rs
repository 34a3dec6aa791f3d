//! Payment settings.
//!
//! - GET /api/settings - UPI details shown on the registration form
//! - PUT /api/settings - Change them (admin)

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::extractors::ApiJson;
use crate::state::AppState;
use axum::{Json, extract::State};
use eventpass_core::settings::UpdateSettings;
use serde_json::{Value, json};

/// Current payment settings. Public.
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let settings = state.services.settings.get().await?;
    Ok(Json(json!({ "ok": true, "settings": settings })))
}

/// Update payment settings; absent fields are left alone.
///
/// # Example
///
/// ```bash
/// curl -X PUT http://localhost:8080/api/settings \
///   -H "Authorization: Bearer <admin_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"upi_id": "fest@okbank", "instructions": "Add your email in the note"}'
/// ```
pub async fn update_settings(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(changes): ApiJson<UpdateSettings>,
) -> Result<Json<Value>, AppError> {
    let settings = state.services.settings.update(&actor, changes).await?;
    Ok(Json(json!({ "ok": true, "settings": settings })))
}
