//! Audit log.
//!
//! - GET /api/audit - Recent entries, newest first (admin)

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
};
use eventpass_core::types::RegistrationId;
use serde::Deserialize;
use serde_json::{Value, json};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// Audit query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    /// Only entries about this registration
    pub registration_id: Option<RegistrationId>,
    /// Number of entries (default 50, at most 500)
    pub limit: Option<usize>,
}

/// Recent audit entries.
///
/// # Example
///
/// ```bash
/// curl "http://localhost:8080/api/audit?registration_id=<id>&limit=20" \
///   -H "Authorization: Bearer <admin_token>"
/// ```
pub async fn list_audit(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Value>, AppError> {
    actor.require_admin("read the audit log")?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let entries = state
        .store
        .list_audit(query.registration_id, limit)
        .await
        .map_err(eventpass_core::WorkflowError::from)?;
    Ok(Json(json!({ "ok": true, "entries": entries })))
}
