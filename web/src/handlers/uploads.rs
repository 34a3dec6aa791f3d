//! Payment proof uploads.
//!
//! - POST /api/uploads/payment-proof - Upload a JPEG or PNG screenshot
//!
//! The returned URL goes into `payment_proof_url` when registering.

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use serde_json::{Value, json};

const FILE_FIELD: &str = "file";

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::new(StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", err.body_text())
        } else {
            Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.body_text())
        }
    }
}

/// Store a payment screenshot.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/uploads/payment-proof \
///   -H "Authorization: Bearer <token>" \
///   -F "file=@payment.png;type=image/png"
/// ```
///
/// Response:
/// ```json
/// { "ok": true, "url": "/uploads/0b7e….png" }
/// ```
///
/// # Errors
///
/// - 400 VALIDATION_ERROR: no `file` field, or not a JPEG/PNG image
/// - 413 PAYLOAD_TOO_LARGE: over the configured size limit
pub async fn upload_payment_proof(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        let url = state.proofs.store(content_type, bytes.to_vec()).await?;

        tracing::info!(user_id = %actor.user_id, %url, size = bytes.len(), "Payment proof uploaded");
        metrics::counter!("uploads.payment_proof").increment(1);
        return Ok((StatusCode::CREATED, Json(json!({ "ok": true, "url": url }))));
    }
    Err(AppError::new(
        StatusCode::BAD_REQUEST,
        "VALIDATION_ERROR",
        format!("multipart field '{FILE_FIELD}' is required"),
    ))
}
