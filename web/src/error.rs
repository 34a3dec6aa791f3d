//! Error types for web handlers.
//!
//! [`AppError`] bridges domain errors and HTTP responses. Every error body
//! has the same shape:
//!
//! ```json
//! { "ok": false, "error": { "code": "OUT_OF_STOCK", "message": "..." } }
//! ```

use crate::auth::AuthError;
use crate::storage::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use eventpass_core::WorkflowError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", message)
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    /// HTTP status of the response
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    ok: bool,
    error: ErrorBody<'a>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorResponse {
            ok: false,
            error: ErrorBody {
                code: self.code,
                message: &self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();
        match err {
            WorkflowError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
            }
            WorkflowError::DuplicateRegistration => {
                Self::new(StatusCode::BAD_REQUEST, "DUPLICATE_REGISTRATION", message)
            }
            WorkflowError::OutOfStock { .. } => {
                Self::new(StatusCode::CONFLICT, "OUT_OF_STOCK", message)
            }
            WorkflowError::InvalidTransition { .. } => {
                Self::new(StatusCode::CONFLICT, "INVALID_TRANSITION", message)
            }
            WorkflowError::AlreadyIssued => {
                Self::new(StatusCode::CONFLICT, "ALREADY_ISSUED", message)
            }
            WorkflowError::AlreadyUsed { .. } => {
                Self::new(StatusCode::CONFLICT, "ALREADY_USED", message)
            }
            WorkflowError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message),
            WorkflowError::Unauthenticated(_) => Self::unauthorized(message),
            WorkflowError::Forbidden(_) => Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message),
            WorkflowError::DependencyFailure(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "DEPENDENCY_FAILURE", "A dependency failed")
                    .with_source(anyhow::anyhow!(message))
            }
            WorkflowError::Store(_) => Self::internal("An internal error occurred")
                .with_source(anyhow::anyhow!(message)),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(_) => {
                Self::internal("Failed to issue token").with_source(anyhow::anyhow!(err))
            }
            other => Self::unauthorized(other.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::UnsupportedType(_) | StorageError::Empty => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
            }
            StorageError::TooLarge { .. } => {
                Self::new(StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", message)
            }
            StorageError::Io(_) => {
                Self::internal("Failed to store upload").with_source(anyhow::anyhow!(message))
            }
        }
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use eventpass_core::types::{RegistrationStatus, TicketStatus};

    #[test]
    fn workflow_errors_map_to_statuses() {
        let cases = [
            (WorkflowError::validation("bad"), StatusCode::BAD_REQUEST),
            (WorkflowError::DuplicateRegistration, StatusCode::BAD_REQUEST),
            (
                WorkflowError::OutOfStock {
                    ticket_type: "Standard".into(),
                    requested: 2,
                    available: 1,
                },
                StatusCode::CONFLICT,
            ),
            (
                WorkflowError::InvalidTransition {
                    operation: "verify",
                    status: RegistrationStatus::Verified,
                },
                StatusCode::CONFLICT,
            ),
            (WorkflowError::AlreadyIssued, StatusCode::CONFLICT),
            (
                WorkflowError::AlreadyUsed {
                    status: TicketStatus::Used,
                },
                StatusCode::CONFLICT,
            ),
            (WorkflowError::not_found("Event", "e-1"), StatusCode::NOT_FOUND),
            (WorkflowError::Unauthenticated("no".into()), StatusCode::UNAUTHORIZED),
            (WorkflowError::forbidden("no"), StatusCode::FORBIDDEN),
            (WorkflowError::Store("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(AppError::from(error).status(), status);
        }
    }

    #[test]
    fn store_details_are_not_exposed() {
        let err = AppError::from(WorkflowError::Store("connection refused".into()));
        assert_eq!(err.to_string(), "[INTERNAL_ERROR] An internal error occurred");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn error_body_has_ok_false() {
        let response = AppError::from(WorkflowError::AlreadyIssued).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["code"], "ALREADY_ISSUED");
    }
}
