//! HTTP API for EventPass.
//!
//! An Axum shell around the `eventpass-core` services. Handlers do three
//! things: resolve the caller from the bearer token, translate the request
//! into a service call and map the result (or [`WorkflowError`]) to JSON.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Axum router                            │  ← auth, JSON, uploads
//! │  correlation ids, tracing, metrics      │
//! ├─────────────────────────────────────────┤
//! │  eventpass-core services                │  ← workflow, catalog, users
//! │  EntityStore / Notifier                 │  ← Postgres, SMTP
//! └─────────────────────────────────────────┘
//! ```
//!
//! Successful responses carry `"ok": true`; failures use the [`AppError`]
//! body with a stable error code.
//!
//! # Example
//!
//! ```ignore
//! use eventpass_web::{AppState, build_router};
//!
//! let app = build_router(AppState::new(&env, services, auth, proofs));
//! axum::serve(listener, app).await?;
//! ```
//!
//! [`WorkflowError`]: eventpass_core::WorkflowError

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
pub mod storage;

pub use auth::{AuthError, AuthUser, JwtAuth, MaybeAuthUser};
pub use error::AppError;
pub use extractors::{ApiJson, ApiPath, ClientIp, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use router::build_router;
pub use state::{AppState, Services};
pub use storage::{LocalProofStorage, ProofStorage, StorageError};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
