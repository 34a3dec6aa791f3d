//! Router configuration.

use crate::handlers::{
    audit, events, health_check, readiness_check, registrations, settings, tickets, uploads, users,
};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 16 * 1024;

/// Build the complete Axum router.
///
/// Health checks live at the root; everything else is nested under `/api`.
/// Serving uploaded files and CORS are left to the binary.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.proofs.max_bytes().saturating_add(MULTIPART_OVERHEAD);

    let api_routes = Router::new()
        // Accounts
        .route("/users", post(users::sign_up))
        .route("/users/me", get(users::me))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/ambassador", post(users::promote_ambassador))
        .route("/users/:id/role", put(users::set_role))
        .route("/sessions", post(users::login))
        .route("/password-resets", post(users::request_password_reset))
        .route("/password-resets/confirm", post(users::confirm_password_reset))
        .route("/ambassadors/leaderboard", get(users::leaderboard))
        // Events
        .route("/events", post(events::create_event).get(events::list_events))
        .route("/events/:id", get(events::get_event))
        .route("/events/:id/publish", post(events::publish_event))
        .route("/events/:id/cancel", post(events::cancel_event))
        .route("/events/:id/complete", post(events::complete_event))
        // Registrations
        .route(
            "/events/:id/registrations",
            post(registrations::register).get(registrations::list_for_event),
        )
        .route("/registrations/mine", get(registrations::list_mine))
        .route("/registrations/:id", get(registrations::get_registration))
        .route("/registrations/:id/resubmit", post(registrations::resubmit))
        .route("/registrations/:id/verify", post(registrations::verify))
        .route("/registrations/:id/reject", post(registrations::reject))
        .route("/registrations/:id/cancel", post(registrations::cancel))
        .route("/registrations/:id/ticket", get(registrations::ticket))
        // Check-in
        .route("/tickets/check-in", post(tickets::check_in))
        // Uploads
        .route(
            "/uploads/payment-proof",
            post(uploads::upload_payment_proof).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Administration
        .route("/settings", get(settings::get_settings).put(settings::update_settings))
        .route("/audit", get(audit::list_audit));

    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
