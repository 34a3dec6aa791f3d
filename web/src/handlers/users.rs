//! Account API endpoints.
//!
//! - POST /api/users - Sign up (returns an access token)
//! - POST /api/sessions - Log in with email and password
//! - GET /api/users/me - The caller's profile
//! - GET /api/users/:id - A profile (owner or admin)
//! - POST /api/users/:id/ambassador - Promote to ambassador (admin)
//! - PUT /api/users/:id/role - Change role (admin)
//! - POST /api/password-resets - Email a reset link
//! - POST /api/password-resets/confirm - Set a new password with the link token
//! - GET /api/ambassadors/leaderboard - Ambassadors ranked by points

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::extractors::{ApiJson, ApiPath, ClientIp};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use eventpass_core::types::{Role, User, UserId};
use eventpass_core::users::SignUp;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const DEFAULT_LEADERBOARD_SIZE: usize = 10;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Account email
    pub email: String,
    /// Password
    pub password: String,
}

/// Role change request.
#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    /// New role
    pub role: Role,
}

/// Password reset request.
#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    /// Account email
    pub email: String,
}

/// Password reset confirmation.
#[derive(Debug, Deserialize)]
pub struct ConfirmPasswordResetRequest {
    /// Token from the reset link
    pub token: String,
    /// New password
    pub password: String,
}

/// Leaderboard query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    /// Number of entries (1 to 100, default 10)
    pub limit: Option<usize>,
}

/// One leaderboard row; only public fields.
#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based position
    pub rank: usize,
    /// Ambassador id
    pub user_id: UserId,
    /// Display name
    pub name: String,
    /// Referral points
    pub points: u64,
}

fn session(state: &AppState, user: &User) -> Result<Value, AppError> {
    let token = state.auth.issue(user)?;
    Ok(json!({
        "ok": true,
        "user": user,
        "token": token,
        "expires_in": state.auth.ttl().as_secs(),
    }))
}

// ============================================================================
// Handlers
// ============================================================================

/// Create an account.
///
/// The account starts as a regular user unless its email is configured as an
/// admin email. A `referral_code` links it to the ambassador who owns it.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/users \
///   -H "Content-Type: application/json" \
///   -d '{
///     "name": "Asha Rao",
///     "email": "asha@example.com",
///     "password": "correct horse",
///     "referral_code": "AMB-7KQ2ZD"
///   }'
/// ```
///
/// # Errors
///
/// - 400 VALIDATION_ERROR: bad fields, a taken email or an unknown referral
///   code
pub async fn sign_up(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignUp>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let user = state.services.users.sign_up(request).await?;
    Ok((StatusCode::CREATED, Json(session(&state, &user)?)))
}

/// Exchange email and password for an access token.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/sessions \
///   -H "Content-Type: application/json" \
///   -d '{"email": "asha@example.com", "password": "correct horse"}'
/// ```
///
/// # Errors
///
/// - 401 UNAUTHENTICATED: unknown email or wrong password (indistinguishable)
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    match state
        .services
        .users
        .authenticate(&request.email, &request.password)
        .await
    {
        Ok(user) => {
            tracing::info!(user_id = %user.id, %ip, "Login succeeded");
            Ok(Json(session(&state, &user)?))
        }
        Err(e) => {
            tracing::info!(%ip, "Login failed");
            metrics::counter!("auth.login.failed").increment(1);
            Err(e.into())
        }
    }
}

/// The caller's own profile.
pub async fn me(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Value>, AppError> {
    let user = state.services.users.find(actor.user_id).await?;
    Ok(Json(json!({ "ok": true, "user": user })))
}

/// A user's profile, visible to that user and to admins.
///
/// # Errors
///
/// - 403 FORBIDDEN: someone else's profile
/// - 404 NOT_FOUND: no such user
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<Value>, AppError> {
    let user = state.services.users.get(&actor, id).await?;
    Ok(Json(json!({ "ok": true, "user": user })))
}

/// Make a user a campus ambassador and assign a referral code.
///
/// Promoting an existing ambassador returns it unchanged.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/users/<id>/ambassador \
///   -H "Authorization: Bearer <admin_token>"
/// ```
pub async fn promote_ambassador(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<Value>, AppError> {
    let user = state.services.users.promote_to_ambassador(&actor, id).await?;
    Ok(Json(json!({ "ok": true, "user": user })))
}

/// Change a user's role.
///
/// # Example
///
/// ```bash
/// curl -X PUT http://localhost:8080/api/users/<id>/role \
///   -H "Authorization: Bearer <admin_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"role": "coordinator"}'
/// ```
///
/// # Errors
///
/// - 400 VALIDATION_ERROR: admins changing their own role
/// - 403 FORBIDDEN: caller is not an admin
pub async fn set_role(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(request): ApiJson<SetRoleRequest>,
) -> Result<Json<Value>, AppError> {
    let user = state.services.users.set_role(&actor, id, request.role).await?;
    Ok(Json(json!({ "ok": true, "user": user })))
}

/// Email a password reset link.
///
/// Always answers 202 so the endpoint cannot be used to probe which emails
/// have accounts.
pub async fn request_password_reset(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PasswordResetRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state
        .services
        .users
        .request_password_reset(&request.email)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}

/// Set a new password using the token from a reset link.
///
/// # Errors
///
/// - 400 VALIDATION_ERROR: weak password
/// - 401 UNAUTHENTICATED: invalid, expired or already used token
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ConfirmPasswordResetRequest>,
) -> Result<Json<Value>, AppError> {
    state
        .services
        .users
        .reset_password(&request.token, request.password)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

/// Ambassadors ranked by referral points.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/api/ambassadors/leaderboard?limit=5
/// ```
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Value>, AppError> {
    let ambassadors = state
        .services
        .referrals
        .leaderboard(query.limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE))
        .await?;
    let entries: Vec<LeaderboardEntry> = ambassadors
        .into_iter()
        .enumerate()
        .map(|(i, user)| LeaderboardEntry {
            rank: i + 1,
            user_id: user.id,
            name: user.name,
            points: user.points,
        })
        .collect();
    Ok(Json(json!({ "ok": true, "leaderboard": entries })))
}
