//! Bearer-token authentication.
//!
//! Clients authenticate with `Authorization: Bearer <jwt>`. Tokens are HS256
//! JWTs carrying the user id (`sub`) and the role at issue time (`role`).
//! The [`AuthUser`] extractor verifies the token, then reloads the user so a
//! role change or a removed account takes effect on the next request.

use crate::error::AppError;
use crate::state::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use eventpass_core::environment::Actor;
use eventpass_core::types::{Role, User, UserId};
use eventpass_core::WorkflowError;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while issuing or verifying access tokens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer token on the request
    #[error("Missing authorization header")]
    MissingToken,

    /// The header is not `Bearer <token>`
    #[error("Invalid authorization format. Expected 'Bearer <token>'")]
    MalformedHeader,

    /// The token has expired
    #[error("Token expired")]
    Expired,

    /// Bad signature, malformed token or unknown claims
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The token could not be signed
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Claims inside an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    /// Role when the token was issued
    pub role: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// Issues and verifies HS256 access tokens.
#[derive(Clone)]
pub struct JwtAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtAuth {
    /// Creates a token service signing with `secret`; tokens live for `ttl`.
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Token lifetime
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if encoding fails.
    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            sub: *user.id.as_uuid(),
            role: user.role.as_str().to_string(),
            iat,
            exp: iat.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verifies a token and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Expired`] or [`AuthError::InvalidToken`].
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;
        if Role::parse(&data.claims.role).is_none() {
            return Err(AuthError::InvalidToken(format!(
                "unknown role '{}'",
                data.claims.role
            )));
        }
        Ok(data.claims)
    }
}

/// Token from the `Authorization` header, if the request carries one.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, AuthError> {
    let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let token = header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AuthError::MalformedHeader)?;
    if token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(Some(token))
}

async fn resolve(state: &AppState, token: &str) -> Result<Actor, AppError> {
    let claims = state.auth.verify(token)?;
    let user = match state.services.users.find(UserId::from_uuid(claims.sub)).await {
        Ok(user) => user,
        Err(WorkflowError::NotFound { .. }) => {
            return Err(AuthError::InvalidToken("account no longer exists".into()).into());
        }
        Err(other) => return Err(other.into()),
    };
    Ok(Actor::new(user.id, user.role))
}

/// The authenticated caller. Rejects the request with 401 without a valid
/// bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or(AuthError::MissingToken)?;
        Ok(Self(resolve(state, token).await?))
    }
}

/// The caller if a bearer token is present; anonymous otherwise.
///
/// A present but invalid token is still rejected.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthUser(pub Option<Actor>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => Ok(Self(Some(resolve(state, token).await?))),
            None => Ok(Self(None)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::http::Request;

    fn user(role: Role) -> User {
        User {
            id: UserId::new(),
            name: "Asha Rao".into(),
            email: "asha@example.com".into(),
            phone: None,
            role,
            referral_code: None,
            referred_by: None,
            points: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_tokens_verify() {
        let auth = JwtAuth::new(b"secret", Duration::from_secs(3600));
        let user = user(Role::Coordinator);

        let claims = auth.verify(&auth.issue(&user).unwrap()).unwrap();
        assert_eq!(claims.sub, *user.id.as_uuid());
        assert_eq!(claims.role, "coordinator");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let token = JwtAuth::new(b"other", Duration::from_secs(3600))
            .issue(&user(Role::Admin))
            .unwrap();
        let result = JwtAuth::new(b"secret", Duration::from_secs(3600)).verify(&token);
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let auth = JwtAuth::new(b"secret", Duration::from_secs(3600));
        let claims = Claims {
            sub: Uuid::new_v4(),
            role: "user".into(),
            iat: Utc::now().timestamp() - 7200,
            exp: Utc::now().timestamp() - 3600,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &auth.encoding_key).unwrap();
        assert_eq!(auth.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn bearer_header_must_be_well_formed() {
        let (parts, ()) = Request::builder()
            .header("Authorization", "Basic abc")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), Err(AuthError::MalformedHeader));

        let (parts, ()) = Request::builder().body(()).unwrap().into_parts();
        assert_eq!(bearer_token(&parts), Ok(None));

        let (parts, ()) = Request::builder()
            .header("Authorization", "Bearer abc.def")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), Ok(Some("abc.def")));
    }
}
