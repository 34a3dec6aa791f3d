//! User directory: accounts, passwords, roles and referral codes.

use crate::audit::{AuditAction, AuditEntry};
use crate::environment::{Actor, Environment};
use crate::error::{Result, WorkflowError};
use crate::notification::{Notification, Recipient, TemplateKind};
use crate::signing::{TokenSigner, sha256_hex};
use crate::store::{Constraint, Mutation, StoreError};
use crate::team::{is_plausible_email, normalize_email, normalize_name, normalize_phone};
use crate::types::{Role, User, UserId};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::Duration;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Prefix of ambassador referral codes.
pub const REFERRAL_CODE_PREFIX: &str = "AMB-";

const REFERRAL_CODE_LEN: usize = 6;
const REFERRAL_CODE_ATTEMPTS: usize = 5;
const MIN_PASSWORD_LEN: usize = 8;

/// Generates a referral code, `AMB-` followed by 6 upper-case alphanumerics.
#[must_use]
pub fn generate_referral_code() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..REFERRAL_CODE_LEN)
        .map(|_| char::from(CHARSET[rng.gen_range(0..CHARSET.len())]))
        .collect();
    format!("{REFERRAL_CODE_PREFIX}{suffix}")
}

/// Argon2id password hashing.
#[derive(Clone, Debug, Default)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// Hasher with explicit cost parameters (memory in KiB, iterations).
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] if argon2 rejects the parameters.
    pub fn with_params(memory_kib: u32, iterations: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| WorkflowError::validation(format!("argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hashes a password into PHC string format on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::DependencyFailure`] if hashing fails.
    pub async fn hash(&self, password: String) -> Result<String> {
        let argon2 = self.argon2();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| WorkflowError::DependencyFailure(format!("password hashing: {e}")))
        })
        .await
        .map_err(|e| WorkflowError::DependencyFailure(format!("password hashing task: {e}")))?
    }

    /// Checks a password against a stored PHC hash on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::DependencyFailure`] if the hash is unreadable.
    pub async fn verify(&self, password: String, hash: String) -> Result<bool> {
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| WorkflowError::DependencyFailure(format!("stored password hash: {e}")))?;
            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| WorkflowError::DependencyFailure(format!("password check task: {e}")))?
    }
}

/// Sign-up request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUp {
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
    /// Phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// Password
    pub password: String,
    /// Referral code of the ambassador who invited the user
    #[serde(default)]
    pub referral_code: Option<String>,
}

/// Claims inside a password reset token.
#[derive(Debug, Serialize, Deserialize)]
struct ResetClaims {
    uid: UserId,
    exp: i64,
    /// Prefix of the hash of the password being replaced; a used or
    /// superseded token no longer matches.
    fp: String,
}

fn fingerprint(password_hash: &str) -> String {
    sha256_hex(password_hash)[..16].to_string()
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(WorkflowError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Options for the [`UserDirectory`].
#[derive(Clone, Debug)]
pub struct DirectoryOptions {
    /// Emails that become admins when they sign up
    pub admin_emails: Vec<String>,
    /// Base of the link sent in password reset emails; the token is appended
    /// as `?token=…`
    pub reset_url_base: String,
    /// How long a reset link stays valid
    pub reset_ttl: Duration,
}

/// Accounts, credentials, roles and referral codes.
#[derive(Clone)]
pub struct UserDirectory {
    env: Environment,
    hasher: PasswordHasher,
    reset_signer: TokenSigner,
    options: DirectoryOptions,
}

impl UserDirectory {
    /// Creates a new `UserDirectory`
    #[must_use]
    pub fn new(
        env: Environment,
        hasher: PasswordHasher,
        reset_signer: TokenSigner,
        mut options: DirectoryOptions,
    ) -> Self {
        options.admin_emails = options
            .admin_emails
            .iter()
            .map(|e| normalize_email(e))
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            env,
            hasher,
            reset_signer,
            options,
        }
    }

    /// Creates an account.
    ///
    /// A referral code links the new user to the ambassador who owns it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] for malformed fields, a weak
    /// password, a taken email or an unknown referral code.
    #[tracing::instrument(skip(self, request))]
    pub async fn sign_up(&self, request: SignUp) -> Result<User> {
        let name = normalize_name(&request.name);
        if name.is_empty() {
            return Err(WorkflowError::validation("name is required"));
        }
        let email = normalize_email(&request.email);
        if !is_plausible_email(&email) {
            return Err(WorkflowError::validation("email address is invalid"));
        }
        let phone = request.phone.as_deref().and_then(normalize_phone);
        if phone.as_ref().is_some_and(|p| !(7..=15).contains(&p.len())) {
            return Err(WorkflowError::validation("phone number is invalid"));
        }
        validate_password(&request.password)?;

        if self.env.store.find_user_by_email(email.clone()).await?.is_some() {
            return Err(WorkflowError::validation(
                "An account with this email already exists",
            ));
        }

        let referred_by = match request
            .referral_code
            .as_deref()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
        {
            Some(code) => Some(
                self.env
                    .store
                    .find_user_by_referral_code(code)
                    .await?
                    .ok_or_else(|| WorkflowError::validation("unknown referral code"))?
                    .id,
            ),
            None => None,
        };

        let role = if self.options.admin_emails.contains(&email) {
            Role::Admin
        } else {
            Role::User
        };
        let password_hash = self.hasher.hash(request.password).await?;
        let user = User {
            id: UserId::new(),
            name,
            email,
            phone,
            role,
            referral_code: None,
            referred_by,
            points: 0,
            created_at: self.env.clock.now(),
        };

        self.env
            .store
            .commit(vec![
                Mutation::InsertUser(user.clone()),
                Mutation::SetPasswordHash {
                    user_id: user.id,
                    password_hash,
                },
            ])
            .await?;

        tracing::info!(user_id = %user.id, role = user.role.as_str(), referred = user.referred_by.is_some(), "User signed up");
        Ok(user)
    }

    /// Checks an email and password.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Unauthenticated`] for an unknown email or a
    /// wrong password, without saying which.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let rejected = || WorkflowError::Unauthenticated("invalid email or password".into());

        let Some(user) = self.env.store.find_user_by_email(normalize_email(email)).await? else {
            return Err(rejected());
        };
        let Some(hash) = self.env.store.get_password_hash(user.id).await? else {
            return Err(rejected());
        };
        if self.hasher.verify(password.to_string(), hash).await? {
            Ok(user)
        } else {
            tracing::debug!(user_id = %user.id, "Password mismatch");
            Err(rejected())
        }
    }

    /// Loads a user by id without access checks (credential resolution).
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] if the user does not exist.
    pub async fn find(&self, id: UserId) -> Result<User> {
        self.env
            .store
            .get_user(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("User", id))
    }

    /// A user's profile, for the user themselves or an admin.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] for other callers
    /// - [`WorkflowError::NotFound`] if the user does not exist
    pub async fn get(&self, actor: &Actor, id: UserId) -> Result<User> {
        actor.require_owner_or_admin(id, "view this profile")?;
        self.find(id).await
    }

    /// Makes a user an ambassador with a fresh referral code.
    ///
    /// Promoting an existing ambassador returns them unchanged.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller is an admin
    /// - [`WorkflowError::NotFound`] if the user does not exist
    #[tracing::instrument(skip(self, actor), fields(admin_id = %actor.user_id))]
    pub async fn promote_to_ambassador(&self, actor: &Actor, id: UserId) -> Result<User> {
        actor.require_admin("promote ambassadors")?;
        let user = self.find(id).await?;
        if user.role == Role::Ambassador && user.referral_code.is_some() {
            return Ok(user);
        }

        for _ in 0..REFERRAL_CODE_ATTEMPTS {
            let now = self.env.clock.now();
            let promoted = User {
                role: Role::Ambassador,
                referral_code: Some(
                    user.referral_code
                        .clone()
                        .unwrap_or_else(generate_referral_code),
                ),
                ..user.clone()
            };
            let audit = AuditEntry::new(AuditAction::PromoteAmbassador, actor.user_id, now)
                .for_user(id)
                .with_detail(promoted.referral_code.clone().unwrap_or_default());

            match self
                .env
                .store
                .commit(vec![
                    Mutation::UpdateUser(promoted.clone()),
                    Mutation::AppendAudit(audit),
                ])
                .await
            {
                Ok(()) => {
                    tracing::info!(user_id = %id, referral_code = ?promoted.referral_code, "User promoted to ambassador");
                    return Ok(promoted);
                }
                Err(StoreError::Conflict(Constraint::ReferralCode)) => {
                    tracing::debug!(user_id = %id, "Referral code collision, retrying");
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(WorkflowError::Store(
            "could not allocate a unique referral code".into(),
        ))
    }

    /// Changes a user's role (admin only). Promotion to ambassador also
    /// assigns a referral code.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller is an admin
    /// - [`WorkflowError::Validation`] when admins try to change their own role
    /// - [`WorkflowError::NotFound`] if the user does not exist
    pub async fn set_role(&self, actor: &Actor, id: UserId, role: Role) -> Result<User> {
        actor.require_admin("change roles")?;
        if actor.user_id == id {
            return Err(WorkflowError::validation("admins cannot change their own role"));
        }
        if role == Role::Ambassador {
            return self.promote_to_ambassador(actor, id).await;
        }

        let user = self.find(id).await?;
        let now = self.env.clock.now();
        let updated = User { role, ..user };
        let audit = AuditEntry::new(AuditAction::ChangeRole, actor.user_id, now)
            .for_user(id)
            .with_detail(role.as_str());
        self.env
            .store
            .commit(vec![
                Mutation::UpdateUser(updated.clone()),
                Mutation::AppendAudit(audit),
            ])
            .await?;

        tracing::info!(user_id = %id, role = role.as_str(), "Role changed");
        Ok(updated)
    }

    /// Emails a password reset link if an account with a password exists.
    ///
    /// Always succeeds for unknown emails so callers cannot probe for
    /// accounts.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] on persistence failures.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let Some(user) = self.env.store.find_user_by_email(normalize_email(email)).await? else {
            return Ok(());
        };
        let Some(hash) = self.env.store.get_password_hash(user.id).await? else {
            return Ok(());
        };

        let expires_at = self.env.clock.now() + self.options.reset_ttl;
        let token = self.reset_signer.sign(&ResetClaims {
            uid: user.id,
            exp: expires_at.timestamp(),
            fp: fingerprint(&hash),
        })?;
        let link = format!("{}?token={token}", self.options.reset_url_base);

        self.env.notifications.dispatch(
            Notification::new(
                TemplateKind::PasswordReset,
                Recipient {
                    name: user.name.clone(),
                    email: user.email.clone(),
                },
            )
            .var("name", &user.name)
            .var("reset_url", link)
            .var("expires_at", expires_at.format("%d %b %Y, %H:%M UTC")),
        );
        tracing::info!(user_id = %user.id, "Password reset requested");
        Ok(())
    }

    /// Sets a new password using a reset token. Each token works once.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Unauthenticated`] for forged, expired or used tokens
    /// - [`WorkflowError::Validation`] for a weak password
    pub async fn reset_password(&self, token: &str, new_password: String) -> Result<()> {
        let rejected = || WorkflowError::Unauthenticated("reset link is invalid or expired".into());

        let claims: ResetClaims = self.reset_signer.verify(token).map_err(|_| rejected())?;
        if claims.exp < self.env.clock.now().timestamp() {
            return Err(rejected());
        }
        let current = self
            .env
            .store
            .get_password_hash(claims.uid)
            .await?
            .ok_or_else(rejected)?;
        if !constant_time_eq::constant_time_eq(fingerprint(&current).as_bytes(), claims.fp.as_bytes()) {
            return Err(rejected());
        }
        validate_password(&new_password)?;

        let password_hash = self.hasher.hash(new_password).await?;
        self.env
            .store
            .commit(vec![Mutation::SetPasswordHash {
                user_id: claims.uid,
                password_hash,
            }])
            .await?;

        tracing::info!(user_id = %claims.uid, "Password reset");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn referral_codes_have_expected_shape() {
        let code = generate_referral_code();
        assert!(code.starts_with(REFERRAL_CODE_PREFIX));
        assert_eq!(code.len(), REFERRAL_CODE_PREFIX.len() + REFERRAL_CODE_LEN);
        assert!(code[REFERRAL_CODE_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password("hunter2").is_err());
        assert!(validate_password("correct horse").is_ok());
    }

    #[tokio::test]
    async fn hasher_verifies_only_the_right_password() {
        let hasher = PasswordHasher::with_params(1024, 1).unwrap();
        let hash = hasher.hash("correct horse".into()).await.unwrap();
        assert!(hash.starts_with("$argon2id"));
        assert!(hasher.verify("correct horse".into(), hash.clone()).await.unwrap());
        assert!(!hasher.verify("battery staple".into(), hash).await.unwrap());
    }

    #[test]
    fn fingerprint_changes_with_the_hash() {
        assert_eq!(fingerprint("a").len(), 16);
        assert_ne!(fingerprint("a"), fingerprint("b"));
    }
}
