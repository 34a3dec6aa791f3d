//! Payment settings singleton.
//!
//! Exactly one settings document exists. It is created from configured
//! defaults on the first read and lives only in the store.

use crate::audit::{AuditAction, AuditEntry};
use crate::environment::{Actor, Environment};
use crate::error::{Result, WorkflowError};
use crate::store::Mutation;
use crate::types::Settings;
use serde::{Deserialize, Serialize};

/// Values used when the settings document is first created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsDefaults {
    /// UPI id
    pub upi_id: String,
    /// Payee name
    pub payee_name: String,
}

/// Admin changes to the settings; absent fields keep their value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// UPI id payments are sent to
    #[serde(default)]
    pub upi_id: Option<String>,
    /// Payee name
    #[serde(default)]
    pub payee_name: Option<String>,
    /// Payment QR image URL
    #[serde(default)]
    pub qr_image_url: Option<String>,
    /// Instructions for registrants
    #[serde(default)]
    pub instructions: Option<String>,
}

fn validate_upi_id(upi_id: &str) -> Result<String> {
    let upi_id = upi_id.trim();
    match upi_id.split_once('@') {
        Some((handle, provider))
            if !handle.is_empty()
                && !provider.is_empty()
                && !upi_id.chars().any(char::is_whitespace) =>
        {
            Ok(upi_id.to_string())
        }
        _ => Err(WorkflowError::validation(
            "UPI id must look like 'name@bank'",
        )),
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Reads and updates the payment settings.
#[derive(Clone)]
pub struct SettingsService {
    env: Environment,
    defaults: SettingsDefaults,
}

impl SettingsService {
    /// Creates a new `SettingsService`
    #[must_use]
    pub const fn new(env: Environment, defaults: SettingsDefaults) -> Self {
        Self { env, defaults }
    }

    /// Returns the settings, creating them from the defaults if needed.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] on persistence failures.
    pub async fn get(&self) -> Result<Settings> {
        let defaults = Settings {
            upi_id: self.defaults.upi_id.clone(),
            payee_name: self.defaults.payee_name.clone(),
            qr_image_url: None,
            instructions: None,
            updated_at: self.env.clock.now(),
            updated_by: None,
        };
        Ok(self.env.store.load_or_init_settings(defaults).await?)
    }

    /// Applies an admin's changes to the settings.
    ///
    /// Empty strings clear the optional QR image and instructions.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] unless the caller is an admin
    /// - [`WorkflowError::Validation`] for a malformed UPI id or blank payee
    pub async fn update(&self, actor: &Actor, changes: UpdateSettings) -> Result<Settings> {
        actor.require_admin("change payment settings")?;
        let current = self.get().await?;

        let upi_id = match changes.upi_id.as_deref() {
            Some(upi_id) => validate_upi_id(upi_id)?,
            None => current.upi_id,
        };
        let payee_name = match changes.payee_name.as_deref() {
            Some(name) => non_blank(name)
                .ok_or_else(|| WorkflowError::validation("payee name cannot be blank"))?,
            None => current.payee_name,
        };

        let now = self.env.clock.now();
        let updated = Settings {
            upi_id,
            payee_name,
            qr_image_url: match changes.qr_image_url.as_deref() {
                Some(url) => non_blank(url),
                None => current.qr_image_url,
            },
            instructions: match changes.instructions.as_deref() {
                Some(text) => non_blank(text),
                None => current.instructions,
            },
            updated_at: now,
            updated_by: Some(actor.user_id),
        };
        let audit = AuditEntry::new(AuditAction::UpdateSettings, actor.user_id, now)
            .with_detail(format!("upi_id={}", updated.upi_id));

        self.env
            .store
            .commit(vec![
                Mutation::SaveSettings(updated.clone()),
                Mutation::AppendAudit(audit),
            ])
            .await?;

        tracing::info!(admin_id = %actor.user_id, "Payment settings updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upi_ids_need_handle_and_provider() {
        assert_eq!(validate_upi_id(" events@okaxis "), Ok("events@okaxis".into()));
        assert!(validate_upi_id("events").is_err());
        assert!(validate_upi_id("@okaxis").is_err());
        assert!(validate_upi_id("events@").is_err());
        assert!(validate_upi_id("my events@okaxis").is_err());
    }

    #[test]
    fn blank_values_clear_optional_fields() {
        assert_eq!(non_blank("   "), None);
        assert_eq!(non_blank(" Pay via UPI "), Some("Pay via UPI".into()));
    }
}
