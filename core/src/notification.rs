//! Best-effort notification dispatch.
//!
//! Workflow transitions hand a [`Notification`] to the
//! [`NotificationDispatcher`], which sends it on a spawned task. A slow or
//! failing mail provider therefore never blocks or fails the transition that
//! produced the notification; failures are logged and counted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Template a notification is rendered with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Registration received, payment under review
    Submitted,
    /// Payment verified, ticket attached
    Approved,
    /// Payment proof rejected; carries a `reason` variable
    Rejected,
    /// Corrected payment proof received
    Resubmitted,
    /// Participation certificate available
    CertificateReady,
    /// Password reset link
    PasswordReset,
}

impl TemplateKind {
    /// Stable name used in logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Resubmitted => "resubmitted",
            Self::CertificateReady => "certificate_ready",
            Self::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who receives a notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
}

/// A notification waiting to be rendered and sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Template
    pub kind: TemplateKind,
    /// Recipient
    pub recipient: Recipient,
    /// Template variables
    pub variables: BTreeMap<String, String>,
}

impl Notification {
    /// Starts a notification of `kind` for `recipient`.
    #[must_use]
    pub fn new(kind: TemplateKind, recipient: Recipient) -> Self {
        Self {
            kind,
            recipient,
            variables: BTreeMap::new(),
        }
    }

    /// Adds a template variable.
    #[must_use]
    pub fn var(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.variables.insert(key.to_string(), value.to_string());
        self
    }

    /// Looks up a template variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }
}

/// Errors raised by a notifier backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The message could not be built (bad address, missing variable).
    #[error("Invalid notification: {0}")]
    Invalid(String),

    /// The transport failed to deliver the message.
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Delivery backend for notifications (SMTP, logging, test doubles).
pub trait Notifier: Send + Sync {
    /// Render and deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the message cannot be built or delivered.
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}

/// Fire-and-forget front end for a [`Notifier`].
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher sending through `notifier`.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Sends `notification` on a spawned task.
    ///
    /// Returns immediately; delivery failures are logged, never returned.
    pub fn dispatch(&self, notification: Notification) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                kind = %notification.kind,
                "No async runtime available, dropping notification"
            );
            return;
        };

        let notifier = Arc::clone(&self.notifier);
        runtime.spawn(async move {
            let kind = notification.kind;
            let recipient = notification.recipient.email.clone();
            match notifier.send(notification).await {
                Ok(()) => {
                    tracing::debug!(kind = %kind, recipient = %recipient, "Notification sent");
                }
                Err(error) => {
                    tracing::warn!(
                        kind = %kind,
                        recipient = %recipient,
                        error = %error,
                        "Notification failed"
                    );
                    metrics::counter!("notifications.failed", "kind" => kind.as_str())
                        .increment(1);
                }
            }
        });
    }
}
