//! SMTP delivery using Lettre.

use crate::templates::{RenderedEmail, TemplateRenderer};
use eventpass_core::notification::{Notification, Notifier, NotifyError};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// How the connection to the SMTP server is secured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connection (local relays and test servers only)
    None,
    /// Upgrade with STARTTLS (usually port 587)
    #[default]
    StartTls,
    /// Implicit TLS (usually port 465)
    Tls,
}

impl SmtpSecurity {
    /// Parses `none`, `starttls` or `tls`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "starttls" => Some(Self::StartTls),
            "tls" => Some(Self::Tls),
            _ => None,
        }
    }
}

/// SMTP connection settings.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    /// Server host name
    pub host: String,
    /// Server port
    pub port: u16,
    /// Connection security
    pub security: SmtpSecurity,
    /// Login name; no authentication when `None`
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Sender address, e.g. `EventPass <noreply@example.com>`
    pub from: String,
    /// Connection and command timeout
    pub timeout: Duration,
}

/// Sends notifications as multipart emails over SMTP.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    renderer: TemplateRenderer,
}

impl SmtpNotifier {
    /// Builds the transport. No connection is opened until the first send.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Invalid`] if the sender address or host is
    /// invalid.
    pub fn new(config: &SmtpConfig, renderer: TemplateRenderer) -> Result<Self, NotifyError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| NotifyError::Invalid(format!("Invalid from address: {e}")))?;

        let mut builder = match config.security {
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| NotifyError::Invalid(format!("SMTP relay error: {e}")))?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| NotifyError::Invalid(format!("SMTP relay error: {e}")))?,
        };
        builder = builder.port(config.port).timeout(Some(config.timeout));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            security = ?config.security,
            "SMTP transport initialized"
        );

        Ok(Self {
            transport: builder.build(),
            from,
            renderer,
        })
    }

    fn message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let to: Mailbox = format!(
            "{} <{}>",
            notification.recipient.name.replace(['<', '>', '"'], ""),
            notification.recipient.email
        )
        .parse()
        .map_err(|e| NotifyError::Invalid(format!("Invalid to address: {e}")))?;

        let RenderedEmail {
            subject,
            html,
            text,
        } = self.renderer.render(notification)?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(text, html))
            .map_err(|e| NotifyError::Invalid(format!("Failed to build email: {e}")))
    }
}

impl Notifier for SmtpNotifier {
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            let message = self.message(&notification)?;
            self.transport
                .send(message)
                .await
                .map_err(|e| NotifyError::Delivery(format!("Failed to send email: {e}")))?;
            metrics::counter!("notifications.sent", "kind" => notification.kind.as_str())
                .increment(1);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use eventpass_core::notification::{Recipient, TemplateKind};

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".into(),
            port: 2525,
            security: SmtpSecurity::None,
            username: None,
            password: None,
            from: "EventPass <noreply@eventpass.test>".into(),
            timeout: Duration::from_secs(5),
        }
    }

    fn notifier() -> SmtpNotifier {
        SmtpNotifier::new(
            &config(),
            TemplateRenderer::new("EventPass", "https://eventpass.test").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn security_modes_parse() {
        assert_eq!(SmtpSecurity::parse("STARTTLS"), Some(SmtpSecurity::StartTls));
        assert_eq!(SmtpSecurity::parse(" tls "), Some(SmtpSecurity::Tls));
        assert_eq!(SmtpSecurity::parse("none"), Some(SmtpSecurity::None));
        assert_eq!(SmtpSecurity::parse("ssl"), None);
    }

    #[test]
    fn invalid_sender_is_rejected() {
        let mut config = config();
        config.from = "not an address".into();
        let result = SmtpNotifier::new(
            &config,
            TemplateRenderer::new("EventPass", "https://eventpass.test").unwrap(),
        );
        assert!(matches!(result, Err(NotifyError::Invalid(_))));
    }

    #[test]
    fn messages_are_addressed_to_the_recipient() {
        let notification = Notification::new(
            TemplateKind::CertificateReady,
            Recipient {
                name: "Asha <Rao>".into(),
                email: "asha@example.com".into(),
            },
        )
        .var("name", "Asha Rao")
        .var("event_title", "Hack Night")
        .var("registration_id", "3f1c");

        let message = notifier().message(&notification).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: \"Asha Rao\" <asha@example.com>") || raw.contains("To: Asha Rao <asha@example.com>"));
        assert!(raw.contains("Subject: Your certificate for Hack Night"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[test]
    fn invalid_recipient_is_not_sent() {
        let notification = Notification::new(
            TemplateKind::CertificateReady,
            Recipient {
                name: "Asha".into(),
                email: "nope".into(),
            },
        );
        assert!(matches!(
            notifier().message(&notification),
            Err(NotifyError::Invalid(_))
        ));
    }
}
