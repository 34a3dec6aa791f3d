//! Notifier that renders and logs emails instead of sending them.

use crate::templates::TemplateRenderer;
use eventpass_core::notification::{Notification, Notifier, NotifyError};
use std::future::Future;
use std::pin::Pin;

/// Development notifier: renders every notification and logs the subject.
///
/// Rendering still runs, so template errors surface without an SMTP server.
pub struct LogNotifier {
    renderer: TemplateRenderer,
}

impl LogNotifier {
    /// Creates a logging notifier
    #[must_use]
    pub const fn new(renderer: TemplateRenderer) -> Self {
        Self { renderer }
    }
}

impl Notifier for LogNotifier {
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            let email = self.renderer.render(&notification)?;
            tracing::info!(
                kind = %notification.kind,
                to = %notification.recipient.email,
                subject = %email.subject,
                "Email (not sent, SMTP disabled)"
            );
            tracing::debug!(body = %email.text, "Email body");
            Ok(())
        })
    }
}
