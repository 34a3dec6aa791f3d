//! Email rendering with Handlebars.
//!
//! Each [`TemplateKind`] has a subject line, an HTML body wrapped in a
//! shared layout, and a plain-text body. Templates run in strict mode, so a
//! notification missing a variable fails to render instead of sending a
//! half-filled email.

use eventpass_core::notification::{Notification, NotifyError, TemplateKind};
use handlebars::Handlebars;
use serde_json::{Map, Value};

const LAYOUT: &str = include_str!("../templates/layout.html.hbs");

const TEMPLATES: [(TemplateKind, &str, &str, &str); 6] = [
    (
        TemplateKind::Submitted,
        "Registration received: {{event_title}}",
        include_str!("../templates/submitted.html.hbs"),
        include_str!("../templates/submitted.txt.hbs"),
    ),
    (
        TemplateKind::Resubmitted,
        "Payment details updated: {{event_title}}",
        include_str!("../templates/resubmitted.html.hbs"),
        include_str!("../templates/resubmitted.txt.hbs"),
    ),
    (
        TemplateKind::Approved,
        "Your ticket for {{event_title}}",
        include_str!("../templates/approved.html.hbs"),
        include_str!("../templates/approved.txt.hbs"),
    ),
    (
        TemplateKind::Rejected,
        "Action needed: payment for {{event_title}}",
        include_str!("../templates/rejected.html.hbs"),
        include_str!("../templates/rejected.txt.hbs"),
    ),
    (
        TemplateKind::CertificateReady,
        "Your certificate for {{event_title}}",
        include_str!("../templates/certificate_ready.html.hbs"),
        include_str!("../templates/certificate_ready.txt.hbs"),
    ),
    (
        TemplateKind::PasswordReset,
        "Reset your {{brand}} password",
        include_str!("../templates/password_reset.html.hbs"),
        include_str!("../templates/password_reset.txt.hbs"),
    ),
];

/// A rendered email, ready for a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedEmail {
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html: String,
    /// Plain-text alternative
    pub text: String,
}

/// Renders notifications into emails.
pub struct TemplateRenderer {
    html: Handlebars<'static>,
    plain: Handlebars<'static>,
    brand: String,
    app_url: String,
}

impl TemplateRenderer {
    /// Builds a renderer with the bundled templates.
    ///
    /// `brand` names the sender in subjects and footers; `app_url` is the
    /// public base URL links point at.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Invalid`] if a bundled template fails to parse.
    pub fn new(brand: impl Into<String>, app_url: impl Into<String>) -> Result<Self, NotifyError> {
        let mut html = Handlebars::new();
        html.set_strict_mode(true);
        let mut plain = Handlebars::new();
        plain.set_strict_mode(true);
        plain.register_escape_fn(handlebars::no_escape);

        html.register_template_string("layout", LAYOUT)
            .map_err(|e| NotifyError::Invalid(format!("layout template: {e}")))?;
        for (kind, subject, html_body, text_body) in TEMPLATES {
            let name = kind.as_str();
            html.register_template_string(name, html_body)
                .map_err(|e| NotifyError::Invalid(format!("{name} html template: {e}")))?;
            plain
                .register_template_string(&format!("{name}/subject"), subject)
                .map_err(|e| NotifyError::Invalid(format!("{name} subject template: {e}")))?;
            plain
                .register_template_string(name, text_body)
                .map_err(|e| NotifyError::Invalid(format!("{name} text template: {e}")))?;
        }

        Ok(Self {
            html,
            plain,
            brand: brand.into(),
            app_url: app_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Renders `notification` with its template.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Invalid`] if a variable the template uses is
    /// missing.
    pub fn render(&self, notification: &Notification) -> Result<RenderedEmail, NotifyError> {
        let name = notification.kind.as_str();
        let mut context: Map<String, Value> = notification
            .variables
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        context.insert("brand".into(), Value::String(self.brand.clone()));
        context.insert("app_url".into(), Value::String(self.app_url.clone()));
        let mut context = Value::Object(context);

        let invalid = |e: handlebars::RenderError| NotifyError::Invalid(format!("{name}: {e}"));
        let subject = self
            .plain
            .render(&format!("{name}/subject"), &context)
            .map_err(invalid)?;
        let text = self.plain.render(name, &context).map_err(invalid)?;
        let body = self.html.render(name, &context).map_err(invalid)?;

        if let Value::Object(map) = &mut context {
            map.insert("subject".into(), Value::String(subject.clone()));
            map.insert("body".into(), Value::String(body));
        }
        let html = self.html.render("layout", &context).map_err(invalid)?;

        Ok(RenderedEmail {
            subject,
            html,
            text,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use eventpass_core::notification::Recipient;

    fn renderer() -> TemplateRenderer {
        TemplateRenderer::new("EventPass", "https://eventpass.test/").unwrap()
    }

    fn registration_notification(kind: TemplateKind) -> Notification {
        Notification::new(
            kind,
            Recipient {
                name: "Asha Rao".into(),
                email: "asha@example.com".into(),
            },
        )
        .var("name", "Asha Rao")
        .var("event_title", "Hack Night")
        .var("venue", "Main Auditorium")
        .var("starts_at", "14 Mar 2026, 18:00 UTC")
        .var("registration_id", "3f1c")
        .var("ticket_type", "Standard")
        .var("quantity", 2)
        .var("total_amount", "₹202.00")
    }

    #[test]
    fn submitted_email_lists_the_order() {
        let email = renderer()
            .render(&registration_notification(TemplateKind::Submitted))
            .unwrap();

        assert_eq!(email.subject, "Registration received: Hack Night");
        assert!(email.text.contains("Ticket: 2 x Standard"));
        assert!(email.text.contains("Amount: ₹202.00"));
        assert!(email.html.contains("<strong>Hack Night</strong>"));
        assert!(email.html.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn approved_email_links_to_the_ticket() {
        let email = renderer()
            .render(&registration_notification(TemplateKind::Approved).var("ticket_number", "TKT-ABC123"))
            .unwrap();

        assert!(email.text.contains("TKT-ABC123"));
        assert!(
            email
                .text
                .contains("https://eventpass.test/registrations/3f1c/ticket")
        );
    }

    #[test]
    fn missing_variables_fail_to_render() {
        let result = renderer().render(&registration_notification(TemplateKind::Rejected));
        assert!(matches!(result, Err(NotifyError::Invalid(_))));
    }

    #[test]
    fn html_escapes_user_input_but_text_does_not() {
        let email = renderer()
            .render(
                &registration_notification(TemplateKind::Rejected)
                    .var("reason", "<b>UTR</b> & screenshot differ"),
            )
            .unwrap();

        assert!(email.html.contains("&lt;b&gt;UTR&lt;/b&gt; &amp; screenshot differ"));
        assert!(email.text.contains("Reason: <b>UTR</b> & screenshot differ"));
    }

    #[test]
    fn password_reset_uses_brand_in_subject() {
        let notification = Notification::new(
            TemplateKind::PasswordReset,
            Recipient {
                name: "Asha Rao".into(),
                email: "asha@example.com".into(),
            },
        )
        .var("name", "Asha Rao")
        .var("reset_url", "https://eventpass.test/reset-password?token=abc")
        .var("expires_at", "01 Jan 2026, 10:00 UTC");

        let email = renderer().render(&notification).unwrap();
        assert_eq!(email.subject, "Reset your EventPass password");
        assert!(email.text.contains("?token=abc"));
    }
}
