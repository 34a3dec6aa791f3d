//! # EventPass Mail
//!
//! [`Notifier`](eventpass_core::notification::Notifier) backends that turn
//! workflow notifications into emails.
//!
//! - [`SmtpNotifier`]: multipart emails over SMTP with Lettre
//! - [`LogNotifier`]: renders and logs, for development without a mail server
//!
//! Both render through [`TemplateRenderer`], which ships one Handlebars
//! template set per [`TemplateKind`](eventpass_core::notification::TemplateKind).

#![forbid(unsafe_code)]

mod log;
mod smtp;
mod templates;

pub use log::LogNotifier;
pub use smtp::{SmtpConfig, SmtpNotifier, SmtpSecurity};
pub use templates::{RenderedEmail, TemplateRenderer};
