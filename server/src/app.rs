//! Service wiring.
//!
//! Turns a [`Config`] and an entity store into the HTTP application.

use crate::config::{Config, MailConfig};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
};
use eventpass_core::catalog::EventCatalog;
use eventpass_core::environment::{Environment, SystemClock};
use eventpass_core::notification::{NotificationDispatcher, Notifier};
use eventpass_core::referral::ReferralLedger;
use eventpass_core::settings::{SettingsDefaults, SettingsService};
use eventpass_core::signing::TokenSigner;
use eventpass_core::store::EntityStore;
use eventpass_core::tickets::TicketIssuer;
use eventpass_core::users::{DirectoryOptions, PasswordHasher, UserDirectory};
use eventpass_core::workflow::RegistrationWorkflow;
use eventpass_mail::{LogNotifier, SmtpConfig, SmtpNotifier, TemplateRenderer};
use eventpass_web::{AppState, JwtAuth, LocalProofStorage, Services, build_router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Picks the SMTP notifier when a server is configured, the logging one
/// otherwise.
///
/// # Errors
///
/// Fails if the templates do not compile or the sender address is invalid.
pub fn build_notifier(mail: &MailConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    let renderer = TemplateRenderer::new(mail.from_name.clone(), mail.app_base_url.clone())?;
    match &mail.smtp {
        Some(smtp) => {
            let config = SmtpConfig {
                host: smtp.host.clone(),
                port: smtp.port,
                security: smtp.security,
                username: smtp.username.clone(),
                password: smtp.password.clone(),
                from: mail.from.clone(),
                timeout: SMTP_TIMEOUT,
            };
            tracing::info!(host = %smtp.host, port = smtp.port, "Sending email over SMTP");
            Ok(Arc::new(SmtpNotifier::new(&config, renderer)?))
        }
        None => {
            tracing::warn!("SMTP_HOST not set, emails will only be logged");
            Ok(Arc::new(LogNotifier::new(renderer)))
        }
    }
}

/// Builds every domain service over `store`.
///
/// # Errors
///
/// Fails if the password reset lifetime is out of range.
pub fn build_state(
    config: &Config,
    store: Arc<dyn EntityStore>,
    notifier: Arc<dyn Notifier>,
) -> anyhow::Result<AppState> {
    let env = Environment::new(
        store,
        Arc::new(SystemClock),
        NotificationDispatcher::new(notifier),
    );

    let tickets = TicketIssuer::new(env.clone(), TokenSigner::new(&config.auth.ticket_qr_secret));
    let referrals = ReferralLedger::new(env.clone(), config.referral_points);
    let workflow = RegistrationWorkflow::new(env.clone(), tickets.clone(), referrals.clone());
    let catalog = EventCatalog::new(env.clone());
    let users = UserDirectory::new(
        env.clone(),
        PasswordHasher::default(),
        TokenSigner::new(&config.auth.password_reset_secret),
        DirectoryOptions {
            admin_emails: config.auth.admin_emails.clone(),
            reset_url_base: config.reset_url_base(),
            reset_ttl: chrono::Duration::from_std(config.auth.password_reset_ttl)?,
        },
    );
    let settings = SettingsService::new(
        env.clone(),
        SettingsDefaults {
            upi_id: config.settings.upi_id.clone(),
            payee_name: config.settings.payee_name.clone(),
        },
    );

    let services = Services {
        workflow,
        tickets,
        referrals,
        catalog,
        users,
        settings,
    };
    let auth = JwtAuth::new(config.auth.jwt_secret.as_bytes(), config.auth.token_ttl);
    let proofs = LocalProofStorage::new(
        &config.uploads.dir,
        &config.uploads.base_url,
        config.uploads.max_bytes,
    );

    Ok(AppState::new(&env, services, auth, Arc::new(proofs)))
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };
    Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .expose_headers(Any),
    )
}

/// The API router plus uploaded files and CORS.
pub fn build_app(config: &Config, state: AppState) -> Router {
    let uploads_path = format!("/{}", config.uploads.base_url.trim_matches('/'));
    let app = build_router(state).nest_service(&uploads_path, ServeDir::new(&config.uploads.dir));
    match cors_layer(&config.server.cors_allowed_origins) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use eventpass_testing::InMemoryEntityStore;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn config(dir: &std::path::Path, cors: &str) -> Config {
        let vars: HashMap<String, String> = [
            ("AUTH_JWT_SECRET", "jwt"),
            ("TICKET_QR_SECRET", "qr"),
            ("PASSWORD_RESET_SECRET", "reset"),
            ("UPLOAD_DIR", dir.to_str().unwrap()),
            ("CORS_ALLOWED_ORIGINS", cors),
        ]
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
        Config::from_map(&vars).unwrap()
    }

    fn app(config: &Config) -> Router {
        let notifier = build_notifier(&config.mail).unwrap();
        let state = build_state(config, Arc::new(InMemoryEntityStore::new()), notifier).unwrap();
        build_app(config, state)
    }

    #[tokio::test]
    async fn serves_api_and_uploaded_files() {
        let dir = std::env::temp_dir().join(format!("eventpass-app-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("proof.png"), b"png").await.unwrap();
        let config = config(&dir, "");
        let app = app(&config);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/settings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/uploads/proof.png").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn cors_only_when_configured() {
        let dir = std::env::temp_dir();
        let preflight = || {
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/events")
                .header(header::ORIGIN, "https://fest.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap()
        };

        let response = app(&config(&dir, "https://fest.example.com"))
            .oneshot(preflight())
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://fest.example.com"
        );

        let response = app(&config(&dir, "")).oneshot(preflight()).await.unwrap();
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[test]
    fn cors_ignores_invalid_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["*".to_string()]).is_some());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_some());
    }
}
