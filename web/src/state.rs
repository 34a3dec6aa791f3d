//! Application state for Axum handlers.

use crate::auth::JwtAuth;
use crate::storage::ProofStorage;
use eventpass_core::catalog::EventCatalog;
use eventpass_core::environment::Environment;
use eventpass_core::referral::ReferralLedger;
use eventpass_core::settings::SettingsService;
use eventpass_core::store::EntityStore;
use eventpass_core::tickets::TicketIssuer;
use eventpass_core::users::UserDirectory;
use eventpass_core::workflow::RegistrationWorkflow;
use std::sync::Arc;

/// The domain services handlers call into.
#[derive(Clone)]
pub struct Services {
    /// Registration lifecycle
    pub workflow: RegistrationWorkflow,
    /// Tickets and check-in
    pub tickets: TicketIssuer,
    /// Ambassador points
    pub referrals: ReferralLedger,
    /// Events
    pub catalog: EventCatalog,
    /// Accounts
    pub users: UserDirectory,
    /// Payment settings
    pub settings: SettingsService,
}

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is a handle.
#[derive(Clone)]
pub struct AppState {
    /// Domain services
    pub services: Services,
    /// Entity store, for audit reads and readiness checks
    pub store: Arc<dyn EntityStore>,
    /// Access tokens
    pub auth: JwtAuth,
    /// Payment-proof uploads
    pub proofs: Arc<dyn ProofStorage>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        env: &Environment,
        services: Services,
        auth: JwtAuth,
        proofs: Arc<dyn ProofStorage>,
    ) -> Self {
        Self {
            services,
            store: Arc::clone(&env.store),
            auth,
            proofs,
        }
    }
}
