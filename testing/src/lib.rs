//! # EventPass Testing
//!
//! Test doubles and a ready-wired harness for EventPass services.
//!
//! This crate provides:
//! - [`InMemoryEntityStore`]: an entity store with the same atomicity and
//!   constraint rules as the PostgreSQL backend
//! - [`RecordingNotifier`] and [`FailingNotifier`]: notifier doubles
//! - [`mocks`]: deterministic clocks
//! - [`TestHarness`]: every service wired to the doubles, plus seeding helpers
//!
//! ## Example
//!
//! ```ignore
//! use eventpass_testing::TestHarness;
//!
//! #[tokio::test]
//! async fn registration_reserves_tickets() {
//!     let h = TestHarness::new();
//!     let event = h.seed_event(100, 101).await;
//!     let user = h.seed_user(Role::User).await;
//!
//!     let registration = h
//!         .workflow
//!         .submit(&TestHarness::actor(&user), h.submission(&event, 2))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(registration.total_amount, Money::from_major(202));
//! }
//! ```

pub mod notifier;
pub mod store;

pub use mocks::{FixedClock, ManualClock, test_clock};
pub use notifier::{FailingNotifier, RecordingNotifier};
pub use store::InMemoryEntityStore;

use chrono::{DateTime, Utc};
use eventpass_core::catalog::EventCatalog;
use eventpass_core::environment::{Actor, Clock, Environment};
use eventpass_core::inventory::InventoryManager;
use eventpass_core::notification::{NotificationDispatcher, Notifier};
use eventpass_core::referral::{REFERRAL_POINTS, ReferralLedger};
use eventpass_core::settings::{SettingsDefaults, SettingsService};
use eventpass_core::signing::TokenSigner;
use eventpass_core::store::{EntityStore, Mutation};
use eventpass_core::tickets::TicketIssuer;
use eventpass_core::types::{
    Event, EventFormat, EventId, EventStatus, Money, Role, TicketType, User, UserId,
};
use eventpass_core::users::{DirectoryOptions, PasswordHasher, UserDirectory};
use eventpass_core::workflow::{RegistrationWorkflow, SubmitRegistration};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Deterministic clocks.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use eventpass_testing::mocks::FixedClock;
    /// use eventpass_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test advances it.
    ///
    /// Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward
        ///
        /// # Panics
        ///
        /// Panics if another test thread panicked while holding the clock.
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap();
            *time += by;
        }
    }

    impl Clock for ManualClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2026-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Installs a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Secret used for ticket QR codes in tests
pub const QR_SECRET: &str = "test-qr-secret";
/// Secret used for password reset tokens in tests
pub const RESET_SECRET: &str = "test-reset-secret";
/// Emails that become admins on sign-up in tests
pub const ADMIN_EMAIL: &str = "root@eventpass.test";

/// Every EventPass service wired to in-memory doubles.
#[derive(Clone)]
pub struct TestHarness {
    /// Backing store
    pub store: InMemoryEntityStore,
    /// Records dispatched notifications (unused when built with another
    /// notifier)
    pub notifier: RecordingNotifier,
    /// Time source shared by every service
    pub clock: ManualClock,
    /// Shared environment
    pub env: Environment,
    /// Registration workflow
    pub workflow: RegistrationWorkflow,
    /// Ticket issuer and check-in
    pub tickets: TicketIssuer,
    /// Referral ledger
    pub referrals: ReferralLedger,
    /// Event catalog
    pub catalog: EventCatalog,
    /// Accounts and credentials
    pub users: UserDirectory,
    /// Payment settings
    pub settings: SettingsService,
    sequence: Arc<AtomicU64>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Harness recording notifications in [`TestHarness::notifier`].
    #[must_use]
    pub fn new() -> Self {
        let recorder = RecordingNotifier::new();
        Self::build(recorder.clone(), Arc::new(recorder))
    }

    /// Harness sending notifications through `notifier` instead.
    #[must_use]
    pub fn with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        Self::build(RecordingNotifier::new(), notifier)
    }

    #[allow(clippy::expect_used)]
    fn build(recorder: RecordingNotifier, notifier: Arc<dyn Notifier>) -> Self {
        init_tracing();

        let store = InMemoryEntityStore::new();
        let clock = ManualClock::new(test_clock().now());
        let env = Environment::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            NotificationDispatcher::new(notifier),
        );

        let tickets = TicketIssuer::new(env.clone(), TokenSigner::new(QR_SECRET));
        let referrals = ReferralLedger::new(env.clone(), REFERRAL_POINTS);
        let workflow = RegistrationWorkflow::new(env.clone(), tickets.clone(), referrals.clone());
        let catalog = EventCatalog::new(env.clone());
        let hasher = PasswordHasher::with_params(1024, 1).expect("cheap argon2 parameters");
        let users = UserDirectory::new(
            env.clone(),
            hasher,
            TokenSigner::new(RESET_SECRET),
            DirectoryOptions {
                admin_emails: vec![ADMIN_EMAIL.to_string()],
                reset_url_base: "https://eventpass.test/reset-password".into(),
                reset_ttl: chrono::Duration::hours(1),
            },
        );
        let settings = SettingsService::new(
            env.clone(),
            SettingsDefaults {
                upi_id: "eventpass@upi".into(),
                payee_name: "EventPass".into(),
            },
        );

        Self {
            store,
            notifier: recorder,
            clock,
            env,
            workflow,
            tickets,
            referrals,
            catalog,
            users,
            settings,
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// The authenticated identity of `user`
    #[must_use]
    pub const fn actor(user: &User) -> Actor {
        Actor::new(user.id, user.role)
    }

    /// Inserts a user with `role` directly into the store.
    ///
    /// # Panics
    ///
    /// Panics if the store rejects the insert.
    #[allow(clippy::expect_used)]
    pub async fn seed_user(&self, role: Role) -> User {
        let n = self.next();
        let user = User {
            id: UserId::new(),
            name: format!("User {n}"),
            email: format!("user{n}@example.com"),
            phone: None,
            role,
            referral_code: None,
            referred_by: None,
            points: 0,
            created_at: self.clock.now(),
        };
        self.store
            .commit(vec![Mutation::InsertUser(user.clone())])
            .await
            .expect("seed user");
        user
    }

    /// Inserts an admin and returns its identity
    pub async fn admin(&self) -> Actor {
        Self::actor(&self.seed_user(Role::Admin).await)
    }

    /// Inserts an ambassador with a referral code.
    ///
    /// # Panics
    ///
    /// Panics if the store rejects the insert.
    #[allow(clippy::expect_used)]
    pub async fn seed_ambassador(&self) -> User {
        let n = self.next();
        let user = User {
            id: UserId::new(),
            name: format!("Ambassador {n}"),
            email: format!("ambassador{n}@example.com"),
            phone: None,
            role: Role::Ambassador,
            referral_code: Some(format!("AMB-T{n:05}")),
            referred_by: None,
            points: 0,
            created_at: self.clock.now(),
        };
        self.store
            .commit(vec![Mutation::InsertUser(user.clone())])
            .await
            .expect("seed ambassador");
        user
    }

    /// Inserts a user referred by `ambassador`.
    ///
    /// # Panics
    ///
    /// Panics if the store rejects the update.
    #[allow(clippy::expect_used)]
    pub async fn seed_referred_user(&self, ambassador: &User) -> User {
        let mut user = self.seed_user(Role::User).await;
        user.referred_by = Some(ambassador.id);
        self.store
            .commit(vec![Mutation::UpdateUser(user.clone())])
            .await
            .expect("link referral");
        user
    }

    /// Inserts a published solo event with one "Standard" ticket type.
    ///
    /// # Panics
    ///
    /// Panics if the store rejects the insert.
    pub async fn seed_event(&self, quantity: u32, price_major: u64) -> Event {
        self.seed_event_with(quantity, price_major, EventFormat::Solo).await
    }

    /// Inserts a published event with one "Standard" ticket type.
    ///
    /// # Panics
    ///
    /// Panics if the store rejects the insert.
    #[allow(clippy::expect_used)]
    pub async fn seed_event_with(&self, quantity: u32, price_major: u64, format: EventFormat) -> Event {
        let now = self.clock.now();
        let event = Event {
            id: EventId::new(),
            organizer_id: UserId::new(),
            title: "Hack Night".into(),
            description: "Overnight hackathon".into(),
            venue: "Main Auditorium".into(),
            starts_at: now + chrono::Duration::days(30),
            ticket_types: vec![TicketType {
                name: "Standard".into(),
                price: Money::from_major(price_major),
                quantity,
                available: quantity,
                description: String::new(),
            }],
            capacity: quantity,
            registered_count: 0,
            status: EventStatus::Published,
            format,
            created_at: now,
            updated_at: now,
        };
        self.store
            .commit(vec![Mutation::InsertEvent(event.clone())])
            .await
            .expect("seed event");
        event
    }

    /// A fresh UTR that no other registration in this harness uses
    #[must_use]
    pub fn utr(&self) -> String {
        format!("UTR{:09}", self.next())
    }

    /// A valid solo submission of `quantity` "Standard" tickets
    #[must_use]
    pub fn submission(&self, event: &Event, quantity: u32) -> SubmitRegistration {
        SubmitRegistration {
            event_id: event.id,
            ticket_type: "Standard".into(),
            quantity,
            team_name: None,
            team_members: Vec::new(),
            utr_number: self.utr(),
            payment_proof_url: "/uploads/proof.png".into(),
        }
    }

    /// Tickets still available for the "Standard" type of an event
    ///
    /// Every read also checks `0 <= available <= quantity` across all of the
    /// event's ticket types.
    ///
    /// # Panics
    ///
    /// Panics if the event or ticket type does not exist, or if the inventory
    /// invariant is broken.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn available(&self, event_id: EventId) -> u32 {
        let event = self.store.event(event_id).expect("seeded event");
        InventoryManager::new()
            .check_invariants(&event)
            .expect("inventory invariant");
        event
            .ticket_type("Standard")
            .map(|t| t.available)
            .expect("event with a Standard ticket type")
    }

    /// Current points of a user, zero if missing
    #[must_use]
    pub fn points(&self, user_id: UserId) -> u64 {
        self.store.user(user_id).map_or(0, |u| u.points)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_every_clone() {
        let clock = ManualClock::new(test_clock().now());
        let shared = clock.clone();
        let before = shared.now();
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(shared.now() - before, chrono::Duration::minutes(5));
    }

    #[tokio::test]
    async fn seeded_entities_are_visible_through_the_store_trait() {
        let h = TestHarness::new();
        let user = h.seed_user(Role::Coordinator).await;
        let event = h.seed_event(5, 50).await;

        let loaded = h.env.store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.role, Role::Coordinator);
        assert_eq!(h.available(event.id), 5);
    }

    #[tokio::test]
    #[should_panic(expected = "inventory invariant")]
    async fn available_rejects_overfull_inventory() {
        let h = TestHarness::new();
        let mut event = h.seed_event(5, 50).await;
        event.id = EventId::new();
        event.ticket_types[0].available = 6;
        h.store
            .commit(vec![Mutation::InsertEvent(event.clone())])
            .await
            .unwrap();

        let _ = h.available(event.id);
    }

    #[test]
    fn utrs_are_unique_and_well_formed() {
        let h = TestHarness::new();
        let a = h.utr();
        let b = h.utr();
        assert_ne!(a, b);
        assert!(eventpass_core::workflow::normalize_utr(&a).is_ok());
    }
}
