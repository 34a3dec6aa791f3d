//! # EventPass Core
//!
//! Domain model and registration workflow for the EventPass event ticketing
//! platform.
//!
//! Organizers publish events with priced ticket types, users register and
//! upload manual payment proof (a UTR reference plus a screenshot), admins
//! verify the payment and a signed, QR-encodable ticket is issued. Campus
//! ambassadors earn points when users they referred get verified.
//!
//! ## Components
//!
//! ```text
//! ┌──────────────────────┐
//! │ RegistrationWorkflow │  submit / resubmit / verify / reject / cancel
//! └──────────┬───────────┘
//!            │
//!    ┌───────┼──────────────┬──────────────────┐
//!    ▼       ▼              ▼                  ▼
//! Inventory  TicketIssuer   ReferralLedger     NotificationDispatcher
//!    │       │              │                  (fire-and-forget)
//!    └───────┴──────┬───────┘
//!                   ▼
//!             EntityStore  (atomic commit of a mutation batch)
//! ```
//!
//! All persistence goes through the [`store::EntityStore`] trait. A state
//! transition is expressed as a batch of [`store::Mutation`]s that the store
//! applies all-or-nothing, so inventory reservation and registration insert
//! (or status compare-and-set and ticket insert) can never be observed half
//! applied.
//!
//! ## Example
//!
//! ```ignore
//! use eventpass_core::referral::{REFERRAL_POINTS, ReferralLedger};
//! use eventpass_core::signing::TokenSigner;
//! use eventpass_core::tickets::TicketIssuer;
//! use eventpass_core::workflow::{RegistrationWorkflow, SubmitRegistration};
//!
//! let tickets = TicketIssuer::new(env.clone(), TokenSigner::new(qr_secret));
//! let referrals = ReferralLedger::new(env.clone(), REFERRAL_POINTS);
//! let workflow = RegistrationWorkflow::new(env, tickets, referrals);
//! let registration = workflow.submit(&actor, SubmitRegistration {
//!     event_id,
//!     ticket_type: "Standard".into(),
//!     quantity: 2,
//!     team_name: None,
//!     team_members: vec![],
//!     utr_number: "412345678901".into(),
//!     payment_proof_url: "/uploads/proof.png".into(),
//! }).await?;
//! assert_eq!(registration.total_amount, Money::from_major(202));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod catalog;
pub mod environment;
pub mod error;
#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test fixtures
mod fixtures;
pub mod inventory;
pub mod notification;
pub mod referral;
pub mod settings;
pub mod signing;
pub mod store;
pub mod team;
pub mod tickets;
pub mod types;
pub mod users;
pub mod workflow;

pub use environment::{Actor, Clock, Environment, SystemClock};
pub use error::{Result, WorkflowError};
pub use store::{EntityStore, Mutation, StoreError};
pub use types::*;
