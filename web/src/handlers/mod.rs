//! HTTP request handlers, one module per resource.

pub mod audit;
pub mod events;
pub mod health;
pub mod registrations;
pub mod settings;
pub mod tickets;
pub mod uploads;
pub mod users;

pub use health::{health_check, readiness_check};
