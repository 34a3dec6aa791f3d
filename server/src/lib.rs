//! EventPass server: configuration and wiring for the `eventpass` binary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod config;
pub mod metrics;
