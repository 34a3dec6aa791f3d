//! Prometheus metrics.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `registrations_submitted`, `_verified`, `_rejected`, `_resubmitted`,
//!   `_cancelled` - Registration lifecycle
//! - `tickets_checked_in` - Successful venue scans
//! - `referrals_awarded` - Points awards
//! - `notifications_sent` / `notifications_failed` - Email delivery
//! - `uploads_payment_proof` - Stored payment screenshots
//! - `auth_login_failed` - Rejected logins
//! - `store_commit_rejected` - Batches refused by a constraint or stale state
//! - `http_requests{method,status}` - Requests served
//!
//! ## Histograms
//! - `store_commit_duration_seconds` - Transaction time
//! - `http_request_duration_seconds{method,status}` - Request latency

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use std::net::SocketAddr;

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Installs the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must run inside the Tokio runtime.
///
/// # Errors
///
/// Returns [`BuildError`] if a recorder is already installed or the listener
/// cannot be set up.
pub fn install(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), LATENCY_BUCKETS)?
        .install()?;
    describe();
    tracing::info!(%addr, "Metrics available at http://{addr}/metrics");
    Ok(())
}

fn describe() {
    describe_counter!("registrations.submitted", "Registrations submitted");
    describe_counter!("registrations.verified", "Payments verified and tickets issued");
    describe_counter!("registrations.rejected", "Payments rejected");
    describe_counter!("registrations.resubmitted", "Rejected registrations resubmitted");
    describe_counter!("registrations.cancelled", "Registrations cancelled");
    describe_counter!("tickets.checked_in", "Tickets scanned at the venue");
    describe_counter!("referrals.awarded", "Referral point awards");
    describe_counter!("notifications.sent", "Emails delivered");
    describe_counter!("notifications.failed", "Emails that could not be delivered");
    describe_counter!("uploads.payment_proof", "Payment screenshots stored");
    describe_counter!("auth.login.failed", "Rejected login attempts");
    describe_counter!("store.commit.rejected", "Mutation batches rolled back");
    describe_counter!("http.requests", "HTTP requests served");
    describe_histogram!(
        "store.commit.duration_seconds",
        metrics::Unit::Seconds,
        "Time to apply a mutation batch"
    );
    describe_histogram!(
        "http.request.duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request latency"
    );
}
