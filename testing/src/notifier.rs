//! Notifier test doubles.

#![allow(clippy::unwrap_used)] // Mutex poison is unrecoverable in tests

use eventpass_core::notification::{Notification, Notifier, NotifyError, TemplateKind};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;

/// Records every notification it is asked to send.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications sent so far
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// Notifications of one template sent so far
    #[must_use]
    pub fn sent_of(&self, kind: TemplateKind) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }

    /// Waits until at least `count` notifications were recorded.
    ///
    /// Dispatch happens on spawned tasks, so tests poll instead of asserting
    /// right after the transition returns. Gives up after one second and
    /// returns whatever was recorded.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..100 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notification: Notification) -> SendFuture<'_> {
        self.sent.lock().unwrap().push(notification);
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Fails every delivery, counting the attempts.
#[derive(Clone, Debug, Default)]
pub struct FailingNotifier {
    attempts: Arc<AtomicUsize>,
}

impl FailingNotifier {
    /// Creates a notifier that always fails
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries attempted so far
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Notifier for FailingNotifier {
    fn send(&self, _notification: Notification) -> SendFuture<'_> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::ready(Err(NotifyError::Delivery(
            "smtp unavailable".into(),
        ))))
    }
}
