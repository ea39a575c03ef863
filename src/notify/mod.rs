//! Block/unblock/escalation notifications.
//!
//! Delivery is best-effort. A sink that fails is logged and counted; the
//! operation that triggered the notification never sees the failure.

mod webhook;

pub use webhook::WebhookSink;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification throttled")]
    Throttled,
    #[error("no async runtime available for delivery")]
    NoRuntime,
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    Blocked,
    Unblocked,
    Escalated,
}

impl NotifyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyKind::Blocked => "blocked",
            NotifyKind::Unblocked => "unblocked",
            NotifyKind::Escalated => "escalated",
        }
    }
}

impl std::fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotifyKind,
    pub address: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Destination for notifications.
///
/// `notify` must not block; sinks that do I/O hand the work to a spawned task.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Fan-out over every configured sink.
#[derive(Clone, Default)]
pub struct Notifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn notify(&self, notification: Notification) {
        for sink in &self.sinks {
            if let Err(e) = sink.notify(&notification) {
                warn!(
                    kind = %notification.kind,
                    address = %notification.address,
                    error = %e,
                    "Notification not delivered"
                );
                crate::metrics::record_notification_failure();
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Emits every notification as a structured log event.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        info!(
            kind = %n.kind,
            address = %n.address,
            details = %n.details,
            "Blocklist notification"
        );
        Ok(())
    }
}

/// Keeps every notification in memory. Handy for asserting on side effects.
#[derive(Debug, Default)]
pub struct CollectingSink {
    received: Mutex<Vec<Notification>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().clone()
    }

    pub fn count(&self, kind: NotifyKind) -> usize {
        self.received.lock().iter().filter(|n| n.kind == kind).count()
    }

    pub fn clear(&self) {
        self.received.lock().clear();
    }
}

impl NotificationSink for CollectingSink {
    fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        self.received.lock().push(n.clone());
        Ok(())
    }
}
