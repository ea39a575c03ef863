//! Outbound webhook sink.
//!
//! Each notification is POSTed as JSON from a spawned task. Sends are
//! throttled with a governor direct limiter so a block storm cannot turn
//! into a request storm against the receiver.

use super::{Notification, NotificationSink, NotifyError};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

type DirectRateLimiter = governor::DefaultDirectRateLimiter;

pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    limiter: Option<DirectRateLimiter>,
}

impl WebhookSink {
    /// `max_per_second = 0` disables throttling.
    pub fn new(url: &str, timeout: Duration, max_per_second: u32) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let limiter = NonZeroU32::new(max_per_second)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));

        Ok(Self {
            client,
            url: url.to_string(),
            limiter,
        })
    }
}

impl NotificationSink for WebhookSink {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Some(limiter) = &self.limiter
            && limiter.check().is_err()
        {
            return Err(NotifyError::Throttled);
        }

        let handle = tokio::runtime::Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;

        let client = self.client.clone();
        let url = self.url.clone();
        let payload = notification.clone();

        handle.spawn(async move {
            let result = client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .and_then(|resp| resp.error_for_status());

            match result {
                Ok(_) => {
                    debug!(kind = %payload.kind, address = %payload.address, "Webhook delivered")
                }
                Err(e) => {
                    warn!(
                        kind = %payload.kind,
                        address = %payload.address,
                        error = %e,
                        "Webhook delivery failed"
                    );
                    crate::metrics::record_notification_failure();
                }
            }
        });

        Ok(())
    }
}
