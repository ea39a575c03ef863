//! Per-address rate limiting with escalation.
//!
//! # Model
//!
//! Each address has one fixed-window counter. The first request after the
//! previous window has lapsed opens a new window of the resolved tier's
//! length; the window is not aligned to any calendar boundary. Requests past
//! `max` within the window are denied until it closes, so a client can burst
//! up to `2 * max` across a window edge.
//!
//! Every denial appends a durable violation record. Escalation counts those
//! records over a rolling lookback, so it survives window resets and
//! restarts. When the count reaches the threshold the address is handed to
//! the [`BlockRegistry`]. The dependency only goes that way.
//!
//! Admission is a single DashMap entry update with no I/O. Only the denial
//! path touches the store.

use super::address::normalize_address;
use super::clock::Clock;
use super::maintenance::Maintenance;
use super::registry::{BlockRegistry, EscalationCause};
use crate::config::{RateLimitConfig, WindowConfig};
use crate::error::ShieldError;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Subscription tier attached to a request by upstream layers.
///
/// Insert it as a request extension; the middleware reads it. Unknown names
/// fall back to the default window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier(pub String);

impl Tier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allow {
        /// Requests left in the current window.
        remaining: u32,
    },
    Deny(Denial),
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// Tier-specific text for the client.
    pub message: String,
    /// Time until the current window closes.
    pub retry_after: Duration,
    /// This denial pushed the address over the violation threshold.
    pub escalated: bool,
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    resets_at: DateTime<Utc>,
    count: u32,
}

/// Outcome of the in-memory admission step.
enum Admission {
    Admitted { remaining: u32 },
    Exceeded { retry_after: Duration },
}

pub struct RateLimitEngine {
    counters: DashMap<String, WindowCounter>,
    default_window: WindowConfig,
    /// Keyed by upper-cased tier name.
    tiers: HashMap<String, WindowConfig>,
    config: RateLimitConfig,
    store: Arc<dyn RecordStore>,
    registry: Arc<BlockRegistry>,
    clock: Arc<dyn Clock>,
}

impl RateLimitEngine {
    pub fn new(
        config: RateLimitConfig,
        store: Arc<dyn RecordStore>,
        registry: Arc<BlockRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tiers = config
            .tiers
            .iter()
            .map(|(name, window)| (name.trim().to_ascii_uppercase(), window.clone()))
            .collect();

        Self {
            counters: DashMap::new(),
            default_window: config.default.clone(),
            tiers,
            config,
            store,
            registry,
            clock,
        }
    }

    /// Window applied for `tier`. Missing or unknown tiers get the default.
    pub fn window_for(&self, tier: Option<&str>) -> &WindowConfig {
        tier.and_then(|t| self.tiers.get(&t.trim().to_ascii_uppercase()))
            .unwrap_or(&self.default_window)
    }

    /// Count a request from `address` and decide whether to admit it.
    ///
    /// The address is normalised first, so counters and violations share a
    /// key with the blocklist.
    ///
    /// On denial a violation is recorded and, past the threshold, the
    /// address is escalated into a block. Store failures on that path are
    /// returned as [`ShieldError::Persistence`].
    pub async fn check(
        &self,
        address: &str,
        endpoint: &str,
        tier: Option<&str>,
    ) -> Result<RateDecision, ShieldError> {
        let address = normalize_address(address)
            .ok_or_else(|| ShieldError::InvalidInput("address is empty".into()))?;
        let address = address.as_str();
        let window = self.window_for(tier);
        let now = self.clock.now();

        let retry_after = match self.admit(address, window, now) {
            Admission::Admitted { remaining } => return Ok(RateDecision::Allow { remaining }),
            Admission::Exceeded { retry_after } => retry_after,
        };

        debug!(address = %address, endpoint = %endpoint, tier = ?tier, "Rate limit exceeded");

        let escalated = self.record_violation(address, endpoint, now).await?;

        Ok(RateDecision::Deny(Denial {
            message: window.message.clone(),
            retry_after,
            escalated,
        }))
    }

    fn admit(&self, address: &str, window: &WindowConfig, now: DateTime<Utc>) -> Admission {
        let mut counter = self
            .counters
            .entry(address.to_string())
            .or_insert(WindowCounter {
                resets_at: now + window.window(),
                count: 0,
            });

        if now >= counter.resets_at {
            counter.resets_at = now + window.window();
            counter.count = 0;
        }
        counter.count = counter.count.saturating_add(1);

        if counter.count > window.max {
            let retry_after = (counter.resets_at - now).to_std().unwrap_or_default();
            Admission::Exceeded { retry_after }
        } else {
            Admission::Admitted {
                remaining: window.max - counter.count,
            }
        }
    }

    /// Returns `true` if this violation escalated the address.
    async fn record_violation(
        &self,
        address: &str,
        endpoint: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ShieldError> {
        self.store
            .append_violation(address, endpoint, now)
            .await
            .map_err(|e| {
                error!(address = %address, error = %e, "Failed to record rate limit violation");
                ShieldError::Persistence(e)
            })?;

        let since = now - self.config.violation_lookback();
        let violations = self
            .store
            .count_violations(address, since)
            .await
            .map_err(|e| {
                error!(address = %address, error = %e, "Failed to count rate limit violations");
                ShieldError::Persistence(e)
            })?;

        if violations < self.config.violation_threshold {
            return Ok(false);
        }
        if self.registry.is_blocked(address) {
            debug!(address = %address, violations, "Address already blocked, not escalating");
            return Ok(false);
        }

        warn!(address = %address, violations, "Escalating repeated rate limit violations");
        self.registry
            .escalate(address, EscalationCause::RateLimitViolations)
            .await?;
        Ok(true)
    }

    /// Drop counters whose window has closed. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let before = self.counters.len();
        self.counters.retain(|_, c| c.resets_at > now);
        let removed = before.saturating_sub(self.counters.len());
        if removed > 0 {
            debug!(removed, "Expired rate limit windows dropped");
        }
        removed
    }

    /// Addresses that currently hold a window counter.
    pub fn tracked_addresses(&self) -> usize {
        self.counters.len()
    }

    /// Register the periodic counter cleanup.
    pub fn start_maintenance(self: &Arc<Self>, tasks: &mut Maintenance) {
        let engine = Arc::clone(self);
        tasks.spawn_periodic(
            "rate-limit-cleanup",
            self.config.counter_cleanup_interval(),
            move || {
                let engine = Arc::clone(&engine);
                async move {
                    engine.cleanup();
                }
            },
        );
    }
}

impl std::fmt::Debug for RateLimitEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitEngine")
            .field("tracked", &self.counters.len())
            .field("tiers", &self.tiers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
