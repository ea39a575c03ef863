//! Prometheus metrics for the abuse shield.
//!
//! - `shield_requests_denied_total{reason}` - Requests rejected by the middleware
//! - `shield_blocks_total{source}` - Blocks applied (manual or system)
//! - `shield_unblocks_total` - Blocks lifted (manual or sweep)
//! - `shield_escalations_total{cause}` - Automatic escalations into a block
//! - `shield_background_failures_total{cycle}` - Contained resync/sweep failures
//! - `shield_notifications_failed_total` - Notifications that could not be delivered
//! - `shield_blocked_addresses` - Current blocklist cache size (gauge)
//!
//! Recording helpers are no-ops until [`init`] has run, so library users
//! and tests that never initialise metrics pay nothing.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

pub static REQUESTS_DENIED: OnceLock<IntCounterVec> = OnceLock::new();

pub static BLOCKS: OnceLock<IntCounterVec> = OnceLock::new();

pub static UNBLOCKS: OnceLock<IntCounter> = OnceLock::new();

pub static ESCALATIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Resync and sweep cycles skipped because the store failed.
pub static BACKGROUND_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

pub static NOTIFICATIONS_FAILED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

pub static BLOCKED_ADDRESSES: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if $metric.get().is_none() {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(
                                error = %e,
                                concat!("Failed to register metric ", stringify!($metric))
                            );
                        }
                        let _ = $metric.set(m);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        concat!("Failed to create metric ", stringify!($metric))
                    );
                }
            }
        };
    }

    register!(
        REQUESTS_DENIED,
        IntCounterVec::new(
            Opts::new(
                "shield_requests_denied_total",
                "Requests denied by the mitigation middleware"
            ),
            &["reason"]
        )
    );
    register!(
        BLOCKS,
        IntCounterVec::new(Opts::new("shield_blocks_total", "Blocks applied"), &["source"])
    );
    register!(UNBLOCKS, IntCounter::new("shield_unblocks_total", "Blocks lifted"));
    register!(
        ESCALATIONS,
        IntCounterVec::new(
            Opts::new("shield_escalations_total", "Automatic escalations into a block"),
            &["cause"]
        )
    );
    register!(
        BACKGROUND_FAILURES,
        IntCounterVec::new(
            Opts::new(
                "shield_background_failures_total",
                "Background cycles skipped after a store failure"
            ),
            &["cycle"]
        )
    );
    register!(
        NOTIFICATIONS_FAILED,
        IntCounter::new(
            "shield_notifications_failed_total",
            "Notifications that could not be delivered"
        )
    );
    register!(
        BLOCKED_ADDRESSES,
        IntGauge::new(
            "shield_blocked_addresses",
            "Addresses currently in the blocklist cache"
        )
    );
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recording helpers
// ============================================================================

#[inline]
pub fn record_denied(reason: &str) {
    if let Some(c) = REQUESTS_DENIED.get() {
        c.with_label_values(&[reason]).inc();
    }
}

#[inline]
pub fn record_block(source: &str) {
    if let Some(c) = BLOCKS.get() {
        c.with_label_values(&[source]).inc();
    }
}

#[inline]
pub fn record_unblock() {
    if let Some(c) = UNBLOCKS.get() {
        c.inc();
    }
}

#[inline]
pub fn record_escalation(cause: &str) {
    if let Some(c) = ESCALATIONS.get() {
        c.with_label_values(&[cause]).inc();
    }
}

#[inline]
pub fn record_background_failure(cycle: &str) {
    if let Some(c) = BACKGROUND_FAILURES.get() {
        c.with_label_values(&[cycle]).inc();
    }
}

#[inline]
pub fn record_notification_failure() {
    if let Some(c) = NOTIFICATIONS_FAILED.get() {
        c.inc();
    }
}

#[inline]
pub fn set_blocked_addresses(count: usize) {
    if let Some(g) = BLOCKED_ADDRESSES.get() {
        g.set(count as i64);
    }
}
