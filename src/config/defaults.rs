//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use super::security::WindowConfig;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Server / Database Defaults
// =============================================================================

pub fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

pub fn default_database_path() -> String {
    "abuse-shield.db".to_string()
}

// =============================================================================
// Blocklist Defaults
// =============================================================================

pub fn default_resync_interval_secs() -> u64 {
    3600
}

pub fn default_sweep_interval_secs() -> u64 {
    600
}

pub fn default_failed_attempt_threshold() -> u64 {
    5
}

pub fn default_lookback_secs() -> u64 {
    86400
}

pub fn default_auto_block_secs() -> u64 {
    86400
}

// =============================================================================
// Rate Limit Defaults
// =============================================================================

pub const FIFTEEN_MINUTES_MS: u64 = 15 * 60 * 1000;

pub fn default_violation_threshold() -> u64 {
    3
}

pub fn default_counter_cleanup_secs() -> u64 {
    300
}

pub fn default_rate_limit_message() -> String {
    "Too many requests from this IP, please try again later.".to_string()
}

pub fn default_window() -> WindowConfig {
    WindowConfig {
        window_ms: FIFTEEN_MINUTES_MS,
        max: 100,
        message: default_rate_limit_message(),
    }
}

pub fn default_tiers() -> HashMap<String, WindowConfig> {
    let tier = |max: u32, message: &str| WindowConfig {
        window_ms: FIFTEEN_MINUTES_MS,
        max,
        message: message.to_string(),
    };

    HashMap::from([
        (
            "FREE".to_string(),
            tier(50, "Rate limit exceeded for free tier. Upgrade for higher limits."),
        ),
        (
            "BASIC".to_string(),
            tier(200, "Rate limit exceeded for basic tier."),
        ),
        (
            "PREMIUM".to_string(),
            tier(1000, "Rate limit exceeded for premium tier."),
        ),
    ])
}

// =============================================================================
// Notify Defaults
// =============================================================================

pub fn default_webhook_timeout_secs() -> u64 {
    5
}

pub fn default_webhook_max_per_second() -> u32 {
    10
}
