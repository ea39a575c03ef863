//! Blocklist, rate limiting, notification and admin configuration.

use super::defaults::*;
use chrono::TimeDelta;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Block registry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BlocklistConfig {
    /// Full cache resync period (default: 3600).
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    /// Expiry sweep period (default: 600).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Failed attempts within the lookback that trigger a block (default: 5).
    #[serde(default = "default_failed_attempt_threshold")]
    pub failed_attempt_threshold: u64,
    #[serde(default = "default_lookback_secs")]
    pub failed_attempt_lookback_secs: u64,
    /// Duration of automatic blocks (default: 24h).
    #[serde(default = "default_auto_block_secs")]
    pub auto_block_secs: u64,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: default_resync_interval_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            failed_attempt_threshold: default_failed_attempt_threshold(),
            failed_attempt_lookback_secs: default_lookback_secs(),
            auto_block_secs: default_auto_block_secs(),
        }
    }
}

impl BlocklistConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn failed_attempt_lookback(&self) -> TimeDelta {
        secs_delta(self.failed_attempt_lookback_secs)
    }

    pub fn auto_block_duration(&self) -> TimeDelta {
        secs_delta(self.auto_block_secs)
    }
}

/// A single fixed-window limit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WindowConfig {
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Requests admitted per window.
    pub max: u32,
    /// Text returned to clients that exceed the limit.
    #[serde(default = "default_rate_limit_message")]
    pub message: String,
}

impl WindowConfig {
    pub fn window(&self) -> TimeDelta {
        TimeDelta::milliseconds(i64::try_from(self.window_ms).unwrap_or(i64::MAX))
    }
}

/// Rate limit engine configuration.
///
/// ```toml
/// [rate_limit.default]
/// window_ms = 900000
/// max = 100
///
/// [rate_limit.tiers.FREE]
/// window_ms = 900000
/// max = 50
/// message = "Rate limit exceeded for free tier."
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Violations within the lookback that trigger a block (default: 3).
    #[serde(default = "default_violation_threshold")]
    pub violation_threshold: u64,
    #[serde(default = "default_lookback_secs")]
    pub violation_lookback_secs: u64,
    /// How often elapsed window counters are dropped (default: 300).
    #[serde(default = "default_counter_cleanup_secs")]
    pub counter_cleanup_secs: u64,
    /// Window used when no tier, or an unknown tier, is supplied.
    #[serde(default = "default_window")]
    pub default: WindowConfig,
    /// Named tier windows. Lookup is case-insensitive.
    #[serde(default = "default_tiers")]
    pub tiers: HashMap<String, WindowConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            violation_threshold: default_violation_threshold(),
            violation_lookback_secs: default_lookback_secs(),
            counter_cleanup_secs: default_counter_cleanup_secs(),
            default: default_window(),
            tiers: default_tiers(),
        }
    }
}

impl RateLimitConfig {
    pub fn violation_lookback(&self) -> TimeDelta {
        secs_delta(self.violation_lookback_secs)
    }

    pub fn counter_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.counter_cleanup_secs)
    }
}

/// Outbound notification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// POST target for notifications. Logging only when absent.
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
    /// Outbound webhook cap; 0 disables throttling (default: 10).
    #[serde(default = "default_webhook_max_per_second")]
    pub max_per_second: u32,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_webhook_timeout_secs(),
            max_per_second: default_webhook_max_per_second(),
        }
    }
}

/// Admin API configuration. The API is disabled without a token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    pub token: Option<String>,
}

/// Clamp to what `TimeDelta` can hold; validation rejects anything that large.
fn secs_delta(secs: u64) -> TimeDelta {
    TimeDelta::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)).unwrap_or(TimeDelta::MAX)
}
