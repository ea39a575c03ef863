//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use super::security::WindowConfig;
use std::path::Path;
use thiserror::Error;

/// Longest duration any interval, lookback or window may be configured to.
const MAX_DURATION_SECS: u64 = 10 * 365 * 86400;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}.window_ms must be greater than zero")]
    ZeroWindow(String),
    #[error("{0}.max must be greater than zero")]
    ZeroMax(String),
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
    #[error("{0} exceeds the maximum of ten years")]
    DurationTooLong(String),
    #[error("rate_limit.tiers contains an empty tier name")]
    EmptyTierName,
    #[error("notify.webhook_url must start with http:// or https://, got '{0}'")]
    InvalidWebhookUrl(String),
    #[error("admin.token must not be empty")]
    EmptyAdminToken,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Blocklist timings and thresholds
    let bl = &config.blocklist;
    for (name, value) in [
        ("blocklist.resync_interval_secs", bl.resync_interval_secs),
        ("blocklist.sweep_interval_secs", bl.sweep_interval_secs),
        ("blocklist.failed_attempt_threshold", bl.failed_attempt_threshold),
        ("blocklist.failed_attempt_lookback_secs", bl.failed_attempt_lookback_secs),
        ("blocklist.auto_block_secs", bl.auto_block_secs),
    ] {
        check_duration(&mut errors, name, value);
    }

    // Rate limiting
    let rl = &config.rate_limit;
    for (name, value) in [
        ("rate_limit.violation_threshold", rl.violation_threshold),
        ("rate_limit.violation_lookback_secs", rl.violation_lookback_secs),
        ("rate_limit.counter_cleanup_secs", rl.counter_cleanup_secs),
    ] {
        check_duration(&mut errors, name, value);
    }
    check_window(&mut errors, "rate_limit.default", &rl.default);
    for (tier, window) in &rl.tiers {
        if tier.trim().is_empty() {
            errors.push(ValidationError::EmptyTierName);
            continue;
        }
        check_window(&mut errors, &format!("rate_limit.tiers.{tier}"), window);
    }

    // Notifications
    if let Some(url) = &config.notify.webhook_url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        errors.push(ValidationError::InvalidWebhookUrl(url.clone()));
    }
    if config.notify.webhook_url.is_some() && config.notify.timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("notify.timeout_secs"));
    }

    if let Some(token) = &config.admin.token
        && token.trim().is_empty()
    {
        errors.push(ValidationError::EmptyAdminToken);
    }

    // Database path validation
    let db_path = Path::new(&config.database.path);
    if config.database.path != ":memory:"
        && let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        errors.push(ValidationError::DatabasePathInvalid(config.database.path.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_duration(errors: &mut Vec<ValidationError>, name: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::ZeroValue(name));
    } else if value > MAX_DURATION_SECS {
        errors.push(ValidationError::DurationTooLong(name.to_string()));
    }
}

fn check_window(errors: &mut Vec<ValidationError>, name: &str, window: &WindowConfig) {
    if window.window_ms == 0 {
        errors.push(ValidationError::ZeroWindow(name.to_string()));
    } else if window.window_ms / 1000 > MAX_DURATION_SECS {
        errors.push(ValidationError::DurationTooLong(format!("{name}.window_ms")));
    }
    if window.max == 0 {
        errors.push(ValidationError::ZeroMax(name.to_string()));
    }
}
