//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Top-level config and server/database sections
//! - [`security`]: Blocklist, rate limit, notification and admin sections
//! - [`defaults`]: serde default functions
//! - [`validation`]: startup validation

mod defaults;
mod security;
mod types;
mod validation;

pub use security::{AdminConfig, BlocklistConfig, NotifyConfig, RateLimitConfig, WindowConfig};
pub use types::{Config, ConfigError, DatabaseConfig, LogFormat, ServerConfig, StoreBackend};
pub use validation::{ValidationError, validate};
