//! Composition root for the mitigation core.
//!
//! A [`Shield`] is built exactly once at startup and shared as `Arc<Shield>`
//! with the middleware and the admin handlers. There is no global state.

use crate::config::{BlocklistConfig, Config, RateLimitConfig};
use crate::error::ShieldError;
use crate::notify::Notifier;
use crate::security::{BlockRegistry, Clock, Maintenance, RateLimitEngine, RegistryStats};
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

pub struct Shield {
    pub registry: Arc<BlockRegistry>,
    pub rate_limiter: Arc<RateLimitEngine>,
    clock: Arc<dyn Clock>,
    admin_token: Option<String>,
}

/// Parameters for creating a new Shield.
pub struct ShieldParams<'a> {
    pub blocklist: &'a BlocklistConfig,
    pub rate_limit: &'a RateLimitConfig,
    /// Enables the admin API when set.
    pub admin_token: Option<String>,
    pub store: Arc<dyn RecordStore>,
    pub notifier: Notifier,
    pub clock: Arc<dyn Clock>,
}

impl<'a> ShieldParams<'a> {
    /// Params drawn from a loaded config.
    pub fn from_config(
        config: &'a Config,
        store: Arc<dyn RecordStore>,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            blocklist: &config.blocklist,
            rate_limit: &config.rate_limit,
            admin_token: config.admin.token.clone(),
            store,
            notifier,
            clock,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub blocklist: RegistryStats,
    pub rate_limit_tracked_addresses: usize,
}

impl Shield {
    /// Wire the registry and rate limiter together. The cache starts empty;
    /// call [`load`](Self::load) before serving.
    pub fn new(params: ShieldParams<'_>) -> Self {
        let ShieldParams {
            blocklist,
            rate_limit,
            admin_token,
            store,
            notifier,
            clock,
        } = params;

        let registry = Arc::new(BlockRegistry::new(
            Arc::clone(&store),
            notifier,
            Arc::clone(&clock),
            blocklist.clone(),
        ));

        let rate_limiter = Arc::new(RateLimitEngine::new(
            rate_limit.clone(),
            store,
            Arc::clone(&registry),
            Arc::clone(&clock),
        ));

        Self {
            registry,
            rate_limiter,
            clock,
            admin_token,
        }
    }

    /// Populate the blocklist cache from the store.
    pub async fn load(&self) -> Result<usize, ShieldError> {
        self.registry.load().await
    }

    /// Start the resync, sweep and counter cleanup cycles.
    ///
    /// The returned handle owns the tasks; dropping it stops them.
    pub fn start_maintenance(&self) -> Maintenance {
        let mut tasks = Maintenance::new();
        self.registry.start_maintenance(&mut tasks);
        self.rate_limiter.start_maintenance(&mut tasks);
        tasks
    }

    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            blocklist: self.registry.stats(),
            rate_limit_tracked_addresses: self.rate_limiter.tracked_addresses(),
        }
    }
}

impl std::fmt::Debug for Shield {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shield")
            .field("registry", &self.registry)
            .field("rate_limiter", &self.rate_limiter)
            .field("admin_enabled", &self.admin_token.is_some())
            .finish()
    }
}
