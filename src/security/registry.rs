//! Block registry: the single authority on whether an address is blocked.
//!
//! # Architecture
//!
//! ```text
//!   is_blocked ──► BlocklistCache (DashSet, no I/O)
//!
//!   block/unblock ──► RecordStore ──► BlocklistCache ──► Notifier
//!                       (persist)      (write-through)    (best-effort)
//!
//!   resync (hourly)   ──► RecordStore::find_active_blocks ──► cache replace
//!   sweep (10 min)    ──► RecordStore::find_expired_blocks ──► expire each
//! ```
//!
//! The sweep only lifts a block if the store still sees it as lapsed, so a
//! block renewed between the scan and the write stays in force.
//!
//! Store failures during block/unblock are returned to the caller and leave
//! the cache untouched. Store failures in the background cycles are logged,
//! counted and otherwise ignored; the current cache stays authoritative.

use super::address::normalize_address;
use super::blocklist::{BlocklistCache, ReplaceOutcome};
use super::clock::Clock;
use super::maintenance::Maintenance;
use crate::config::BlocklistConfig;
use crate::error::ShieldError;
use crate::metrics;
use crate::notify::{Notification, Notifier, NotifyKind};
use crate::store::{BlockFields, BlockRecord, RecordStore, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Actor recorded on blocks the service applies by itself.
pub const SYSTEM_ACTOR: &str = "system";

/// Largest page the admin listing will return.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Why an address was escalated into a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationCause {
    FailedAttempts,
    RateLimitViolations,
}

impl EscalationCause {
    /// Get a static label for metrics and notification details.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FailedAttempts => "failed_attempts",
            Self::RateLimitViolations => "rate_limit_violations",
        }
    }

    /// Reason stored on the resulting block record.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::FailedAttempts => "automatic: repeated failed attempts",
            Self::RateLimitViolations => "automatic: repeated rate-limit violations",
        }
    }
}

/// Snapshot of the cache for health reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub blocked: usize,
    pub last_synced_at: Option<DateTime<Utc>>,
}

pub struct BlockRegistry {
    store: Arc<dyn RecordStore>,
    cache: BlocklistCache,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    config: BlocklistConfig,
}

impl BlockRegistry {
    /// Create a registry with an empty cache. Call [`load`](Self::load)
    /// before serving traffic.
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
        config: BlocklistConfig,
    ) -> Self {
        Self {
            store,
            cache: BlocklistCache::new(),
            notifier,
            clock,
            config,
        }
    }

    /// Populate the cache from the store. Returns the number of blocked addresses.
    pub async fn load(&self) -> Result<usize, ShieldError> {
        self.resync().await?;
        info!(count = self.cache.len(), "Blocklist cache loaded");
        Ok(self.cache.len())
    }

    /// O(1) cache lookup. Never touches the store.
    pub fn is_blocked(&self, address: &str) -> bool {
        normalize_address(address).is_some_and(|a| self.cache.contains(&a))
    }

    /// Block `address`, or update the reason/expiry of an existing block.
    pub async fn block(
        &self,
        address: &str,
        actor: &str,
        reason: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<BlockRecord, ShieldError> {
        self.apply_block(address, actor, reason, expires_at, None).await
    }

    /// Lift the block on `address`.
    ///
    /// Returns `false` (and sends nothing) if the address was not blocked.
    pub async fn unblock(&self, address: &str) -> Result<bool, ShieldError> {
        let address = required_address(address)?;

        let deactivated = self
            .store
            .deactivate_block(&address)
            .await
            .map_err(|e| persistence_failure(&address, "unblock", e))?;
        let was_cached = self.cache.remove(&address);

        if !deactivated && !was_cached {
            debug!(address = %address, "Unblock requested for address that is not blocked");
            return Ok(false);
        }

        info!(address = %address, "Address unblocked");
        self.announce_unblock(address, json!({}));
        Ok(true)
    }

    /// Lift a lapsed block found by the sweep.
    ///
    /// Returns `false` if the store no longer sees the block as lapsed.
    async fn expire(&self, address: &str, now: DateTime<Utc>) -> Result<bool, ShieldError> {
        let lifted = self
            .store
            .deactivate_expired_block(address, now)
            .await
            .map_err(|e| persistence_failure(address, "expire", e))?;

        if !lifted {
            debug!(address = %address, "Block renewed before expiry, leaving it in place");
            return Ok(false);
        }

        self.cache.remove(address);
        info!(address = %address, "Expired block lifted");
        self.announce_unblock(address.to_string(), json!({ "expired": true }));
        Ok(true)
    }

    fn announce_unblock(&self, address: String, details: serde_json::Value) {
        metrics::record_unblock();
        metrics::set_blocked_addresses(self.cache.len());

        self.notifier.notify(Notification {
            kind: NotifyKind::Unblocked,
            address,
            details,
            timestamp: self.clock.now(),
        });
    }

    /// Log a failed attempt and escalate once the lookback threshold is hit.
    ///
    /// Returns `true` if this attempt caused a block.
    pub async fn record_failed_attempt(&self, address: &str) -> Result<bool, ShieldError> {
        let address = required_address(address)?;
        let now = self.clock.now();

        self.store
            .append_failed_attempt(&address, now)
            .await
            .map_err(|e| persistence_failure(&address, "record failed attempt", e))?;

        let since = now - self.config.failed_attempt_lookback();
        let count = self
            .store
            .count_failed_attempts(&address, since)
            .await
            .map_err(|e| persistence_failure(&address, "count failed attempts", e))?;

        debug!(address = %address, count, "Failed attempt recorded");

        if count >= self.config.failed_attempt_threshold {
            self.escalate(&address, EscalationCause::FailedAttempts).await?;
            return Ok(true);
        }

        Ok(false)
    }

    /// Apply an automatic, time-bound block on behalf of the system.
    pub async fn escalate(
        &self,
        address: &str,
        cause: EscalationCause,
    ) -> Result<BlockRecord, ShieldError> {
        let expires_at = self.clock.now() + self.config.auto_block_duration();
        let record = self
            .apply_block(
                address,
                SYSTEM_ACTOR,
                Some(cause.reason().to_string()),
                Some(expires_at),
                Some(cause),
            )
            .await?;

        metrics::record_escalation(cause.label());
        Ok(record)
    }

    async fn apply_block(
        &self,
        address: &str,
        actor: &str,
        reason: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        cause: Option<EscalationCause>,
    ) -> Result<BlockRecord, ShieldError> {
        let address = required_address(address)?;
        let now = self.clock.now();

        let fields = BlockFields {
            reason,
            blocked_by: actor.to_string(),
            created_at: now,
            expires_at,
        };

        let record = self
            .store
            .upsert_block(&address, fields)
            .await
            .map_err(|e| persistence_failure(&address, "block", e))?;

        self.cache.insert(&address);

        let source = if actor == SYSTEM_ACTOR { "system" } else { "manual" };
        metrics::record_block(source);
        metrics::set_blocked_addresses(self.cache.len());

        warn!(
            address = %address,
            actor = %actor,
            reason = record.reason.as_deref().unwrap_or(""),
            expires_at = ?record.expires_at,
            "Address blocked"
        );

        let (kind, details) = match cause {
            Some(cause) => (
                NotifyKind::Escalated,
                json!({
                    "cause": cause.label(),
                    "reason": record.reason,
                    "blockedBy": record.blocked_by,
                    "expiresAt": record.expires_at,
                }),
            ),
            None => (
                NotifyKind::Blocked,
                json!({
                    "reason": record.reason,
                    "blockedBy": record.blocked_by,
                    "expiresAt": record.expires_at,
                }),
            ),
        };

        self.notifier.notify(Notification {
            kind,
            address,
            details,
            timestamp: now,
        });

        Ok(record)
    }

    /// Rebuild the cache from the store's active, unexpired blocks.
    ///
    /// A snapshot overtaken by a concurrent block/unblock is read once more.
    /// A store failure leaves the cache as it was.
    pub async fn resync(&self) -> Result<ReplaceOutcome, ShieldError> {
        let outcome = self.resync_once().await?;
        if outcome != ReplaceOutcome::Stale {
            return Ok(outcome);
        }

        debug!("Blocklist changed during resync, reading again");
        let outcome = self.resync_once().await?;
        if outcome == ReplaceOutcome::Stale {
            warn!("Blocklist kept changing during resync, keeping current cache");
            metrics::record_background_failure("resync_stale");
        }
        Ok(outcome)
    }

    async fn resync_once(&self) -> Result<ReplaceOutcome, ShieldError> {
        let epoch = self.cache.epoch();
        let now = self.clock.now();

        let records = self
            .store
            .find_active_blocks(now)
            .await
            .map_err(ShieldError::TransientStore)?;

        let outcome = self
            .cache
            .replace_if_unchanged(epoch, records.into_iter().map(|r| r.address), now);

        if let ReplaceOutcome::Replaced { added, removed } = outcome {
            debug!(added, removed, total = self.cache.len(), "Blocklist resynced");
        }
        metrics::set_blocked_addresses(self.cache.len());

        Ok(outcome)
    }

    /// Unblock every active block whose expiry has passed.
    ///
    /// Returns how many blocks were lifted. Failures on individual addresses
    /// are logged and left for the next sweep.
    pub async fn sweep_expired(&self) -> Result<usize, ShieldError> {
        let now = self.clock.now();
        let expired = self
            .store
            .find_expired_blocks(now)
            .await
            .map_err(ShieldError::TransientStore)?;

        let mut lifted = 0;
        for record in expired {
            match self.expire(&record.address, now).await {
                Ok(true) => lifted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(address = %record.address, error = %e, "Failed to expire block");
                    metrics::record_background_failure("sweep");
                }
            }
        }

        if lifted > 0 {
            info!(lifted, "Expired blocks lifted");
        }
        Ok(lifted)
    }

    /// One page of active blocks, newest first. `page` is 1-based.
    pub async fn list_blocks(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<BlockRecord>, ShieldError> {
        self.store
            .list_active_blocks_page(page.max(1), page_size.clamp(1, MAX_PAGE_SIZE))
            .await
            .map_err(ShieldError::Persistence)
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            blocked: self.cache.len(),
            last_synced_at: self.cache.last_synced_at(),
        }
    }

    /// Register the resync and expiry sweep cycles.
    pub fn start_maintenance(self: &Arc<Self>, tasks: &mut Maintenance) {
        let registry = Arc::clone(self);
        tasks.spawn_periodic("blocklist-resync", self.config.resync_interval(), move || {
            let registry = Arc::clone(&registry);
            async move {
                if let Err(e) = registry.resync().await {
                    warn!(error = %e, "Blocklist resync failed, keeping current cache");
                    metrics::record_background_failure("resync");
                }
            }
        });

        let registry = Arc::clone(self);
        tasks.spawn_periodic("blocklist-sweep", self.config.sweep_interval(), move || {
            let registry = Arc::clone(&registry);
            async move {
                if let Err(e) = registry.sweep_expired().await {
                    warn!(error = %e, "Blocklist expiry sweep failed");
                    metrics::record_background_failure("sweep");
                }
            }
        });
    }
}

impl std::fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRegistry")
            .field("blocked", &self.cache.len())
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

fn required_address(address: &str) -> Result<String, ShieldError> {
    normalize_address(address).ok_or_else(|| ShieldError::InvalidInput("address is empty".into()))
}

fn persistence_failure(address: &str, op: &str, e: StoreError) -> ShieldError {
    error!(address = %address, op, error = %e, "Record store write failed");
    ShieldError::Persistence(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CollectingSink;
    use crate::security::clock::ManualClock;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{OnceLock, Weak};

    struct Harness {
        registry: BlockRegistry,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        sink: Arc<CollectingSink>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let sink = Arc::new(CollectingSink::new());
        let registry = BlockRegistry::new(
            store.clone(),
            Notifier::new().with_sink(sink.clone()),
            clock.clone(),
            BlocklistConfig::default(),
        );
        Harness {
            registry,
            store,
            clock,
            sink,
        }
    }

    #[tokio::test]
    async fn test_block_then_unblock() {
        let h = harness();

        h.registry
            .block("1.2.3.4", "admin", Some("abuse".into()), None)
            .await
            .unwrap();
        assert!(h.registry.is_blocked("1.2.3.4"));
        assert_eq!(h.sink.count(NotifyKind::Blocked), 1);

        assert!(h.registry.unblock("1.2.3.4").await.unwrap());
        assert!(!h.registry.is_blocked("1.2.3.4"));
        assert_eq!(h.sink.count(NotifyKind::Unblocked), 1);

        // Second unblock is a quiet no-op.
        assert!(!h.registry.unblock("1.2.3.4").await.unwrap());
        assert_eq!(h.sink.count(NotifyKind::Unblocked), 1);
    }

    #[tokio::test]
    async fn test_lookup_is_normalized() {
        let h = harness();

        h.registry
            .block("::ffff:10.0.0.1", "admin", None, None)
            .await
            .unwrap();
        assert!(h.registry.is_blocked("10.0.0.1"));
        assert!(h.registry.is_blocked(" 10.0.0.1 "));
        assert!(!h.registry.is_blocked(""));
    }

    #[tokio::test]
    async fn test_empty_address_rejected() {
        let h = harness();
        assert!(matches!(
            h.registry.block("  ", "admin", None, None).await,
            Err(ShieldError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_store_write_leaves_cache_alone() {
        let h = harness();
        h.store.set_failing(true);

        let result = h.registry.block("1.2.3.4", "admin", None, None).await;
        assert!(matches!(result, Err(ShieldError::Persistence(_))));
        assert!(!h.registry.is_blocked("1.2.3.4"));
        assert!(h.sink.received().is_empty());
    }

    #[tokio::test]
    async fn test_escalation_sets_system_actor_and_expiry() {
        let h = harness();
        let now = h.clock.now();

        let record = h
            .registry
            .escalate("1.2.3.4", EscalationCause::RateLimitViolations)
            .await
            .unwrap();

        assert_eq!(record.blocked_by, SYSTEM_ACTOR);
        assert_eq!(
            record.reason.as_deref(),
            Some("automatic: repeated rate-limit violations")
        );
        assert_eq!(record.expires_at, Some(now + TimeDelta::hours(24)));
        assert_eq!(h.sink.count(NotifyKind::Escalated), 1);
        assert_eq!(h.sink.count(NotifyKind::Blocked), 0);
    }

    #[tokio::test]
    async fn test_resync_failure_keeps_cache() {
        let h = harness();
        h.registry.block("1.2.3.4", "admin", None, None).await.unwrap();

        h.store.set_failing(true);
        assert!(matches!(
            h.registry.resync().await,
            Err(ShieldError::TransientStore(_))
        ));
        assert!(h.registry.is_blocked("1.2.3.4"));
    }

    #[tokio::test]
    async fn test_resync_picks_up_external_writes() {
        let h = harness();
        let now = h.clock.now();

        h.store.insert_record(BlockRecord {
            address: "9.9.9.9".to_string(),
            reason: None,
            blocked_by: "elsewhere".to_string(),
            created_at: now,
            expires_at: None,
            is_active: true,
        });
        assert!(!h.registry.is_blocked("9.9.9.9"));

        let outcome = h.registry.resync().await.unwrap();
        assert_eq!(outcome, ReplaceOutcome::Replaced { added: 1, removed: 0 });
        assert!(h.registry.is_blocked("9.9.9.9"));
        assert_eq!(h.registry.stats().last_synced_at, Some(now));
    }

    #[tokio::test]
    async fn test_list_blocks_clamps_page_size() {
        let h = harness();
        for i in 0..3 {
            h.registry
                .block(&format!("10.0.0.{i}"), "admin", None, None)
                .await
                .unwrap();
        }

        assert_eq!(h.registry.list_blocks(0, 0).await.unwrap().len(), 1);
        assert_eq!(h.registry.list_blocks(1, 10_000).await.unwrap().len(), 3);
    }

    /// Memory store that slips writes in right after the background cycles
    /// read from it.
    #[derive(Default)]
    struct InterleavingStore {
        inner: MemoryStore,
        registry: OnceLock<Weak<BlockRegistry>>,
        renew_after_expiry_scan: AtomicBool,
        writes_during_resync: AtomicU32,
    }

    #[async_trait]
    impl RecordStore for InterleavingStore {
        async fn find_active_blocks(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<BlockRecord>, StoreError> {
            let records = self.inner.find_active_blocks(now).await?;
            let pending = self.writes_during_resync.load(Ordering::SeqCst);
            if pending > 0 {
                self.writes_during_resync.store(pending - 1, Ordering::SeqCst);
                if let Some(registry) = self.registry.get().and_then(Weak::upgrade) {
                    registry.cache.insert("7.7.7.7");
                }
            }
            Ok(records)
        }

        async fn find_expired_blocks(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<BlockRecord>, StoreError> {
            let records = self.inner.find_expired_blocks(now).await?;
            if self.renew_after_expiry_scan.swap(false, Ordering::SeqCst) {
                for record in &records {
                    let renewal = BlockFields {
                        reason: Some("renewed".to_string()),
                        blocked_by: "admin".to_string(),
                        created_at: now,
                        expires_at: Some(now + TimeDelta::hours(24)),
                    };
                    self.inner.upsert_block(&record.address, renewal).await?;
                }
            }
            Ok(records)
        }

        async fn upsert_block(
            &self,
            address: &str,
            fields: BlockFields,
        ) -> Result<BlockRecord, StoreError> {
            self.inner.upsert_block(address, fields).await
        }

        async fn deactivate_block(&self, address: &str) -> Result<bool, StoreError> {
            self.inner.deactivate_block(address).await
        }

        async fn deactivate_expired_block(
            &self,
            address: &str,
            now: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            self.inner.deactivate_expired_block(address, now).await
        }

        async fn count_failed_attempts(
            &self,
            address: &str,
            since: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            self.inner.count_failed_attempts(address, since).await
        }

        async fn append_failed_attempt(
            &self,
            address: &str,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.append_failed_attempt(address, at).await
        }

        async fn count_violations(
            &self,
            address: &str,
            since: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            self.inner.count_violations(address, since).await
        }

        async fn append_violation(
            &self,
            address: &str,
            endpoint: &str,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.append_violation(address, endpoint, at).await
        }

        async fn list_active_blocks_page(
            &self,
            page: u32,
            page_size: u32,
        ) -> Result<Vec<BlockRecord>, StoreError> {
            self.inner.list_active_blocks_page(page, page_size).await
        }
    }

    fn interleaving() -> (
        Arc<BlockRegistry>,
        Arc<InterleavingStore>,
        Arc<ManualClock>,
        Arc<CollectingSink>,
    ) {
        let store = Arc::new(InterleavingStore::default());
        let clock = Arc::new(ManualClock::default());
        let sink = Arc::new(CollectingSink::new());
        let registry = Arc::new(BlockRegistry::new(
            store.clone(),
            Notifier::new().with_sink(sink.clone()),
            clock.clone(),
            BlocklistConfig::default(),
        ));
        let _ = store.registry.set(Arc::downgrade(&registry));
        (registry, store, clock, sink)
    }

    #[tokio::test]
    async fn test_sweep_keeps_block_renewed_after_scan() {
        let (registry, store, clock, sink) = interleaving();
        let expires_at = clock.now() + TimeDelta::minutes(5);
        registry
            .block("1.2.3.4", "admin", None, Some(expires_at))
            .await
            .unwrap();

        clock.advance(TimeDelta::minutes(6));
        store.renew_after_expiry_scan.store(true, Ordering::SeqCst);

        assert_eq!(registry.sweep_expired().await.unwrap(), 0);
        assert!(registry.is_blocked("1.2.3.4"));
        let record = store.inner.block_record("1.2.3.4").unwrap();
        assert!(record.is_active);
        assert_eq!(record.expires_at, Some(clock.now() + TimeDelta::hours(24)));
        assert_eq!(sink.count(NotifyKind::Unblocked), 0);

        // Once the renewal itself lapses the next sweep lifts it.
        clock.advance(TimeDelta::hours(25));
        assert_eq!(registry.sweep_expired().await.unwrap(), 1);
        assert!(!registry.is_blocked("1.2.3.4"));
        assert_eq!(sink.count(NotifyKind::Unblocked), 1);
    }

    #[tokio::test]
    async fn test_resync_reads_again_after_concurrent_write() {
        let (registry, store, clock, _) = interleaving();
        store.inner.insert_record(BlockRecord {
            address: "9.9.9.9".to_string(),
            reason: None,
            blocked_by: "elsewhere".to_string(),
            created_at: clock.now(),
            expires_at: None,
            is_active: true,
        });
        store.writes_during_resync.store(1, Ordering::SeqCst);

        let outcome = registry.resync().await.unwrap();
        assert_eq!(outcome, ReplaceOutcome::Replaced { added: 1, removed: 1 });
        assert!(registry.is_blocked("9.9.9.9"));
        assert!(!registry.is_blocked("7.7.7.7"));
    }

    #[tokio::test]
    async fn test_resync_stands_down_if_cache_keeps_changing() {
        let (registry, store, clock, _) = interleaving();
        store.inner.insert_record(BlockRecord {
            address: "9.9.9.9".to_string(),
            reason: None,
            blocked_by: "elsewhere".to_string(),
            created_at: clock.now(),
            expires_at: None,
            is_active: true,
        });
        store.writes_during_resync.store(2, Ordering::SeqCst);

        assert_eq!(registry.resync().await.unwrap(), ReplaceOutcome::Stale);
        assert!(!registry.is_blocked("9.9.9.9"));
        assert!(registry.is_blocked("7.7.7.7"));
    }
}
