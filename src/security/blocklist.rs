//! In-memory blocklist cache for request-time block checks.
//!
//! The cache is the fast path for every inbound request: a lookup is a single
//! DashSet probe with no I/O and no global lock.
//!
//! # Architecture
//!
//! - Loaded from the record store on startup
//! - Written through synchronously on every successful block/unblock
//! - Replaced wholesale by the periodic resync
//! - Never the source of truth; always rebuildable from the store
//!
//! Mutations are serialised by a small mutex so that a resync which read the
//! store before a concurrent block/unblock can detect that and stand down
//! instead of overwriting the newer write. Readers never take that mutex.

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Outcome of a resync attempt against the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Cache now mirrors the snapshot.
    Replaced { added: usize, removed: usize },
    /// A write-through happened while the snapshot was being read; the cache
    /// was left alone and the next cycle will pick the change up.
    Stale,
}

#[derive(Debug, Default)]
pub struct BlocklistCache {
    addresses: DashSet<String>,
    last_synced_at: RwLock<Option<DateTime<Utc>>>,
    /// Bumped on every write-through mutation.
    epoch: AtomicU64,
    write_lock: Mutex<()>,
}

impl BlocklistCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// O(1) membership check.
    #[inline]
    pub fn contains(&self, address: &str) -> bool {
        self.addresses.contains(address)
    }

    /// Add an address. Returns `true` if it was not already present.
    pub fn insert(&self, address: &str) -> bool {
        let _guard = self.write_lock.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.addresses.insert(address.to_string())
    }

    /// Remove an address. Returns `true` if it was present.
    pub fn remove(&self, address: &str) -> bool {
        let _guard = self.write_lock.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.addresses.remove(address).is_some()
    }

    /// Current mutation epoch. Take this before reading a snapshot from the
    /// store and hand it back to [`replace_if_unchanged`](Self::replace_if_unchanged).
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Replace the contents with `snapshot`, unless a write-through happened
    /// since `epoch` was taken.
    ///
    /// Entries are diffed in place rather than cleared, so concurrent readers
    /// never observe an empty set mid-replace.
    pub fn replace_if_unchanged<I>(
        &self,
        epoch: u64,
        snapshot: I,
        at: DateTime<Utc>,
    ) -> ReplaceOutcome
    where
        I: IntoIterator<Item = String>,
    {
        let _guard = self.write_lock.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Blocklist changed during resync read, keeping current cache");
            return ReplaceOutcome::Stale;
        }

        let fresh: HashSet<String> = snapshot.into_iter().collect();

        let stale: Vec<String> = self
            .addresses
            .iter()
            .filter(|a| !fresh.contains(a.key()))
            .map(|a| a.key().clone())
            .collect();
        for address in &stale {
            self.addresses.remove(address);
        }

        let mut added = 0;
        for address in fresh {
            if self.addresses.insert(address) {
                added += 1;
            }
        }

        *self.last_synced_at.write() = Some(at);

        ReplaceOutcome::Replaced {
            added,
            removed: stale.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        *self.last_synced_at.read()
    }
}
