//! In-process record store.
//!
//! Keeps everything in DashMaps. Used by tests and by the `memory` database
//! backend. The store can be flipped into a failing mode where every call
//! returns [`StoreError::Unavailable`].

use super::{BlockFields, BlockRecord, RecordStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// A violation log entry: (endpoint, timestamp).
type ViolationEntry = (String, DateTime<Utc>);

#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: DashMap<String, BlockRecord>,
    failed_attempts: DashMap<String, Vec<DateTime<Utc>>>,
    violations: DashMap<String, Vec<ViolationEntry>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Current record for `address`, active or not.
    pub fn block_record(&self, address: &str) -> Option<BlockRecord> {
        self.blocks.get(address).map(|r| r.value().clone())
    }

    /// Number of records (active or not) held for any address.
    pub fn block_record_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total violations ever appended for `address`.
    pub fn violation_count(&self, address: &str) -> usize {
        self.violations.get(address).map_or(0, |v| v.len())
    }

    /// Write a record directly, bypassing the registry. Simulates an
    /// out-of-process writer.
    pub fn insert_record(&self, record: BlockRecord) {
        self.blocks.insert(record.address.clone(), record);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store in failing mode".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_active_blocks(&self, now: DateTime<Utc>) -> Result<Vec<BlockRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .blocks
            .iter()
            .filter(|r| r.is_active && !r.is_expired_at(now))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn find_expired_blocks(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<BlockRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .blocks
            .iter()
            .filter(|r| r.is_active && r.is_expired_at(now))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn upsert_block(
        &self,
        address: &str,
        fields: BlockFields,
    ) -> Result<BlockRecord, StoreError> {
        self.check_available()?;

        let mut entry = self
            .blocks
            .entry(address.to_string())
            .or_insert_with(|| BlockRecord {
                address: address.to_string(),
                reason: None,
                blocked_by: String::new(),
                created_at: fields.created_at,
                expires_at: None,
                is_active: false,
            });

        let record = entry.value_mut();
        if !record.is_active {
            record.created_at = fields.created_at;
        }
        record.reason = fields.reason;
        record.blocked_by = fields.blocked_by;
        record.expires_at = fields.expires_at;
        record.is_active = true;

        Ok(record.clone())
    }

    async fn deactivate_block(&self, address: &str) -> Result<bool, StoreError> {
        self.check_available()?;

        match self.blocks.get_mut(address) {
            Some(mut record) if record.is_active => {
                record.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_expired_block(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.check_available()?;

        match self.blocks.get_mut(address) {
            Some(mut record) if record.is_active && record.is_expired_at(now) => {
                record.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_failed_attempts(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self
            .failed_attempts
            .get(address)
            .map_or(0, |ts| ts.iter().filter(|t| **t >= since).count() as u64))
    }

    async fn append_failed_attempt(
        &self,
        address: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        self.failed_attempts
            .entry(address.to_string())
            .or_default()
            .push(at);
        Ok(())
    }

    async fn count_violations(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self
            .violations
            .get(address)
            .map_or(0, |v| v.iter().filter(|(_, t)| *t >= since).count() as u64))
    }

    async fn append_violation(
        &self,
        address: &str,
        endpoint: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        self.violations
            .entry(address.to_string())
            .or_default()
            .push((endpoint.to_string(), at));
        Ok(())
    }

    async fn list_active_blocks_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<BlockRecord>, StoreError> {
        self.check_available()?;

        let mut active: Vec<BlockRecord> = self
            .blocks
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.value().clone())
            .collect();
        active.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.address.cmp(&b.address))
        });

        let skip = (page.max(1) as usize - 1) * page_size as usize;
        Ok(active.into_iter().skip(skip).take(page_size as usize).collect())
    }
}
