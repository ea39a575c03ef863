//! Record store boundary.
//!
//! The core never talks to a database directly. Everything it persists goes
//! through [`RecordStore`], which has two implementations:
//!
//! - [`Database`](crate::db::Database) (SQLite via sqlx) for production
//! - [`MemoryStore`] for tests and the `memory` backend

mod memory;
mod records;
mod sqlite;

pub use memory::MemoryStore;
pub use records::{BlockFields, BlockRecord};

use crate::db::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by a record store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence operations required by the block registry and rate limiter.
///
/// Implementations must make `upsert_block` atomic per address; no locking
/// across calls is done by the callers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Active blocks that have not expired at `now`.
    async fn find_active_blocks(&self, now: DateTime<Utc>) -> Result<Vec<BlockRecord>, StoreError>;

    /// Active blocks whose expiry is at or before `now`.
    async fn find_expired_blocks(&self, now: DateTime<Utc>)
    -> Result<Vec<BlockRecord>, StoreError>;

    async fn upsert_block(&self, address: &str, fields: BlockFields)
    -> Result<BlockRecord, StoreError>;

    /// Returns `true` if an active record was deactivated.
    async fn deactivate_block(&self, address: &str) -> Result<bool, StoreError>;

    /// Deactivate only if the active record has an expiry at or before `now`.
    ///
    /// Returns `false` when the block was renewed or lifted in the meantime.
    async fn deactivate_expired_block(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn count_failed_attempts(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn append_failed_attempt(&self, address: &str, at: DateTime<Utc>)
    -> Result<(), StoreError>;

    async fn count_violations(&self, address: &str, since: DateTime<Utc>)
    -> Result<u64, StoreError>;

    async fn append_violation(
        &self,
        address: &str,
        endpoint: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Active blocks, newest first. `page` is 1-based.
    async fn list_active_blocks_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<BlockRecord>, StoreError>;
}
