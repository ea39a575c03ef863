//! SQLite-backed record store.

use super::{BlockFields, BlockRecord, RecordStore, StoreError};
use crate::db::Database;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
impl RecordStore for Database {
    async fn find_active_blocks(&self, now: DateTime<Utc>) -> Result<Vec<BlockRecord>, StoreError> {
        Ok(self.blocks().find_active(now).await?)
    }

    async fn find_expired_blocks(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<BlockRecord>, StoreError> {
        Ok(self.blocks().find_expired(now).await?)
    }

    async fn upsert_block(
        &self,
        address: &str,
        fields: BlockFields,
    ) -> Result<BlockRecord, StoreError> {
        Ok(self.blocks().upsert(address, &fields).await?)
    }

    async fn deactivate_block(&self, address: &str) -> Result<bool, StoreError> {
        Ok(self.blocks().deactivate(address).await?)
    }

    async fn deactivate_expired_block(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.blocks().deactivate_expired(address, now).await?)
    }

    async fn count_failed_attempts(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self.events().count_failed_attempts(address, since).await?)
    }

    async fn append_failed_attempt(
        &self,
        address: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(self.events().append_failed_attempt(address, at).await?)
    }

    async fn count_violations(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self.events().count_violations(address, since).await?)
    }

    async fn append_violation(
        &self,
        address: &str,
        endpoint: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(self.events().append_violation(address, endpoint, at).await?)
    }

    async fn list_active_blocks_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<BlockRecord>, StoreError> {
        Ok(self.blocks().list_active_page(page, page_size).await?)
    }
}
