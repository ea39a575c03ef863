//! Repository for blocklist records.

use super::{DbError, from_millis, to_millis};
use crate::store::{BlockFields, BlockRecord};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Raw row shape: (address, reason, blocked_by, created_at, expires_at, is_active).
type BlockRow = (String, Option<String>, String, i64, Option<i64>, bool);

fn into_record(row: BlockRow) -> Result<BlockRecord, DbError> {
    let (address, reason, blocked_by, created_at, expires_at, is_active) = row;
    Ok(BlockRecord {
        address,
        reason,
        blocked_by,
        created_at: from_millis(created_at)?,
        expires_at: expires_at.map(from_millis).transpose()?,
        is_active,
    })
}

fn into_records(rows: Vec<BlockRow>) -> Result<Vec<BlockRecord>, DbError> {
    rows.into_iter().map(into_record).collect()
}

/// Repository for block operations.
pub struct BlockRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BlockRepository<'a> {
    /// Create a new block repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or reactivate the block for `address`.
    ///
    /// An already-active block keeps its original `created_at`; reason, actor
    /// and expiry are overwritten.
    pub async fn upsert(
        &self,
        address: &str,
        fields: &BlockFields,
    ) -> Result<BlockRecord, DbError> {
        let row = sqlx::query_as::<_, BlockRow>(
            r#"
            INSERT INTO blocks (address, reason, blocked_by, created_at, expires_at, is_active)
            VALUES (?, ?, ?, ?, ?, 1)
            ON CONFLICT(address) DO UPDATE SET
                reason = excluded.reason,
                blocked_by = excluded.blocked_by,
                expires_at = excluded.expires_at,
                created_at = CASE WHEN blocks.is_active = 1
                                  THEN blocks.created_at
                                  ELSE excluded.created_at END,
                is_active = 1
            RETURNING address, reason, blocked_by, created_at, expires_at, is_active
            "#,
        )
        .bind(address)
        .bind(fields.reason.as_deref())
        .bind(&fields.blocked_by)
        .bind(to_millis(fields.created_at))
        .bind(fields.expires_at.map(to_millis))
        .fetch_one(self.pool)
        .await?;

        into_record(row)
    }

    /// Mark the block for `address` inactive.
    ///
    /// Returns `true` if an active record was changed.
    pub async fn deactivate(&self, address: &str) -> Result<bool, DbError> {
        let result =
            sqlx::query("UPDATE blocks SET is_active = 0 WHERE address = ? AND is_active = 1")
                .bind(address)
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark the block for `address` inactive only if it has lapsed at `now`.
    ///
    /// A block renewed after the expiry scan read it is left alone.
    pub async fn deactivate_expired(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE blocks SET is_active = 0
            WHERE address = ? AND is_active = 1
              AND expires_at IS NOT NULL AND expires_at <= ?
            "#,
        )
        .bind(address)
        .bind(to_millis(now))
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Fetch the record for `address`, active or not.
    pub async fn get(&self, address: &str) -> Result<Option<BlockRecord>, DbError> {
        let row = sqlx::query_as::<_, BlockRow>(
            r#"
            SELECT address, reason, blocked_by, created_at, expires_at, is_active
            FROM blocks
            WHERE address = ?
            "#,
        )
        .bind(address)
        .fetch_optional(self.pool)
        .await?;

        row.map(into_record).transpose()
    }

    /// Get all active blocks that have not yet expired at `now`.
    pub async fn find_active(&self, now: DateTime<Utc>) -> Result<Vec<BlockRecord>, DbError> {
        let rows = sqlx::query_as::<_, BlockRow>(
            r#"
            SELECT address, reason, blocked_by, created_at, expires_at, is_active
            FROM blocks
            WHERE is_active = 1 AND (expires_at IS NULL OR expires_at > ?)
            "#,
        )
        .bind(to_millis(now))
        .fetch_all(self.pool)
        .await?;

        into_records(rows)
    }

    /// Get active blocks whose expiry is at or before `now`.
    pub async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<BlockRecord>, DbError> {
        let rows = sqlx::query_as::<_, BlockRow>(
            r#"
            SELECT address, reason, blocked_by, created_at, expires_at, is_active
            FROM blocks
            WHERE is_active = 1 AND expires_at IS NOT NULL AND expires_at <= ?
            "#,
        )
        .bind(to_millis(now))
        .fetch_all(self.pool)
        .await?;

        into_records(rows)
    }

    /// One page of active blocks, newest first. `page` is 1-based.
    pub async fn list_active_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<BlockRecord>, DbError> {
        let limit = i64::from(page_size);
        let offset = i64::from(page.max(1) - 1) * limit;

        let rows = sqlx::query_as::<_, BlockRow>(
            r#"
            SELECT address, reason, blocked_by, created_at, expires_at, is_active
            FROM blocks
            WHERE is_active = 1
            ORDER BY created_at DESC, address ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        into_records(rows)
    }
}
