//! Repository for the append-only failed attempt and violation logs.

use super::{DbError, to_millis};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Repository for event log operations.
pub struct EventRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> EventRepository<'a> {
    /// Create a new event repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    // ========== Failed attempts ==========

    pub async fn append_failed_attempt(
        &self,
        address: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query("INSERT INTO failed_attempts (address, ts) VALUES (?, ?)")
            .bind(address)
            .bind(to_millis(at))
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Count failed attempts for `address` at or after `since`.
    pub async fn count_failed_attempts(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM failed_attempts WHERE address = ? AND ts >= ?")
                .bind(address)
                .bind(to_millis(since))
                .fetch_one(self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }

    // ========== Rate limit violations ==========

    pub async fn append_violation(
        &self,
        address: &str,
        endpoint: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query("INSERT INTO violations (address, endpoint, ts) VALUES (?, ?, ?)")
            .bind(address)
            .bind(endpoint)
            .bind(to_millis(at))
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Count violations for `address` at or after `since`.
    pub async fn count_violations(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM violations WHERE address = ? AND ts >= ?")
                .bind(address)
                .bind(to_millis(since))
                .fetch_one(self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }
}
