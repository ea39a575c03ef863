//! Persistent record types shared by every store backend.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A blocklist entry for a single client address.
///
/// At most one record exists per address. Re-blocking overwrites the
/// reason, actor and expiry of the existing row instead of adding a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    pub address: String,
    pub reason: Option<String>,
    pub blocked_by: String,
    pub created_at: DateTime<Utc>,
    /// `None` = indefinite.
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl BlockRecord {
    /// Whether the block has lapsed at `now`. Indefinite blocks never lapse.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Fields written by an upsert.
#[derive(Debug, Clone)]
pub struct BlockFields {
    pub reason: Option<String>,
    pub blocked_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}
