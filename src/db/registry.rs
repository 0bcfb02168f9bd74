//! Channel registry: the shared table of channels this bot knows about.

use super::{Database, StoreError, normalize_channel};
use chrono::{DateTime, Utc};

/// A registered channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRow {
    /// Normalized name (lowercase, no leading `#`).
    pub name: String,
    /// When the channel was first registered (epoch seconds).
    pub joined_at: i64,
    /// Last observed activity (epoch seconds).
    pub last_activity: i64,
    /// False once the channel has been deactivated.
    pub is_active: bool,
}

/// Repository for channel registry operations.
///
/// Every operation checks for a live handle and fails with
/// [`StoreError::Unavailable`] when the database has been closed; retrying is
/// left to the caller.
pub struct ChannelRegistry<'a> {
    db: &'a Database,
}

impl<'a> ChannelRegistry<'a> {
    /// Create a new channel registry.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Register a channel. Idempotent: returns `false` without error when the
    /// channel already exists.
    pub async fn add_channel(&self, name: &str) -> Result<bool, StoreError> {
        let name = normalize_channel(name);
        let now = Utc::now().timestamp();

        // The uniqueness constraint on `name` is the arbiter under races:
        // a concurrent duplicate insert is ignored, not surfaced.
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO channels (name, joined_at, last_activity, is_active)
            VALUES (?, ?, ?, 1)
            "#,
        )
        .bind(&name)
        .bind(now)
        .bind(now)
        .execute(self.db.pool()?)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Find a channel by name.
    pub async fn get_channel(&self, name: &str) -> Result<Option<ChannelRow>, StoreError> {
        let name = normalize_channel(name);

        let row = sqlx::query_as::<_, (String, i64, i64, bool)>(
            r#"
            SELECT name, joined_at, last_activity, is_active
            FROM channels
            WHERE name = ?
            "#,
        )
        .bind(&name)
        .fetch_optional(self.db.pool()?)
        .await?;

        Ok(row.map(|(name, joined_at, last_activity, is_active)| ChannelRow {
            name,
            joined_at,
            last_activity,
            is_active,
        }))
    }

    /// Update a channel's last-activity timestamp. Returns `false` when the
    /// channel is absent.
    ///
    /// The write is unconditional on ordering: the event stream is processed
    /// sequentially, so no engine-side monotonic check is needed.
    pub async fn update_activity(
        &self,
        name: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let name = normalize_channel(name);

        let result = sqlx::query("UPDATE channels SET last_activity = ? WHERE name = ?")
            .bind(timestamp.timestamp())
            .bind(&name)
            .execute(self.db.pool()?)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List active channels with activity at or after `since`, sorted by name
    /// for deterministic output.
    pub async fn list_active(&self, since: DateTime<Utc>) -> Result<Vec<ChannelRow>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64, i64, bool)>(
            r#"
            SELECT name, joined_at, last_activity, is_active
            FROM channels
            WHERE is_active = 1 AND last_activity >= ?
            ORDER BY name ASC
            "#,
        )
        .bind(since.timestamp())
        .fetch_all(self.db.pool()?)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, joined_at, last_activity, is_active)| ChannelRow {
                name,
                joined_at,
                last_activity,
                is_active,
            })
            .collect())
    }

    /// Mark a channel inactive. The record is kept.
    pub async fn deactivate(&self, name: &str) -> Result<bool, StoreError> {
        let name = normalize_channel(name);

        let result = sqlx::query("UPDATE channels SET is_active = 0 WHERE name = ?")
            .bind(&name)
            .execute(self.db.pool()?)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a channel record entirely.
    pub async fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let name = normalize_channel(name);

        let result = sqlx::query("DELETE FROM channels WHERE name = ?")
            .bind(&name)
            .execute(self.db.pool()?)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
