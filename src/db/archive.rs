//! Message archive: append-only persistence of chat messages into the
//! owning channel's namespace.
//!
//! Writes use nanosecond timestamps for precise ordering and are idempotent
//! on `message_id` (duplicate deliveries from the chat protocol are ignored).
//! Retention is enforced by [`MessageArchive::sweep_expired`], driven by the
//! scheduled maintenance task in `main.rs`.

use super::namespace::{ChannelNamespace, Provisioner, replace_retention_policy};
use super::StoreError;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

/// A chat message as observed from the event stream. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessageRecord {
    pub channel: String,
    pub user: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub message_id: Option<String>,
    pub is_mod: bool,
    pub is_subscriber: bool,
}

/// Archive over the provisioner's namespaces.
pub struct MessageArchive<'a> {
    provisioner: &'a Provisioner,
}

impl<'a> MessageArchive<'a> {
    /// Create a new message archive.
    pub fn new(provisioner: &'a Provisioner) -> Self {
        Self { provisioner }
    }

    /// Append one message to its channel's namespace, provisioning on first
    /// use. A failed append is surfaced to the caller; it must not terminate
    /// event processing.
    pub async fn append(&self, record: &ChatMessageRecord) -> Result<(), StoreError> {
        let ns = self.provisioner.namespace(&record.channel).await?;
        let pool = self.provisioner.database().pool()?;

        let message_id = record
            .message_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let nanotime = saturating_nanos(&record.timestamp);
        if record.timestamp.timestamp_nanos_opt().is_none() {
            warn!(
                channel = %ns.channel(),
                timestamp = %record.timestamp,
                nanotime,
                "Timestamp outside the nanosecond range, saturating"
            );
        }

        sqlx::query(&format!(
            r#"
            INSERT OR IGNORE INTO {}
                (message_id, sender, body, nanotime, user_id, is_mod, is_subscriber)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            ns.messages_table()
        ))
        .bind(&message_id)
        .bind(&record.user)
        .bind(&record.text)
        .bind(nanotime)
        .bind(&record.user_id)
        .bind(record.is_mod)
        .bind(record.is_subscriber)
        .execute(pool)
        .await
        .map_err(|e| {
            error!(channel = %ns.channel(), error = %e, "Failed to insert message");
            StoreError::Write {
                channel: ns.channel().to_string(),
                source: e,
            }
        })?;

        Ok(())
    }

    /// All messages in a channel's namespace, in arrival order.
    pub async fn messages(&self, channel: &str) -> Result<Vec<ChatMessageRecord>, StoreError> {
        let ns = self.provisioner.namespace(channel).await?;
        let pool = self.provisioner.database().pool()?;

        let rows = sqlx::query_as::<_, (String, String, String, i64, Option<String>, bool, bool)>(
            &format!(
                r#"
                SELECT message_id, sender, body, nanotime, user_id, is_mod, is_subscriber
                FROM {}
                ORDER BY nanotime ASC, rowid ASC
                "#,
                ns.messages_table()
            ),
        )
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(message_id, sender, body, nanotime, user_id, is_mod, is_subscriber)| {
                    ChatMessageRecord {
                        channel: ns.channel().to_string(),
                        user: sender,
                        text: body,
                        timestamp: timestamp_from_nanos(nanotime),
                        user_id,
                        message_id: Some(message_id),
                        is_mod,
                        is_subscriber,
                    }
                },
            )
            .collect())
    }

    /// Number of archived messages in a channel's namespace.
    pub async fn message_count(&self, channel: &str) -> Result<i64, StoreError> {
        let ns = self.provisioner.namespace(channel).await?;
        let pool = self.provisioner.database().pool()?;

        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", ns.messages_table()))
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    /// Delete messages older than each namespace's retention window.
    ///
    /// `now` is injected so tests don't need real-time waits. Policies that
    /// drifted from their config record (a crash between the two-step
    /// retention update) are re-derived here before the delete.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let pool = self.provisioner.database().pool()?;

        let policies = sqlx::query_as::<_, (String, String, i64, Option<i64>)>(
            r#"
            SELECT p.namespace, p.channel, p.retention_days, c.message_retention_days
            FROM retention_policies p
            LEFT JOIN channel_config c ON c.channel = p.channel
            "#,
        )
        .fetch_all(pool)
        .await?;

        let now_nanos = saturating_nanos(&now);
        let mut removed = 0u64;

        for (_slug, channel, policy_days, config_days) in policies {
            let ns = ChannelNamespace::new(channel.clone());

            let retention_days = match config_days {
                Some(configured) if configured != policy_days => {
                    warn!(
                        channel = %channel,
                        configured,
                        applied = policy_days,
                        "Retention policy out of sync with config, re-deriving"
                    );
                    replace_retention_policy(self.provisioner.database(), &ns, configured).await?;
                    configured
                }
                Some(configured) => configured,
                None => policy_days,
            };

            let cutoff =
                now_nanos.saturating_sub(retention_days.saturating_mul(86_400_000_000_000));
            let result = sqlx::query(&format!(
                "DELETE FROM {} WHERE nanotime < ?",
                ns.messages_table()
            ))
            .bind(cutoff)
            .execute(pool)
            .await?;

            if result.rows_affected() > 0 {
                info!(
                    channel = %channel,
                    removed = result.rows_affected(),
                    retention_days,
                    "Expired messages removed"
                );
            }
            removed += result.rows_affected();
        }

        Ok(removed)
    }
}

/// Nanoseconds since the epoch, saturated at the representable bounds for
/// timestamps chrono cannot express in nanoseconds (before 1677 / after 2262).
fn saturating_nanos(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or_else(|| {
        if ts.timestamp() > 0 {
            i64::MAX
        } else {
            i64::MIN
        }
    })
}

/// Convert stored nanoseconds back to a UTC timestamp.
fn timestamp_from_nanos(nanotime: i64) -> DateTime<Utc> {
    let secs = nanotime.div_euclid(1_000_000_000);
    let nanos = nanotime.rem_euclid(1_000_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_nanos_round_trip() {
        let ts = DateTime::<Utc>::from_timestamp(1_700_000_000, 123_456_789)
            .expect("valid timestamp");
        let nanos = ts.timestamp_nanos_opt().expect("in range");
        assert_eq!(timestamp_from_nanos(nanos), ts);
    }

    #[test]
    fn test_out_of_range_timestamps_saturate() {
        // Year 9999 is beyond the nanosecond range; it must not collapse to
        // the epoch (which would make the message instantly sweep-eligible).
        let far_future =
            DateTime::<Utc>::from_timestamp(253_402_300_799, 0).expect("valid timestamp");
        assert!(far_future.timestamp_nanos_opt().is_none());
        assert_eq!(saturating_nanos(&far_future), i64::MAX);

        let far_past =
            DateTime::<Utc>::from_timestamp(-20_000_000_000, 0).expect("valid timestamp");
        assert!(far_past.timestamp_nanos_opt().is_none());
        assert_eq!(saturating_nanos(&far_past), i64::MIN);
    }
}
