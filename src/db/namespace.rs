//! Per-channel storage namespaces and their provisioning.
//!
//! A namespace is the isolated storage scope for one channel: a messages
//! table, one config record, and one retention policy. Provisioning is
//! idempotent under race: `CREATE .. IF NOT EXISTS` and `INSERT OR IGNORE`
//! make the backend's own existence checks the source of truth, so two
//! concurrent provisioners converge on the same namespace without conflicts.

use super::channel_config::ChannelConfig;
use super::{ConfigStore, Database, MessageArchive, StoreError};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Normalize a channel name: trimmed, lowercase, no leading `#`.
pub fn normalize_channel(name: &str) -> String {
    name.trim().trim_start_matches('#').to_lowercase()
}

/// Derive the namespace slug from a normalized channel name.
///
/// The slug is interpolated into DDL statements, so its alphabet is a hard
/// `[a-z0-9_]` invariant. `[a-z0-9]` passes through; every other character
/// (including `_` itself) is escaped as `_xx` per UTF-8 byte, lowercase hex.
/// `_` always introduces an escape, so the mapping is injective: distinct
/// normalized names can never share a namespace.
fn slug_for(normalized: &str) -> String {
    let mut slug = String::with_capacity(normalized.len());
    for c in normalized.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                slug.push('_');
                slug.push_str(&format!("{byte:02x}"));
            }
        }
    }
    slug
}

/// The isolated storage scope for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNamespace {
    channel: String,
    slug: String,
}

impl ChannelNamespace {
    pub(crate) fn new(channel: String) -> Self {
        let slug = slug_for(&channel);
        Self { channel, slug }
    }

    /// Normalized channel name this namespace belongs to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Deterministic namespace identifier.
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Name of this namespace's messages table.
    pub(crate) fn messages_table(&self) -> String {
        format!("messages_{}", self.slug)
    }

    /// Name of this namespace's timestamp index.
    pub(crate) fn timestamp_index(&self) -> String {
        format!("idx_messages_{}_nanotime", self.slug)
    }
}

/// Lazily provisions per-channel namespaces and caches their handles.
///
/// The cache is keyed by normalized channel name and never evicted; it is
/// bounded by the number of distinct channels seen over the process lifetime.
pub struct Provisioner {
    db: Database,
    cache: DashMap<String, Arc<ChannelNamespace>>,
    default_retention_days: u32,
}

impl Provisioner {
    /// Create a provisioner. `default_retention_days` seeds the config record
    /// and retention policy of newly provisioned channels.
    pub fn new(db: Database, default_retention_days: u32) -> Self {
        Self {
            db,
            cache: DashMap::new(),
            default_retention_days,
        }
    }

    /// Shared database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Get the message archive backed by this provisioner.
    pub fn archive(&self) -> MessageArchive<'_> {
        MessageArchive::new(self)
    }

    /// Get the configuration store backed by this provisioner.
    pub fn config_store(&self) -> ConfigStore<'_> {
        ConfigStore::new(self)
    }

    /// Resolve the namespace for a channel, provisioning it on first use.
    ///
    /// The cached path does no I/O.
    pub async fn namespace(&self, channel: &str) -> Result<Arc<ChannelNamespace>, StoreError> {
        let name = normalize_channel(channel);

        if let Some(ns) = self.cache.get(&name) {
            return Ok(Arc::clone(&ns));
        }

        let ns = Arc::new(ChannelNamespace::new(name.clone()));
        self.provision(&ns).await?;

        // Two tasks can race past the cache miss; both provisioned
        // idempotently, so converge on whichever entry landed first.
        let ns = Arc::clone(&self.cache.entry(name).or_insert(ns));
        Ok(ns)
    }

    /// Create the namespace structures if absent and reconcile retention
    /// state. Safe to run concurrently for the same channel.
    async fn provision(&self, ns: &ChannelNamespace) -> Result<(), StoreError> {
        let pool = self.db.pool()?;
        let table = ns.messages_table();

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                message_id TEXT PRIMARY KEY,
                sender TEXT NOT NULL,
                body TEXT NOT NULL,
                nanotime INTEGER NOT NULL,
                user_id TEXT,
                is_mod INTEGER NOT NULL DEFAULT 0,
                is_subscriber INTEGER NOT NULL DEFAULT 0
            )
            "#
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table}(nanotime)",
            ns.timestamp_index()
        ))
        .execute(pool)
        .await?;

        let defaults = ChannelConfig::with_defaults(ns.channel(), self.default_retention_days);
        let created = sqlx::query(
            r#"
            INSERT OR IGNORE INTO channel_config
                (channel, enabled_commands, custom_commands, message_retention_days,
                 auto_mod_settings, welcome_message)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ns.channel())
        .bind(defaults.enabled_commands_json()?)
        .bind(defaults.custom_commands_json()?)
        .bind(defaults.message_retention_days as i64)
        .bind(defaults.auto_mod_settings_json()?)
        .bind(&defaults.welcome_message)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO retention_policies (namespace, channel, retention_days, applied_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(ns.slug())
        .bind(ns.channel())
        .bind(defaults.message_retention_days as i64)
        .bind(Utc::now().timestamp())
        .execute(pool)
        .await?;

        if created.rows_affected() > 0 {
            info!(channel = %ns.channel(), slug = %ns.slug(), "Provisioned channel namespace");
        } else {
            // Pre-existing namespace: repair pass. A crash between a config
            // update and the policy rewrite can leave the policy stale.
            self.reconcile_retention(ns).await?;
        }

        Ok(())
    }

    /// Re-derive the retention policy from the config record when they
    /// disagree.
    pub(crate) async fn reconcile_retention(&self, ns: &ChannelNamespace) -> Result<(), StoreError> {
        let pool = self.db.pool()?;

        let configured: Option<i64> = sqlx::query_scalar(
            "SELECT message_retention_days FROM channel_config WHERE channel = ?",
        )
        .bind(ns.channel())
        .fetch_optional(pool)
        .await?;

        let Some(configured) = configured else {
            return Ok(());
        };

        let applied: Option<i64> =
            sqlx::query_scalar("SELECT retention_days FROM retention_policies WHERE namespace = ?")
                .bind(ns.slug())
                .fetch_optional(pool)
                .await?;

        if applied != Some(configured) {
            warn!(
                channel = %ns.channel(),
                configured,
                applied = ?applied,
                "Retention policy out of sync with config, re-deriving"
            );
            replace_retention_policy(&self.db, ns, configured).await?;
        }

        Ok(())
    }
}

/// Drop and re-register a namespace's retention policy.
///
/// Policy definitions are immutable: a window change replaces the row rather
/// than updating it in place.
pub(crate) async fn replace_retention_policy(
    db: &Database,
    ns: &ChannelNamespace,
    retention_days: i64,
) -> Result<(), StoreError> {
    let pool = db.pool()?;

    sqlx::query("DELETE FROM retention_policies WHERE namespace = ?")
        .bind(ns.slug())
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO retention_policies (namespace, channel, retention_days, applied_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(ns.slug())
    .bind(ns.channel())
    .bind(retention_days)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_channel() {
        assert_eq!(normalize_channel("#TestStream"), "teststream");
        assert_eq!(normalize_channel("  #Foo "), "foo");
        assert_eq!(normalize_channel("already_lower"), "already_lower");
        assert_eq!(normalize_channel("##double"), "double");
    }

    #[test]
    fn test_slug_escapes_reserved_characters() {
        assert_eq!(slug_for("teststream"), "teststream");
        assert_eq!(slug_for("chan-name.0"), "chan_2dname_2e0");
        assert_eq!(slug_for("a_b"), "a_5fb");
        assert_eq!(slug_for("a b'c\"d"), "a_20b_27c_22d");

        // Multi-byte characters escape per UTF-8 byte.
        assert_eq!(slug_for("café"), "caf_c3_a9");
    }

    #[test]
    fn test_slug_is_injective_for_similar_names() {
        let slugs = [
            slug_for("a-b"),
            slug_for("a.b"),
            slug_for("a_b"),
            slug_for("a b"),
            slug_for("ab"),
        ];
        for (i, a) in slugs.iter().enumerate() {
            for b in &slugs[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_namespace_identity_is_deterministic() {
        let a = ChannelNamespace::new(normalize_channel("#Foo"));
        let b = ChannelNamespace::new(normalize_channel("foo"));
        assert_eq!(a, b);
        assert_eq!(a.messages_table(), "messages_foo");
    }
}
