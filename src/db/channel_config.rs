//! Per-channel configuration: enabled builtins, custom commands, retention,
//! moderation settings.
//!
//! Flexible fields (command sets, auto-mod settings) are stored as JSON text
//! so they can grow without schema migrations. One record per channel,
//! unique-indexed on `channel`; provisioning guarantees its existence.

use super::namespace::{Provisioner, replace_retention_policy};
use super::StoreError;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, warn};

/// Builtin commands enabled for newly provisioned channels.
pub const DEFAULT_ENABLED_COMMANDS: &[&str] = &[
    "!addcommand",
    "!commands",
    "!config",
    "!delcommand",
    "!setretention",
];

/// Retention window seeded when no default is configured.
pub(crate) const FALLBACK_RETENTION_DAYS: u32 = 30;

/// Bounds for `message_retention_days`.
const RETENTION_RANGE: std::ops::RangeInclusive<i64> = 1..=365;

/// One channel's configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Normalized channel name, matches the registry record.
    pub channel: String,
    /// Builtin command tokens enabled for this channel.
    pub enabled_commands: BTreeSet<String>,
    /// Custom command token -> response text. Keys are lowercase and
    /// `!`-prefixed.
    pub custom_commands: BTreeMap<String, String>,
    /// Message retention window in days, 1-365.
    pub message_retention_days: u32,
    /// Opaque moderation settings.
    pub auto_mod_settings: BTreeMap<String, String>,
    /// Greeting sent when the bot comes online in this channel.
    pub welcome_message: Option<String>,
}

impl ChannelConfig {
    /// Default configuration for a freshly provisioned channel.
    pub fn with_defaults(channel: &str, retention_days: u32) -> Self {
        let retention_days = if RETENTION_RANGE.contains(&(retention_days as i64)) {
            retention_days
        } else {
            FALLBACK_RETENTION_DAYS
        };
        Self {
            channel: channel.to_string(),
            enabled_commands: DEFAULT_ENABLED_COMMANDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            custom_commands: BTreeMap::new(),
            message_retention_days: retention_days,
            auto_mod_settings: BTreeMap::new(),
            welcome_message: None,
        }
    }

    pub(crate) fn enabled_commands_json(&self) -> Result<String, StoreError> {
        to_json(&self.enabled_commands)
    }

    pub(crate) fn custom_commands_json(&self) -> Result<String, StoreError> {
        to_json(&self.custom_commands)
    }

    pub(crate) fn auto_mod_settings_json(&self) -> Result<String, StoreError> {
        to_json(&self.auto_mod_settings)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|e| StoreError::Sqlx(sqlx::Error::Protocol(e.to_string())))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Sqlx(sqlx::Error::Protocol(e.to_string())))
}

/// Normalize a custom-command token: lowercase, `!`-prefixed.
pub fn normalize_token(token: &str) -> String {
    let token = token.trim().to_lowercase();
    if token.starts_with('!') {
        token
    } else {
        format!("!{token}")
    }
}

/// Store for channel configuration records.
pub struct ConfigStore<'a> {
    provisioner: &'a Provisioner,
}

impl<'a> ConfigStore<'a> {
    /// Create a new configuration store.
    pub fn new(provisioner: &'a Provisioner) -> Self {
        Self { provisioner }
    }

    /// Fetch a channel's configuration, provisioning the namespace lazily if
    /// a read races ahead of the first chat event.
    ///
    /// A missing record after provisioning is a defect: provisioning
    /// guarantees the row exists.
    pub async fn get_config(&self, channel: &str) -> Result<ChannelConfig, StoreError> {
        let ns = self.provisioner.namespace(channel).await?;
        let pool = self.provisioner.database().pool()?;

        let row = sqlx::query_as::<_, (String, String, i64, String, Option<String>)>(
            r#"
            SELECT enabled_commands, custom_commands, message_retention_days,
                   auto_mod_settings, welcome_message
            FROM channel_config
            WHERE channel = ?
            "#,
        )
        .bind(ns.channel())
        .fetch_optional(pool)
        .await?;

        let Some((enabled, custom, retention, auto_mod, welcome)) = row else {
            error!(channel = %ns.channel(), "Config record missing after provisioning");
            return Err(StoreError::ConfigMissing(ns.channel().to_string()));
        };

        let retention_days = if RETENTION_RANGE.contains(&retention) {
            retention as u32
        } else {
            let clamped = retention.clamp(*RETENTION_RANGE.start(), *RETENTION_RANGE.end());
            warn!(
                channel = %ns.channel(),
                stored = retention,
                clamped,
                "Stored retention out of range, clamping"
            );
            clamped as u32
        };

        Ok(ChannelConfig {
            channel: ns.channel().to_string(),
            enabled_commands: from_json(&enabled)?,
            custom_commands: from_json(&custom)?,
            message_retention_days: retention_days,
            auto_mod_settings: from_json(&auto_mod)?,
            welcome_message: welcome,
        })
    }

    /// Upsert a custom command. The token is normalized; an existing mapping
    /// is overwritten without error (last write wins). Returns the normalized
    /// token.
    pub async fn add_custom_command(
        &self,
        channel: &str,
        token: &str,
        response: &str,
    ) -> Result<String, StoreError> {
        let token = normalize_token(token);
        let mut config = self.get_config(channel).await?;
        config
            .custom_commands
            .insert(token.clone(), response.to_string());
        self.save_custom_commands(&config).await?;
        Ok(token)
    }

    /// Remove a custom command. Returns whether the token was present.
    pub async fn remove_custom_command(
        &self,
        channel: &str,
        token: &str,
    ) -> Result<bool, StoreError> {
        let token = normalize_token(token);
        let mut config = self.get_config(channel).await?;
        let removed = config.custom_commands.remove(&token).is_some();
        if removed {
            self.save_custom_commands(&config).await?;
        }
        Ok(removed)
    }

    async fn save_custom_commands(&self, config: &ChannelConfig) -> Result<(), StoreError> {
        let pool = self.provisioner.database().pool()?;
        sqlx::query("UPDATE channel_config SET custom_commands = ? WHERE channel = ?")
            .bind(config.custom_commands_json()?)
            .bind(&config.channel)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Set the retention window for a channel.
    ///
    /// Two steps, deliberately non-atomic (policy definitions are replaced,
    /// not altered): (a) update the config record, (b) drop and re-register
    /// the retention policy. A failure after (a) leaves a stale policy; the
    /// next sweep or provisioning pass re-derives it from config.
    pub async fn set_retention(&self, channel: &str, days: i64) -> Result<(), StoreError> {
        if !RETENTION_RANGE.contains(&days) {
            return Err(StoreError::RetentionOutOfRange(days));
        }

        let ns = self.provisioner.namespace(channel).await?;
        let pool = self.provisioner.database().pool()?;

        let result = sqlx::query(
            "UPDATE channel_config SET message_retention_days = ? WHERE channel = ?",
        )
        .bind(days)
        .bind(ns.channel())
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            error!(channel = %ns.channel(), "Config record missing after provisioning");
            return Err(StoreError::ConfigMissing(ns.channel().to_string()));
        }

        if let Err(e) = replace_retention_policy(self.provisioner.database(), &ns, days).await {
            warn!(
                channel = %ns.channel(),
                days,
                error = %e,
                "Retention policy rewrite failed after config update; expiry window is stale until the next sweep"
            );
            return Err(e);
        }

        Ok(())
    }

    /// All command tokens answerable in a channel: enabled builtins plus
    /// custom commands, lexicographically sorted.
    pub async fn list_commands(&self, channel: &str) -> Result<Vec<String>, StoreError> {
        let config = self.get_config(channel).await?;
        let mut tokens: BTreeSet<String> = config.enabled_commands;
        tokens.extend(config.custom_commands.into_keys());
        Ok(tokens.into_iter().collect())
    }
}
