//! Database module for persistent storage.
//!
//! Provides async SQLite database access using SQLx for:
//! - The channel registry (shared `channels` table)
//! - Per-channel message archives (`messages_<slug>` tables)
//! - Per-channel configuration and retention policies
//!
//! Per-channel tables are provisioned lazily by [`Provisioner`]; only the
//! shared tables are created at connect time.

mod archive;
mod channel_config;
mod namespace;
mod registry;

pub use archive::{ChatMessageRecord, MessageArchive};
pub use channel_config::{ChannelConfig, ConfigStore, DEFAULT_ENABLED_COMMANDS, normalize_token};
pub use namespace::{ChannelNamespace, Provisioner, normalize_channel};
pub use registry::{ChannelRegistry, ChannelRow};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("could not connect to database after {attempts} attempt(s): {source}")]
    Connection { attempts: u32, source: sqlx::Error },
    #[error("storage handle is closed")]
    Unavailable,
    #[error("message write failed for channel {channel}: {source}")]
    Write {
        channel: String,
        source: sqlx::Error,
    },
    #[error("retention days out of range: {0} (allowed 1-365)")]
    RetentionOutOfRange(i64),
    #[error("config record missing for channel: {0}")]
    ConfigMissing(String),
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Sqlx(err)
    }
}

/// Database handle with connection pool.
///
/// Cloning is cheap (pool-backed). The handle is created once in `main` and
/// passed by reference to every component; after [`Database::close`] all
/// operations fail with [`StoreError::Unavailable`].
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - prevents a hung backend from blocking the
    /// event loop indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connect to the database with bounded retry.
    ///
    /// Attempts up to `max_retries` times with a fixed `retry_delay` between
    /// attempts. Every successful open is probed with a liveness ping before
    /// the handle is returned; the terminal failure is fatal to the caller.
    pub async fn connect(
        path: &str,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<Self, StoreError> {
        let attempts = max_retries.max(1);
        let mut last_err: Option<sqlx::Error> = None;

        for attempt in 1..=attempts {
            match Self::open(path).await {
                Ok(db) => {
                    info!(path = %path, attempt, "Database connected");
                    return Ok(db);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Database connection attempt failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        info!(delay_secs = retry_delay.as_secs(), "Retrying database connection");
                        tokio::time::sleep(retry_delay).await;
                    }
                }
            }
        }

        let source = last_err.unwrap_or_else(|| {
            sqlx::Error::Io(std::io::Error::other("no connection attempt was made"))
        });
        error!(attempts, error = %source, "Failed to connect to database, giving up");
        Err(StoreError::Connection { attempts, source })
    }

    /// Open the pool, verify liveness and integrity, and create shared tables.
    async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let pool = if path == ":memory:" {
            // Use a uniquely named shared-cache memory database per call.
            // `file::memory:` is global-ish and will collide across parallel tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:chatkeeper-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        // Liveness probe - a handle is never returned without a verified
        // live backend.
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&pool)
            .await?;

        // WAL mode allows reads to happen while writes are in progress
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        // Check database integrity on startup (prevents silent corruption from crashes)
        let integrity_result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await?;

        if integrity_result != "ok" {
            error!(
                integrity_check = %integrity_result,
                "Database integrity check FAILED - corruption detected!"
            );
            return Err(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Database integrity check failed: {}", integrity_result),
            )));
        }

        Self::init_shared_schema(&pool).await?;

        Ok(Self { pool })
    }

    /// Create the shared tables. Per-channel tables are left to the
    /// provisioner.
    async fn init_shared_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                name TEXT PRIMARY KEY,
                joined_at INTEGER NOT NULL,
                last_activity INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channel_config (
                channel TEXT PRIMARY KEY,
                enabled_commands TEXT NOT NULL,
                custom_commands TEXT NOT NULL,
                message_retention_days INTEGER NOT NULL,
                auto_mod_settings TEXT NOT NULL,
                welcome_message TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS retention_policies (
                namespace TEXT PRIMARY KEY,
                channel TEXT NOT NULL,
                retention_days INTEGER NOT NULL,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        info!("Shared schema checked/applied");
        Ok(())
    }

    /// Get the pool, failing if the handle has been closed.
    pub fn pool(&self) -> Result<&SqlitePool, StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Unavailable);
        }
        Ok(&self.pool)
    }

    /// Liveness probe against the backend.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let pool = self.pool()?;
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(pool)
            .await?;
        Ok(())
    }

    /// Release the handle. Idempotent: safe to call when already closed.
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("Database connection closed");
        }
    }

    /// Get the channel registry.
    pub fn registry(&self) -> ChannelRegistry<'_> {
        ChannelRegistry::new(self)
    }
}
