//! chatkeeperd - chat-monitoring bot.
//!
//! Joins streaming channels, archives every chat message into per-channel
//! storage, and serves moderator commands for custom commands and retention
//! configuration.

use chatkeeper::bot::{self, Bot, ChatTransport, LoggingTransport};
use chatkeeper::config::Config;
use chatkeeper::db::{Database, Provisioner};
use chatkeeper::http;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "chatkeeper.toml".to_string());

    let config = Config::load_or_default(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        channels = config.chat.channels.len(),
        database = %config.database.path,
        "Starting chatkeeperd"
    );

    if config.chat.token.is_none() {
        warn!("No chat token configured; running with the console event source only");
    }

    // Connect to storage. Terminal failure here is fatal: the bot cannot
    // run without its data layer.
    let db = Database::connect(
        &config.database.path,
        config.database.max_connect_retries,
        Duration::from_secs(config.database.retry_delay_secs),
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Fatal: storage connection failed");
        e
    })?;

    let provisioner = Arc::new(Provisioner::new(db.clone(), config.database.retention_days));
    let transport: Arc<dyn ChatTransport> = Arc::new(LoggingTransport);

    // Register and provision the configured channels up front, and greet
    // channels that have a welcome message set.
    for raw in &config.chat.channels {
        let created = db.registry().add_channel(raw).await?;
        let channel_config = provisioner.config_store().get_config(raw).await?;
        if created {
            info!(channel = %channel_config.channel, "Channel registered");
        }
        if let Some(welcome) = &channel_config.welcome_message
            && let Err(e) = transport.send(&channel_config.channel, welcome).await
        {
            warn!(channel = %channel_config.channel, error = %e, "Failed to send welcome message");
        }
    }

    // Health endpoint is optional.
    // Convention: port = 0 disables it (used by tests).
    if config.health.port == 0 {
        info!("Health endpoint disabled");
    } else {
        let health_db = db.clone();
        let port = config.health.port;
        tokio::spawn(async move {
            http::run_health_server(port, health_db).await;
        });
        info!(port, "Health HTTP server started");
    }

    // Retention sweep task. The first interval tick fires immediately, so
    // the startup sweep and the daily cadence share one loop.
    {
        let provisioner = Arc::clone(&provisioner);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(86400));
            loop {
                interval.tick().await;
                match provisioner.archive().sweep_expired(chrono::Utc::now()).await {
                    Ok(removed) if removed > 0 => {
                        info!(removed, "Expired messages swept");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Retention sweep failed");
                    }
                }
            }
        });
    }
    info!("Retention sweep task started");

    // Event stream. The chat-protocol client owns the sender side; until a
    // platform client is wired in, the console source feeds it.
    let (event_tx, event_rx) = tokio::sync::mpsc::channel(1024);
    tokio::spawn(bot::console::read_events(event_tx));

    let bot = Bot::new(db.clone(), provisioner, transport);

    // Run until the event stream closes or a shutdown signal arrives.
    // Shutdown stops accepting events and releases the storage handle;
    // in-flight operations finish or fail within the backend's own timeouts.
    tokio::select! {
        _ = bot.run(event_rx) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
    }

    db.close().await;
    Ok(())
}
