//! Bot event processing.
//!
//! Chat events arrive on a single mpsc stream and are processed strictly
//! sequentially: per-channel message order is preserved and no two moderator
//! commands for one channel ever race in-process. The chat-protocol client is
//! an external collaborator behind [`ChatTransport`]; the bot only calls back
//! into it to send reply text.

pub mod commands;
pub mod console;

use crate::db::{ChatMessageRecord, Database, Provisioner};
use crate::error::CommandError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use commands::{CommandContext, Registry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A chat message observed from the protocol client.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub channel: String,
    pub user: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub message_id: Option<String>,
    pub is_mod: bool,
    pub is_subscriber: bool,
}

impl ChatEvent {
    fn to_record(&self) -> ChatMessageRecord {
        ChatMessageRecord {
            channel: self.channel.clone(),
            user: self.user.clone(),
            text: self.text.clone(),
            timestamp: self.timestamp,
            user_id: self.user_id.clone(),
            message_id: self.message_id.clone(),
            is_mod: self.is_mod,
            is_subscriber: self.is_subscriber,
        }
    }
}

/// Outbound surface of the chat-protocol client.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a line of text to a channel.
    async fn send(&self, channel: &str, text: &str) -> anyhow::Result<()>;
}

/// Transport that logs outbound lines instead of delivering them. Used when
/// no platform client is wired in (development, dry runs).
pub struct LoggingTransport;

#[async_trait]
impl ChatTransport for LoggingTransport {
    async fn send(&self, channel: &str, text: &str) -> anyhow::Result<()> {
        info!(channel = %channel, text = %text, "Outbound chat message");
        Ok(())
    }
}

/// The bot: archives every event and dispatches commands.
pub struct Bot {
    db: Database,
    provisioner: Arc<Provisioner>,
    transport: Arc<dyn ChatTransport>,
    commands: Registry,
}

impl Bot {
    /// Create a bot over a live database handle.
    pub fn new(
        db: Database,
        provisioner: Arc<Provisioner>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            db,
            provisioner,
            transport,
            commands: Registry::new(),
        }
    }

    /// Process events until the stream closes.
    pub async fn run(&self, mut events: mpsc::Receiver<ChatEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("Event stream closed, bot loop exiting");
    }

    /// Process one chat event: activity ping, archive append, command
    /// dispatch. No single failure terminates event processing.
    pub async fn handle_event(&self, event: ChatEvent) {
        debug!(channel = %event.channel, user = %event.user, "Received message");

        match self
            .db
            .registry()
            .update_activity(&event.channel, event.timestamp)
            .await
        {
            Ok(false) => {
                debug!(channel = %event.channel, "Activity ping for unregistered channel")
            }
            Ok(true) => {}
            Err(e) => warn!(channel = %event.channel, error = %e, "Activity update failed"),
        }

        if let Err(e) = self.provisioner.archive().append(&event.to_record()).await {
            // Logged and dropped; the next event must still be processed.
            error!(channel = %event.channel, error = %e, "Failed to archive message");
        }

        if event.text.starts_with('!') {
            self.dispatch_command(&event).await;
        }
    }

    async fn dispatch_command(&self, event: &ChatEvent) {
        let mut parts = event.text.split_whitespace();
        let Some(raw_token) = parts.next() else {
            return;
        };
        let token = raw_token.to_lowercase();
        let args: Vec<&str> = parts.collect();

        let config = match self
            .provisioner
            .config_store()
            .get_config(&event.channel)
            .await
        {
            Ok(config) => config,
            Err(e) => {
                error!(channel = %event.channel, error = %e, "Could not load channel config for dispatch");
                return;
            }
        };

        if let Some(command) = self.commands.get(&token) {
            if !config.enabled_commands.contains(&token) {
                debug!(channel = %event.channel, token = %token, "Builtin command disabled");
                return;
            }
            if command.requires_moderator() && !event.is_mod {
                self.reply(&config.channel, &CommandError::NotModerator)
                    .await;
                return;
            }

            let ctx = CommandContext {
                channel: &config.channel,
                user: &event.user,
                provisioner: &self.provisioner,
            };
            match command.run(&ctx, &args).await {
                Ok(reply) => self.send(&config.channel, &reply).await,
                Err(e) => {
                    if !e.is_user_fault() {
                        error!(
                            channel = %config.channel,
                            token = %token,
                            code = e.error_code(),
                            error = %e,
                            "Command failed"
                        );
                    }
                    self.reply(&config.channel, &e).await;
                }
            }
        } else if let Some(response) = config.custom_commands.get(&token) {
            self.send(&config.channel, response).await;
        }
        // Unknown tokens are ignored: chatters use `!` for plenty of things
        // that aren't ours.
    }

    async fn reply(&self, channel: &str, error: &CommandError) {
        if let Some(text) = error.to_chat_reply() {
            self.send(channel, &text).await;
        }
    }

    async fn send(&self, channel: &str, text: &str) {
        if let Err(e) = self.transport.send(channel, text).await {
            warn!(channel = %channel, error = %e, "Failed to send chat message");
        }
    }
}
