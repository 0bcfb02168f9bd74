//! Builtin chat command handlers.
//!
//! Commands are a static mapping from invocation token to handler, resolved
//! by table lookup. Custom (data-driven) commands are not registered here;
//! the dispatcher falls back to the channel's config record when the builtin
//! table misses.

use crate::db::Provisioner;
use crate::error::{CommandError, CommandResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

/// Context passed to each command handler.
pub struct CommandContext<'a> {
    /// Normalized channel the command was issued in.
    pub channel: &'a str,
    /// Issuing user.
    pub user: &'a str,
    /// Data-layer access.
    pub provisioner: &'a Provisioner,
}

/// Trait implemented by all builtin command handlers.
///
/// A handler returns the reply text to send in-channel.
#[async_trait]
pub trait Command: Send + Sync {
    /// Whether the command requires moderator privilege. Defaults to yes;
    /// read-only commands opt out.
    fn requires_moderator(&self) -> bool {
        true
    }

    /// Handle an invocation. `args` excludes the command token itself.
    async fn run(&self, ctx: &CommandContext<'_>, args: &[&str]) -> CommandResult;
}

/// Registry of builtin command handlers.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Command>>,
}

impl Registry {
    /// Create a new registry with all builtins registered.
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Command>> = HashMap::new();

        handlers.insert("!commands", Box::new(ListCommandsHandler));
        handlers.insert("!config", Box::new(ConfigHandler));
        handlers.insert("!addcommand", Box::new(AddCommandHandler));
        handlers.insert("!delcommand", Box::new(DelCommandHandler));
        handlers.insert("!setretention", Box::new(SetRetentionHandler));

        Self { handlers }
    }

    /// Look up a handler by token.
    pub fn get(&self, token: &str) -> Option<&dyn Command> {
        self.handlers.get(token).map(|h| h.as_ref())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// `!commands` - list every answerable command. No privilege required.
struct ListCommandsHandler;

#[async_trait]
impl Command for ListCommandsHandler {
    fn requires_moderator(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &CommandContext<'_>, _args: &[&str]) -> CommandResult {
        let tokens = ctx
            .provisioner
            .config_store()
            .list_commands(ctx.channel)
            .await?;
        Ok(format!("Available commands: {}", tokens.join(", ")))
    }
}

/// `!config` - summarize the channel's configuration for moderators.
struct ConfigHandler;

#[async_trait]
impl Command for ConfigHandler {
    async fn run(&self, ctx: &CommandContext<'_>, _args: &[&str]) -> CommandResult {
        let config = ctx
            .provisioner
            .config_store()
            .get_config(ctx.channel)
            .await?;
        let welcome = match &config.welcome_message {
            Some(text) => format!("\"{text}\""),
            None => "not set".to_string(),
        };
        Ok(format!(
            "Retention: {} days | Custom commands: {} | Welcome message: {}",
            config.message_retention_days,
            config.custom_commands.len(),
            welcome
        ))
    }
}

/// `!addcommand <token> <response...>` - upsert a custom command.
struct AddCommandHandler;

#[async_trait]
impl Command for AddCommandHandler {
    async fn run(&self, ctx: &CommandContext<'_>, args: &[&str]) -> CommandResult {
        if args.len() < 2 {
            return Err(CommandError::NeedMoreParams {
                usage: "!addcommand <token> <response>",
            });
        }
        let response = args[1..].join(" ");
        let token = ctx
            .provisioner
            .config_store()
            .add_custom_command(ctx.channel, args[0], &response)
            .await?;
        info!(channel = %ctx.channel, token = %token, user = %ctx.user, "Custom command saved");
        Ok(format!("Command {token} saved."))
    }
}

/// `!delcommand <token>` - remove a custom command.
struct DelCommandHandler;

#[async_trait]
impl Command for DelCommandHandler {
    async fn run(&self, ctx: &CommandContext<'_>, args: &[&str]) -> CommandResult {
        let Some(raw) = args.first() else {
            return Err(CommandError::NeedMoreParams {
                usage: "!delcommand <token>",
            });
        };
        let token = crate::db::normalize_token(raw);
        let removed = ctx
            .provisioner
            .config_store()
            .remove_custom_command(ctx.channel, &token)
            .await?;
        if removed {
            Ok(format!("Command {token} removed."))
        } else {
            Ok(format!("No such command: {token}"))
        }
    }
}

/// `!setretention <days>` - change the message retention window.
struct SetRetentionHandler;

#[async_trait]
impl Command for SetRetentionHandler {
    async fn run(&self, ctx: &CommandContext<'_>, args: &[&str]) -> CommandResult {
        let days: i64 = args
            .first()
            .and_then(|raw| raw.parse().ok())
            .ok_or(CommandError::NeedMoreParams {
                usage: "!setretention <days>",
            })?;
        ctx.provisioner
            .config_store()
            .set_retention(ctx.channel, days)
            .await?;
        info!(channel = %ctx.channel, days, user = %ctx.user, "Retention updated");
        Ok(format!("Message retention set to {days} days."))
    }
}
