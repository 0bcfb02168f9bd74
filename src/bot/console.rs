//! Console event source: a development stand-in for the chat-protocol
//! client.
//!
//! Reads events from stdin, one per line: `<channel> <user> <text...>`.
//! A `*` suffix on the user marks them as a moderator, e.g.:
//!
//! ```text
//! teststream alice hello everyone
//! teststream bob* !setretention 7
//! ```
//!
//! The task ends when stdin reaches EOF, which closes the event stream and
//! lets the bot loop exit.

use super::ChatEvent;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Read chat events from stdin until EOF.
pub async fn read_events(events: mpsc::Sender<ChatEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("Console event source ready (format: <channel> <user[*]> <text...>)");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read from stdin");
                break;
            }
        };

        let Some(event) = parse_line(&line) else {
            if !line.trim().is_empty() {
                warn!(line = %line, "Ignoring malformed console line");
            }
            continue;
        };

        if events.send(event).await.is_err() {
            break;
        }
    }

    info!("Console event source closed");
}

fn parse_line(line: &str) -> Option<ChatEvent> {
    let mut parts = line.trim().splitn(3, char::is_whitespace);
    let channel = parts.next().filter(|s| !s.is_empty())?;
    let user = parts.next()?;
    let text = parts.next()?.trim();
    if text.is_empty() {
        return None;
    }

    let (user, is_mod) = match user.strip_suffix('*') {
        Some(stripped) => (stripped, true),
        None => (user, false),
    };

    Some(ChatEvent {
        channel: channel.to_string(),
        user: user.to_string(),
        text: text.to_string(),
        timestamp: Utc::now(),
        user_id: None,
        message_id: None,
        is_mod,
        is_subscriber: false,
    })
}
