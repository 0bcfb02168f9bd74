//! Unified error handling for the command layer.
//!
//! Maps command failures to user-visible chat replies and stable codes for
//! log labeling. Storage errors stay in `db::StoreError` (kept next to sqlx
//! for its `From` impl); this module decides what the chatter gets to see.

use crate::db::StoreError;
use thiserror::Error;

/// Errors that can occur while handling a chat command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("not enough parameters")]
    NeedMoreParams { usage: &'static str },

    #[error("moderator privileges required")]
    NotModerator,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommandError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreParams { .. } => "need_more_params",
            Self::NotModerator => "not_moderator",
            Self::UnknownCommand(_) => "unknown_command",
            Self::Store(StoreError::RetentionOutOfRange(_)) => "retention_out_of_range",
            Self::Store(StoreError::ConfigMissing(_)) => "config_missing",
            Self::Store(StoreError::ChannelNotFound(_)) => "channel_not_found",
            Self::Store(StoreError::Unavailable) => "storage_unavailable",
            Self::Store(StoreError::Write { .. }) => "write_failed",
            Self::Store(StoreError::Connection { .. }) => "connection_failed",
            Self::Store(StoreError::Sqlx(_)) => "database_error",
        }
    }

    /// Whether this error is the user's fault rather than a system fault.
    ///
    /// User faults are reported in-channel and not logged as errors.
    pub fn is_user_fault(&self) -> bool {
        matches!(
            self,
            Self::NeedMoreParams { .. }
                | Self::NotModerator
                | Self::Store(StoreError::RetentionOutOfRange(_))
        )
    }

    /// Convert to a plain-text chat reply.
    ///
    /// Returns `None` for errors that don't warrant a user-visible reply
    /// (unknown tokens are simply ignored in chat).
    pub fn to_chat_reply(&self) -> Option<String> {
        match self {
            Self::NeedMoreParams { usage } => Some(format!("Usage: {usage}")),
            Self::NotModerator => Some("Only moderators can use this command.".to_string()),
            Self::UnknownCommand(_) => None,
            Self::Store(StoreError::RetentionOutOfRange(days)) => Some(format!(
                "Retention must be between 1 and 365 days (got {days})."
            )),
            // Internal failures get a generic line; details go to the log.
            Self::Store(_) => Some("Something went wrong, please try again.".to_string()),
        }
    }
}

/// Result type for command handlers.
pub type CommandResult = Result<String, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CommandError::NeedMoreParams { usage: "!x" }.error_code(),
            "need_more_params"
        );
        assert_eq!(CommandError::NotModerator.error_code(), "not_moderator");
        assert_eq!(
            CommandError::Store(StoreError::Unavailable).error_code(),
            "storage_unavailable"
        );
    }

    #[test]
    fn test_to_chat_reply() {
        let reply = CommandError::Store(StoreError::RetentionOutOfRange(500)).to_chat_reply();
        assert_eq!(
            reply.as_deref(),
            Some("Retention must be between 1 and 365 days (got 500).")
        );

        // Unknown commands are ignored, not answered
        assert!(CommandError::UnknownCommand("!nope".into())
            .to_chat_reply()
            .is_none());

        let reply = CommandError::Store(StoreError::Unavailable).to_chat_reply();
        assert_eq!(
            reply.as_deref(),
            Some("Something went wrong, please try again.")
        );
    }

    #[test]
    fn test_user_fault_classification() {
        assert!(CommandError::NotModerator.is_user_fault());
        assert!(CommandError::Store(StoreError::RetentionOutOfRange(0)).is_user_fault());
        assert!(!CommandError::Store(StoreError::Unavailable).is_user_fault());
    }
}
