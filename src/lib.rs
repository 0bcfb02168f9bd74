//! chatkeeper - chat-monitoring bot with a multi-tenant channel data layer.
//!
//! The bot joins streaming channels, archives every chat message into an
//! isolated per-channel namespace, and serves moderator commands for custom
//! commands and retention configuration.
//!
//! ## Modules
//!
//! - [`db`] - connection lifecycle, channel registry, namespace provisioning,
//!   message archive, configuration store
//! - [`bot`] - sequential event processing and builtin command dispatch
//! - [`http`] - health and readiness probes
//! - [`config`] - TOML configuration with environment overrides
//! - [`error`] - command-layer error mapping to chat replies

pub mod bot;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
