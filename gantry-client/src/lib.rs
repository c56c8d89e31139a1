//! Real-time state synchronization client for the bot.
//!
//! The bot is an external collaborator that pushes its complete state over a
//! WebSocket on every change and answers one-shot HTTP requests. This crate
//! owns the client side of that contract: a [`sync::SyncManager`] that keeps
//! exactly one live connection healthy, a [`bootstrap::seed_store`] fetch
//! that fills the [`store::StateStore`] before the first push lands, and a
//! [`rest::BotApi`] for fire-and-forget control commands. Consumers observe
//! everything through read-only [`store::StateReader`] subscriptions; nothing
//! in this crate mutates local state on a command's behalf, the authoritative
//! outcome is always the next push.

use thiserror::Error;

pub mod bootstrap;
pub mod rest;
pub mod store;
pub mod sync;

pub use bootstrap::seed_store;
pub use rest::{BotApi, BotApiConfig, CommandAck, HealthStatus};
pub use store::{StateReader, StateStore, SyncState};
pub use sync::{SyncHandle, SyncManager, SyncSettings};

/// Errors surfaced by the HTTP and streaming clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connectivity-level failure: refused socket, DNS, timeout.
    #[error("transport failure: {0}")]
    Transport(String),
    /// A body that could not be decoded into the expected shape.
    #[error("serialization failure: {0}")]
    Serialization(String),
    /// The bot answered with a non-success status.
    #[error("bot rejected request ({status}): {message}")]
    Bot { status: u16, message: String },
    #[error("{0}")]
    Other(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
