//! Heartbeat client for pulselink servers.
//!
//! Connects with a configured client id, pings the server whenever the link
//! has been quiet on the write side, and surfaces inbound messages and state
//! changes as [`ClientEvent`]s. Reconnecting is left to the caller;
//! [`ReconnectConfig`] provides the backoff schedule.

pub mod client;
pub mod config;
mod pumps;
pub mod reconnection;

pub use client::{ClientEvent, HeartbeatClient};
pub use config::ClientConfig;
pub use reconnection::{ReconnectConfig, reconnect_loop};

/// Errors from the heartbeat client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("send failed: queue full")]
    Send,
}
