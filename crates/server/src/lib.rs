//! Heartbeat server for pulselink clients.
//!
//! Accepts TCP connections, decodes frames, answers quiet links with a
//! `pong`, and keeps a [`ConnectionRegistry`] from client id to the live
//! connection so the application can address a client later. Application
//! messages are delivered to a [`Handler`].

mod connection;
mod handler;
mod registry;
mod server;
mod session;

pub use connection::{ConnectionHandle, SendError};
pub use handler::{Handler, HandlerFuture};
pub use registry::ConnectionRegistry;
pub use server::{HeartbeatServer, ServerConfig};

use pulselink_protocol::ConnectionId;

/// Errors produced by the heartbeat server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server already running")]
    AlreadyRunning,

    #[error("client {0} is not connected")]
    NotConnected(ConnectionId),

    #[error(transparent)]
    Send(#[from] SendError),
}
