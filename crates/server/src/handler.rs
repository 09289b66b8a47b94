//! Handler trait for application callbacks.
//!
//! The server owns framing, heartbeats and the registry; implementors only
//! see decoded messages and connection lifecycle.

use std::future::Future;
use std::pin::Pin;

use pulselink_protocol::{Message, SessionState};

use crate::connection::ConnectionHandle;

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Application callbacks for server connections.
///
/// Calls for one connection are made from that connection's task, in order.
/// By the time `on_message` runs the connection is already registered under
/// `msg.id`.
pub trait Handler: Send + Sync + 'static {
    /// Called for every decoded message, heartbeats included.
    fn on_message(&self, conn: ConnectionHandle, msg: Message) -> HandlerFuture<'_>;

    /// Called once after the connection is accepted.
    fn on_connected(&self, conn: ConnectionHandle) -> HandlerFuture<'_> {
        let _ = conn;
        Box::pin(async {})
    }

    /// Called when the heartbeat state of a connection changes.
    fn on_state_changed(&self, conn: ConnectionHandle, state: SessionState) -> HandlerFuture<'_> {
        let _ = (conn, state);
        Box::pin(async {})
    }

    /// Called once after the connection is closed and deregistered.
    fn on_disconnected(&self, conn: ConnectionHandle) -> HandlerFuture<'_> {
        let _ = conn;
        Box::pin(async {})
    }
}
