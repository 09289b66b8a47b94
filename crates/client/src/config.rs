//! Client configuration.

use std::time::Duration;

use pulselink_idle::DEFAULT_POLL_GRANULARITY;
use pulselink_protocol::constants::{DEFAULT_PORT, DEFAULT_WRITE_IDLE, MAX_FRAME_LEN};
use pulselink_protocol::{ConnectionId, Framing, Message};

/// Default limit for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for one [`HeartbeatClient`](crate::HeartbeatClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Identity stamped on every outbound message.
    pub client_id: ConnectionId,
    /// Write-side silence before a heartbeat is sent (zero disables).
    pub write_idle: Duration,
    pub poll_granularity: Duration,
    pub connect_timeout: Duration,
    pub framing: Framing,
    pub max_frame_len: usize,
    /// Message sent on write-idle. Defaults to a ping from `client_id`.
    pub heartbeat: Option<Message>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            client_id: ConnectionId(1),
            write_idle: DEFAULT_WRITE_IDLE,
            poll_granularity: DEFAULT_POLL_GRANULARITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            framing: Framing::default(),
            max_frame_len: MAX_FRAME_LEN,
            heartbeat: None,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<ConnectionId>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// The message sent each time the write side goes idle.
    pub fn heartbeat_message(&self) -> Message {
        self.heartbeat
            .clone()
            .unwrap_or_else(|| Message::ping(self.client_id))
    }
}
