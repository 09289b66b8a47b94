use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{PING_PAYLOAD, PONG_PAYLOAD, PONG_SENTINEL_ID};

/// Logical client identity.
///
/// Assigned by configuration and stable across reconnects, so the server can
/// keep addressing the same client after its socket changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Returns the raw integer value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a message means to the heartbeat engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Client keep-alive.
    Ping,
    /// Server keep-alive reply.
    Pong,
    /// Application content.
    Data,
}

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: ConnectionId,
    pub payload: String,
}

impl Message {
    /// Creates a message carrying application content.
    pub fn new(id: impl Into<ConnectionId>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }

    /// Creates the keep-alive a client sends when its link has been quiet.
    pub fn ping(id: impl Into<ConnectionId>) -> Self {
        Self::new(id, PING_PAYLOAD)
    }

    /// Creates the keep-alive the server sends on a quiet link.
    pub fn pong() -> Self {
        Self::new(PONG_SENTINEL_ID, PONG_PAYLOAD)
    }

    /// Classifies the payload.
    pub fn kind(&self) -> MessageKind {
        match self.payload.as_str() {
            PING_PAYLOAD => MessageKind::Ping,
            PONG_PAYLOAD => MessageKind::Pong,
            _ => MessageKind::Data,
        }
    }

    /// Returns `true` for `ping` and `pong`.
    pub fn is_heartbeat(&self) -> bool {
        self.kind() != MessageKind::Data
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message{{id={}, payload={:?}}}", self.id, self.payload)
    }
}
