use std::fmt;

use serde::{Deserialize, Serialize};

/// Heartbeat state of one connection, shared by client and server roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Link is live; traffic seen since the last heartbeat.
    #[default]
    Connected,
    /// A heartbeat went out because the link was idle and nothing has come
    /// back since.
    AwaitingPeer,
    /// Terminal. The connection is being torn down.
    Closing,
}

impl SessionState {
    /// Applies an inbound frame.
    pub fn on_frame(self) -> Self {
        match self {
            Self::Closing => Self::Closing,
            _ => Self::Connected,
        }
    }

    /// Applies a heartbeat sent because of idleness.
    pub fn on_heartbeat_sent(self) -> Self {
        match self {
            Self::Closing => Self::Closing,
            _ => Self::AwaitingPeer,
        }
    }

    pub fn is_closing(self) -> bool {
        self == Self::Closing
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::AwaitingPeer => "awaiting_peer",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}
