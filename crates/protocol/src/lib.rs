//! Wire protocol for pulselink heartbeat links.
//!
//! A [`Message`] is a client identity plus a UTF-8 payload. Two payloads are
//! reserved for liveness (`"ping"` and `"pong"`); everything else belongs to
//! the application. See [`wire`] for the byte layout and [`codec`] for the
//! stream framing used on TCP.

pub mod codec;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod state;
pub mod wire;

// Re-export primary types for convenience.
pub use codec::{FrameCodec, Framing};
pub use envelope::{ConnectionId, Message, MessageKind};
pub use error::ProtocolError;
pub use state::SessionState;
