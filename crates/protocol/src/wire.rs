//! Byte layout of a message body.
//!
//! # Wire format
//!
//! ```text
//! BODY:
//!   [8 bytes BE: ConnectionId]
//!   [N bytes: UTF-8 payload, no terminator]
//!
//! LEGACY FRAME (one transport read = one frame):
//!   [BODY]
//!
//! LENGTH-PREFIXED FRAME:
//!   [4 bytes BE: body length L, ID_LEN <= L <= max]
//!   [BODY]
//! ```
//!
//! The body carries no length of its own, so its payload is "everything after
//! the id". That is only safe when something outside the body delimits it:
//! either the length prefix or, for legacy peers, the read boundary.

use bytes::{Buf, BufMut};

use crate::constants::ID_LEN;
use crate::envelope::{ConnectionId, Message};
use crate::error::ProtocolError;

/// Number of bytes [`encode_body`] writes for `msg`.
pub fn body_len(msg: &Message) -> usize {
    ID_LEN + msg.payload.len()
}

/// Writes the id followed by the raw payload bytes.
pub fn encode_body<B: BufMut>(msg: &Message, dst: &mut B) {
    dst.put_u64(msg.id.get());
    dst.put_slice(msg.payload.as_bytes());
}

/// Parses a complete body; every byte after the id is payload.
pub fn decode_body(mut src: &[u8]) -> Result<Message, ProtocolError> {
    if src.len() < ID_LEN {
        return Err(ProtocolError::MalformedFrame(format!(
            "need at least {ID_LEN} bytes for the id, got {}",
            src.len()
        )));
    }

    let id = ConnectionId(src.get_u64());
    let payload = std::str::from_utf8(src)
        .map_err(|e| ProtocolError::MalformedFrame(format!("payload is not UTF-8: {e}")))?
        .to_owned();

    Ok(Message { id, payload })
}

/// Encodes `msg` as a standalone body.
pub fn to_bytes(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(body_len(msg));
    encode_body(msg, &mut buf);
    buf
}
