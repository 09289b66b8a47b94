//! Stream framing for TCP transports.
//!
//! [`FrameCodec`] plugs into `tokio_util::codec::{FramedRead, FramedWrite}`.
//! The default [`Framing::LengthPrefixed`] mode survives partial and coalesced
//! reads. [`Framing::Legacy`] reproduces the prefix-less format spoken by
//! older peers and treats each read as one whole frame, which TCP does not
//! promise. Use it only to talk to peers that cannot be upgraded.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::constants::{ID_LEN, LENGTH_PREFIX_LEN, MAX_FRAME_LEN};
use crate::envelope::Message;
use crate::error::ProtocolError;
use crate::wire::{body_len, decode_body, encode_body};

/// Largest body a `u32` length prefix can describe.
const MAX_ENCODABLE_LEN: usize = u32::MAX as usize;

/// How message bodies are delimited on the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// 4-byte big-endian body length before each body.
    #[default]
    LengthPrefixed,
    /// No delimiter; a decode consumes the whole read buffer.
    Legacy,
}

/// Encoder/decoder for [`Message`] frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    framing: Framing,
    max_frame_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(Framing::default())
    }
}

impl FrameCodec {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    /// Overrides the body size limit (applies to both directions).
    ///
    /// Clamped to what the 4-byte length prefix can express.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len.clamp(ID_LEN, MAX_ENCODABLE_LEN);
        self
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    fn check_len(&self, len: usize) -> Result<(), ProtocolError> {
        if len > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        Ok(())
    }

    fn decode_length_prefixed(&self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len < ID_LEN {
            return Err(ProtocolError::MalformedFrame(format!(
                "body length {len} is shorter than the {ID_LEN}-byte id"
            )));
        }
        self.check_len(len)?;

        let frame_len = LENGTH_PREFIX_LEN + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        let body = src.split_to(len);
        decode_body(&body).map(Some)
    }

    fn decode_legacy(&self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        if src.is_empty() {
            return Ok(None);
        }
        // Whatever this read delivered is the frame.
        let body = src.split();
        self.check_len(body.len())?;
        decode_body(&body).map(Some)
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        match self.framing {
            Framing::LengthPrefixed => self.decode_length_prefixed(src),
            Framing::Legacy => self.decode_legacy(src),
        }
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let len = body_len(&msg);
        self.check_len(len)?;

        match self.framing {
            Framing::LengthPrefixed => {
                dst.reserve(LENGTH_PREFIX_LEN + len);
                dst.put_u32(len as u32);
            }
            Framing::Legacy => dst.reserve(len),
        }
        encode_body(&msg, dst);
        Ok(())
    }
}
