//! Per-connection tasks: the read loop that also drives heartbeats, and the
//! write pump that owns the socket's write half.

pub(crate) mod read;
pub(crate) mod write;
