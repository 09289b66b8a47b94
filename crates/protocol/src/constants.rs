use std::time::Duration;

/// Keep-alive payload sent by clients.
pub const PING_PAYLOAD: &str = "ping";

/// Keep-alive payload sent by the server.
pub const PONG_PAYLOAD: &str = "pong";

/// Identity carried by every server pong.
///
/// The server does not speak for any client, so pongs use a fixed id that
/// receivers should not interpret.
pub const PONG_SENTINEL_ID: u64 = 123_456;

/// Size of the big-endian identity field at the start of every body.
pub const ID_LEN: usize = 8;

/// Size of the big-endian length prefix in length-prefixed framing.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound on a frame body (1 MiB).
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// How long a client may stay silent before it sends a ping.
pub const DEFAULT_WRITE_IDLE: Duration = Duration::from_secs(10);

/// How long the server waits for inbound data before it sends a pong.
pub const DEFAULT_READ_IDLE: Duration = Duration::from_secs(5);

/// Outbound queue capacity per connection.
pub const SEND_BUFFER_SIZE: usize = 256;

/// Port the server binary listens on when none is configured.
pub const DEFAULT_PORT: u16 = 9400;
