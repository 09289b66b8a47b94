//! Server side of the heartbeat state machine, one task per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use pulselink_idle::{Direction, IdleConfig, IdleEvent, IdleTimer};
use pulselink_protocol::constants::SEND_BUFFER_SIZE;
use pulselink_protocol::{FrameCodec, Message, ProtocolError, SessionState};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionHandle, write_pump};
use crate::handler::Handler;
use crate::registry::ConnectionRegistry;
use crate::server::ServerConfig;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// End of stream or a transport error on read.
    PeerClosed,
    Malformed,
    WriteFailed,
    /// `ConnectionHandle::close` was called.
    ClosedLocally,
    /// Server shutdown.
    Cancelled,
}

/// Runs one connection until it closes.
///
/// Reads and idle events are handled in the same loop, so they never run
/// concurrently. When this returns the idle timer is gone, the connection is
/// out of the registry and its write pump has exited.
pub(crate) async fn run_session<S, H>(
    stream: S,
    peer_addr: SocketAddr,
    config: &ServerConfig,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<H>,
    server_cancel: CancellationToken,
) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    H: Handler,
{
    let codec = FrameCodec::new(config.framing).with_max_frame_len(config.max_frame_len);
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, codec.clone());
    let writer = FramedWrite::new(write_half, codec);

    let (tx, rx) = mpsc::channel::<Message>(SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();
    let conn = ConnectionHandle::new(peer_addr, tx, cancel.clone());

    let mut timer = IdleTimer::new(
        IdleConfig::reader(config.read_idle).with_poll_granularity(config.poll_granularity),
    );
    let activity = timer.activity();
    let write_task = tokio::spawn(write_pump(writer, rx, activity.clone(), cancel.clone()));

    handler.on_connected(conn.clone()).await;
    let mut state = SessionState::Connected;

    let mut reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // A failed write pump also lands here; see the join below.
                break if server_cancel.is_cancelled() {
                    CloseReason::Cancelled
                } else {
                    CloseReason::ClosedLocally
                };
            }

            frame = reader.next() => {
                match frame {
                    Some(Ok(msg)) => {
                        activity.record(Direction::Read);
                        debug!(%peer_addr, id = %msg.id, kind = ?msg.kind(), "frame received");

                        if let Some(old) = registry.put(msg.id, conn.clone()) {
                            info!(
                                id = %msg.id,
                                old_peer = %old.peer_addr(),
                                new_peer = %peer_addr,
                                "client reconnected, registry entry replaced"
                            );
                        }

                        let next = state.on_frame();
                        set_state(&mut state, next, &conn, handler.as_ref()).await;
                        handler.on_message(conn.clone(), msg).await;
                    }
                    Some(Err(ProtocolError::Io(e))) => {
                        info!(%peer_addr, "connection lost: {e}");
                        break CloseReason::PeerClosed;
                    }
                    Some(Err(e)) => {
                        warn!(%peer_addr, "closing connection: {e}");
                        break CloseReason::Malformed;
                    }
                    None => {
                        info!(%peer_addr, "connection closed by peer");
                        break CloseReason::PeerClosed;
                    }
                }
            }

            event = timer.next_idle() => {
                if event != IdleEvent::ReaderIdle {
                    continue;
                }
                debug!(%peer_addr, idle = ?config.read_idle, "no inbound data, sending pong");
                if let Err(e) = conn.send(Message::pong()) {
                    tracing::error!(%peer_addr, "heartbeat write failed: {e}");
                    break CloseReason::WriteFailed;
                }
                let next = state.on_heartbeat_sent();
                set_state(&mut state, next, &conn, handler.as_ref()).await;
            }
        }
    };

    // Teardown: timer first so nothing fires on a closing connection.
    drop(timer);
    set_state(&mut state, SessionState::Closing, &conn, handler.as_ref()).await;
    cancel.cancel();
    let released = registry.remove(&conn);
    if let Ok(Err(_)) = write_task.await {
        if reason == CloseReason::ClosedLocally {
            reason = CloseReason::WriteFailed;
        }
    }

    info!(%peer_addr, ?reason, ?released, "session closed");
    handler.on_disconnected(conn).await;
    reason
}

async fn set_state<H: Handler>(
    state: &mut SessionState,
    next: SessionState,
    conn: &ConnectionHandle,
    handler: &H,
) {
    if *state == next {
        return;
    }
    debug!(peer = %conn.peer_addr(), from = %state, to = %next, "heartbeat state changed");
    *state = next;
    handler.on_state_changed(conn.clone(), next).await;
}
