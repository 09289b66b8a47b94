//! Read pump: decodes inbound frames and sends heartbeats on write-idle.

use futures_util::StreamExt;
use pulselink_idle::{Direction, IdleEvent, IdleTimer};
use pulselink_protocol::{FrameCodec, Message, ProtocolError, SessionState};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::client::ClientEvent;

/// Everything the read pump needs besides the socket and the timer.
pub(crate) struct SessionContext {
    pub(crate) heartbeat: Message,
    pub(crate) write_tx: mpsc::Sender<Message>,
    pub(crate) state_tx: watch::Sender<SessionState>,
    pub(crate) events_tx: mpsc::Sender<ClientEvent>,
    /// Cancelled by `close()`.
    pub(crate) shutdown: CancellationToken,
    /// Cancelled when the connection goes down for any reason.
    pub(crate) cancel: CancellationToken,
}

/// Runs the client side of the heartbeat state machine until the connection
/// closes, then tears it down.
///
/// Frames and idle events are handled in one loop, so heartbeats never race
/// with inbound processing. On return the timer is gone and the write pump
/// has finished.
pub(crate) async fn read_pump<R>(
    mut read: FramedRead<R, FrameCodec>,
    mut timer: IdleTimer,
    write_handle: JoinHandle<()>,
    ctx: SessionContext,
) where
    R: AsyncRead + Unpin,
{
    let activity = timer.activity();

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                if ctx.shutdown.is_cancelled() {
                    debug!("client closed locally");
                } else {
                    warn!("connection lost on write");
                }
                break;
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(msg)) => {
                        activity.record(Direction::Read);
                        trace!(id = %msg.id, kind = ?msg.kind(), "frame received");
                        set_state(&ctx, SessionState::Connected);
                        forward(&ctx.events_tx, ClientEvent::Message(msg));
                    }
                    Some(Err(ProtocolError::Io(e))) => {
                        info!("connection lost: {e}");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("closing connection: {e}");
                        break;
                    }
                    None => {
                        info!("connection closed by server");
                        break;
                    }
                }
            }

            event = timer.next_idle() => {
                if event != IdleEvent::WriterIdle {
                    continue;
                }
                debug!(id = %ctx.heartbeat.id, "write side idle, sending heartbeat");
                if let Err(e) = ctx.write_tx.try_send(ctx.heartbeat.clone()) {
                    error!("heartbeat write failed: {e}");
                    break;
                }
                let next = ctx.state_tx.borrow().on_heartbeat_sent();
                set_state(&ctx, next);
            }
        }
    }

    drop(timer);
    set_state(&ctx, SessionState::Closing);
    ctx.cancel.cancel();
    let _ = write_handle.await;
    forward(&ctx.events_tx, ClientEvent::Disconnected);
}

fn set_state(ctx: &SessionContext, next: SessionState) {
    let current = *ctx.state_tx.borrow();
    if current == next || current.is_closing() {
        return;
    }
    debug!(from = %current, to = %next, "heartbeat state changed");
    ctx.state_tx.send_replace(next);
    forward(&ctx.events_tx, ClientEvent::StateChanged(next));
}

fn forward(events_tx: &mpsc::Sender<ClientEvent>, event: ClientEvent) {
    if let Err(e) = events_tx.try_send(event) {
        debug!("dropping client event: {e}");
    }
}
