//! Per-connection handle and write pump.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::SinkExt;
use pulselink_idle::{Activity, Direction};
use pulselink_protocol::{ConnectionId, FrameCodec, Message, ProtocolError};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handle for one live client connection.
///
/// Cloneable and cheap. It can queue outbound messages and close the
/// connection but does not own the socket. Two handles are equal only when
/// they refer to the same connection, whatever client ids it carried.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Inner>,
}

struct Inner {
    key: Uuid,
    peer_addr: SocketAddr,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
    /// Client ids this connection has been registered under.
    bound_ids: Mutex<Vec<ConnectionId>>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        peer_addr: SocketAddr,
        tx: mpsc::Sender<Message>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                key: Uuid::new_v4(),
                peer_addr,
                tx,
                cancel,
                bound_ids: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Unique key of this connection.
    pub fn key(&self) -> Uuid {
        self.inner.key
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    /// Queues a message for the write pump.
    ///
    /// Returns `Err` if the queue is full or the connection is gone. A queued
    /// message that later fails on the socket closes the connection.
    pub fn send(&self, msg: Message) -> Result<(), SendError> {
        if self.inner.cancel.is_cancelled() {
            return Err(SendError);
        }
        self.inner.tx.try_send(msg).map_err(|_| {
            tracing::warn!(peer = %self.inner.peer_addr, "send queue full or closed, dropping message");
            SendError
        })
    }

    /// Returns `true` until the connection starts closing.
    pub fn is_connected(&self) -> bool {
        !self.inner.cancel.is_cancelled() && !self.inner.tx.is_closed()
    }

    /// Asks the session to close the connection.
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }

    /// Resolves once the connection has started closing.
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Client ids this connection has been registered under.
    pub fn bound_ids(&self) -> Vec<ConnectionId> {
        self.lock_bound().clone()
    }

    pub(crate) fn bind(&self, id: ConnectionId) {
        let mut ids = self.lock_bound();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    pub(crate) fn take_bound(&self) -> Vec<ConnectionId> {
        std::mem::take(&mut *self.lock_bound())
    }

    fn lock_bound(&self) -> std::sync::MutexGuard<'_, Vec<ConnectionId>> {
        self.inner
            .bound_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.key == other.inner.key
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("key", &self.inner.key)
            .field("peer_addr", &self.inner.peer_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Error returned when the send queue is full or closed.
#[derive(Debug, thiserror::Error)]
#[error("send failed: queue full or connection closed")]
pub struct SendError;

/// Write pump: drains the send queue onto the socket.
///
/// A failed write is fatal for the connection: the pump cancels it and
/// returns the error so the session can report why it closed.
pub(crate) async fn write_pump<W>(
    mut sink: FramedWrite<W, FrameCodec>,
    mut rx: mpsc::Receiver<Message>,
    activity: Activity,
    cancel: CancellationToken,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),

            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        if let Err(e) = sink.send(msg).await {
                            tracing::error!("write pump send error: {e}");
                            cancel.cancel();
                            break Err(e);
                        }
                        activity.record(Direction::Write);
                    }
                    None => break Ok(()),
                }
            }
        }
    };

    // Best-effort shutdown of the write half.
    let _ = sink.close().await;
    result
}
