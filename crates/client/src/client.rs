//! Heartbeat client connected to a single server.

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use pulselink_idle::{IdleConfig, IdleTimer};
use pulselink_protocol::constants::SEND_BUFFER_SIZE;
use pulselink_protocol::{ConnectionId, FrameCodec, Message, SessionState};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ClientError;
use crate::config::ClientConfig;
use crate::pumps::read::{SessionContext, read_pump};
use crate::pumps::write::write_pump;

/// Capacity of the event channel returned by [`HeartbeatClient::take_events`].
pub const EVENT_BUFFER_SIZE: usize = 256;

/// Something the client observed on its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A decoded message from the server, heartbeats included.
    Message(Message),
    StateChanged(SessionState),
    /// The connection is gone. Always the last event.
    Disconnected,
}

/// A live connection to a heartbeat server.
///
/// Dropping the client closes the connection without waiting.
pub struct HeartbeatClient {
    client_id: ConnectionId,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    write_tx: mpsc::Sender<Message>,
    state_rx: watch::Receiver<SessionState>,
    events_rx: Mutex<Option<mpsc::Receiver<ClientEvent>>>,
    shutdown: CancellationToken,
    cancel: CancellationToken,
    session: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatClient {
    /// Connects to the configured server and starts the heartbeat.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let addr = (config.host.as_str(), config.port);
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)??;
        stream.set_nodelay(true)?;
        Self::start(stream, config)
    }

    fn start(stream: TcpStream, config: &ClientConfig) -> Result<Self, ClientError> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        info!(client_id = %config.client_id, %local_addr, %peer_addr, "connected");

        let codec = FrameCodec::new(config.framing).with_max_frame_len(config.max_frame_len);
        let (read_half, write_half) = stream.into_split();

        let (write_tx, write_rx) = mpsc::channel::<Message>(SEND_BUFFER_SIZE);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let (state_tx, state_rx) = watch::channel(SessionState::Connected);
        let shutdown = CancellationToken::new();
        let cancel = shutdown.child_token();

        let timer = IdleTimer::new(
            IdleConfig::writer(config.write_idle).with_poll_granularity(config.poll_granularity),
        );

        let write_handle = tokio::spawn(write_pump(
            FramedWrite::new(write_half, codec.clone()),
            write_rx,
            timer.activity(),
            cancel.clone(),
        ));

        let ctx = SessionContext {
            heartbeat: config.heartbeat_message(),
            write_tx: write_tx.clone(),
            state_tx,
            events_tx,
            shutdown: shutdown.clone(),
            cancel: cancel.clone(),
        };
        let session = tokio::spawn(read_pump(
            FramedRead::new(read_half, codec),
            timer,
            write_handle,
            ctx,
        ));

        Ok(Self {
            client_id: config.client_id,
            local_addr,
            peer_addr,
            write_tx,
            state_rx,
            events_rx: Mutex::new(Some(events_rx)),
            shutdown,
            cancel,
            session: tokio::sync::Mutex::new(Some(session)),
        })
    }

    pub fn client_id(&self) -> ConnectionId {
        self.client_id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Queues an application message stamped with this client's id.
    pub fn send(&self, payload: impl Into<String>) -> Result<(), ClientError> {
        self.send_message(Message::new(self.client_id, payload))
    }

    /// Queues a message as-is.
    pub fn send_message(&self, msg: Message) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }
        self.write_tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::Send,
            mpsc::error::TrySendError::Closed(_) => ClientError::Closed,
        })
    }

    /// Current heartbeat state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Takes the event receiver. Returns `None` after the first call.
    ///
    /// Events are dropped when nobody drains the receiver and it fills up.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Resolves once the connection has started closing.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Closes the connection and waits for its tasks to finish.
    pub async fn close(&self) {
        self.shutdown.cancel();
        if let Some(session) = self.session.lock().await.take() {
            let _ = session.await;
        }
    }
}

impl Drop for HeartbeatClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
