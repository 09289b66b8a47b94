//! Heartbeat server.
//!
//! Listens on a TCP port and runs one session task per client connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pulselink_idle::DEFAULT_POLL_GRANULARITY;
use pulselink_protocol::constants::{DEFAULT_READ_IDLE, MAX_FRAME_LEN};
use pulselink_protocol::{ConnectionId, Framing, Message};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::ServerError;
use crate::connection::ConnectionHandle;
use crate::handler::Handler;
use crate::registry::ConnectionRegistry;
use crate::session::run_session;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Silence on a connection before the server sends a pong (zero disables).
    pub read_idle: Duration,
    /// How often idle timers check the clock.
    pub poll_granularity: Duration,
    pub framing: Framing,
    /// Largest accepted frame body in bytes.
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 0,
            read_idle: DEFAULT_READ_IDLE,
            poll_granularity: DEFAULT_POLL_GRANULARITY,
            framing: Framing::default(),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

/// The heartbeat server.
///
/// Tracks every client that has sent at least one frame in its
/// [`ConnectionRegistry`] and dispatches messages to the provided
/// [`Handler`].
pub struct HeartbeatServer<H: Handler> {
    config: ServerConfig,
    handler: Arc<H>,
    registry: Arc<ConnectionRegistry>,
    cancel: CancellationToken,
    sessions: TaskTracker,
    local_addr: Mutex<Option<SocketAddr>>,
    running: AtomicBool,
}

impl<H: Handler> HeartbeatServer<H> {
    /// Creates a new server with the given handler.
    pub fn new(config: ServerConfig, handler: H) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler: Arc::new(handler),
            registry: Arc::new(ConnectionRegistry::new()),
            cancel: CancellationToken::new(),
            sessions: TaskTracker::new(),
            local_addr: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Registry of connected clients.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Returns the live connection for a client.
    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.registry.get(id)
    }

    /// Queues `payload` for the client registered under `id`.
    pub fn send_to(&self, id: ConnectionId, payload: impl Into<String>) -> Result<(), ServerError> {
        let conn = self
            .registry
            .get(id)
            .ok_or(ServerError::NotConnected(id))?;
        conn.send(Message::new(id, payload))?;
        Ok(())
    }

    /// Number of sessions currently running.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Stops accepting connections and closes every session.
    ///
    /// [`run`](Self::run) returns once all sessions have finished.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!(
            read_idle = ?self.config.read_idle,
            framing = ?self.config.framing,
            "heartbeat server listening on {local_addr}"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            tracing::info!(%peer_addr, "connection accepted");
                            let server = Arc::clone(self);
                            self.sessions.spawn(async move {
                                run_session(
                                    stream,
                                    peer_addr,
                                    &server.config,
                                    Arc::clone(&server.registry),
                                    Arc::clone(&server.handler),
                                    server.cancel.clone(),
                                )
                                .await;
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }

        drop(listener);
        self.sessions.close();
        self.sessions.wait().await;
        tracing::info!("server stopped");
        Ok(())
    }
}
