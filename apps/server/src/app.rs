//! Application orchestrator: runs the heartbeat server until Ctrl-C.

use std::sync::Arc;

use pulselink_protocol::{Message, SessionState};
use pulselink_server::{ConnectionHandle, Handler, HandlerFuture, HeartbeatServer};

use crate::config::Config;

/// Runs the server until shutdown is requested.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let server = HeartbeatServer::new(config.server_config(), LoggingHandler);

    let server_run = Arc::clone(&server);
    let mut run_handle = tokio::spawn(async move { server_run.run().await });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("SIGINT received, shutting down");
        }
        // Only a bind failure ends run() before shutdown.
        result = &mut run_handle => {
            result??;
            return Ok(());
        }
    }

    server.shutdown();
    run_handle.await??;
    Ok(())
}

/// Logs traffic and state changes. Registration is done by the server.
struct LoggingHandler;

impl Handler for LoggingHandler {
    fn on_message(&self, conn: ConnectionHandle, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            if msg.is_heartbeat() {
                tracing::debug!(id = %msg.id, peer = %conn.peer_addr(), "heartbeat");
            } else {
                tracing::info!(id = %msg.id, peer = %conn.peer_addr(), payload = %msg.payload, "message");
            }
        })
    }

    fn on_connected(&self, conn: ConnectionHandle) -> HandlerFuture<'_> {
        Box::pin(async move {
            tracing::info!(peer = %conn.peer_addr(), "client connected");
        })
    }

    fn on_state_changed(&self, conn: ConnectionHandle, state: SessionState) -> HandlerFuture<'_> {
        Box::pin(async move {
            tracing::debug!(peer = %conn.peer_addr(), %state, "state changed");
        })
    }

    fn on_disconnected(&self, conn: ConnectionHandle) -> HandlerFuture<'_> {
        Box::pin(async move {
            tracing::info!(peer = %conn.peer_addr(), "client disconnected");
        })
    }
}
