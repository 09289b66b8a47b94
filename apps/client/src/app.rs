//! Application orchestrator: keeps a heartbeat client connected until Ctrl-C.

use pulselink_client::{ClientEvent, reconnect_loop};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Runs the client until shutdown is requested.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let (events_tx, mut events_rx) = mpsc::channel(64);

    let reconnect = tokio::spawn(reconnect_loop(
        config.client_config(),
        config.reconnect_config(),
        events_tx,
        cancel.clone(),
    ));

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("SIGINT received, shutting down");
                break;
            }
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                log_event(&event);
            }
        }
    }

    cancel.cancel();
    reconnect.await?;
    Ok(())
}

fn log_event(event: &ClientEvent) {
    match event {
        ClientEvent::Message(msg) if msg.is_heartbeat() => {
            tracing::debug!(id = %msg.id, payload = %msg.payload, "heartbeat");
        }
        ClientEvent::Message(msg) => {
            tracing::info!(id = %msg.id, payload = %msg.payload, "message");
        }
        ClientEvent::StateChanged(state) => {
            tracing::debug!(%state, "state changed");
        }
        ClientEvent::Disconnected => {
            tracing::info!("disconnected from server");
        }
    }
}
