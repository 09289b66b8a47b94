//! Reconnection with exponential backoff.
//!
//! The heartbeat core never retries on its own. [`reconnect_loop`] is the
//! outer policy: it keeps one [`HeartbeatClient`] alive under the same client
//! id, forwarding its events, until cancelled.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClientEvent, HeartbeatClient};
use crate::config::ClientConfig;

/// Configuration for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry `retry` (0 = first retry), without jitter.
    ///
    /// Grows by `backoff_factor` per retry and never exceeds `max_delay`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0);
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 0..retry {
            if delay.is_zero() || delay >= self.max_delay || factor == 1.0 {
                break;
            }
            delay = Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
                .map_or(self.max_delay, |next| next.min(self.max_delay));
        }
        delay
    }

    /// [`base_delay`](Self::base_delay) spread by up to a quarter either way,
    /// so a fleet of clients dropped together does not retry together.
    pub fn delay_with_jitter(&self, retry: u32) -> Duration {
        spread(self.base_delay(retry), clock_fraction())
    }
}

/// Scales `delay` into `[0.75, 1.25] * delay` by `fraction` in `[0, 1]`.
fn spread(delay: Duration, fraction: f64) -> Duration {
    delay.mul_f64(0.75 + 0.5 * fraction.clamp(0.0, 1.0))
}

/// Sub-second part of the wall clock, as a fraction of a second.
fn clock_fraction() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    f64::from(nanos) / 1e9
}

/// Connects, forwards events until the connection drops, and reconnects
/// after a backoff delay. Returns once `cancel` fires.
///
/// `events` receives every [`ClientEvent`] of every connection, including
/// one `Disconnected` per connection that was established.
pub async fn reconnect_loop(
    config: ClientConfig,
    policy: ReconnectConfig,
    events: mpsc::Sender<ClientEvent>,
    cancel: CancellationToken,
) {
    let mut retry: u32 = 0;

    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = HeartbeatClient::connect(&config) => result,
        };

        match connected {
            Ok(client) => {
                retry = 0;
                info!(client_id = %config.client_id, peer = %client.peer_addr(), "session started");
                if !forward_until_closed(&client, &events, &cancel).await {
                    client.close().await;
                    debug!("reconnect loop cancelled");
                    return;
                }
                client.close().await;
            }
            Err(e) => {
                warn!(host = %config.host, port = config.port, "connect failed: {e}");
            }
        }

        let delay = policy.delay_with_jitter(retry);
        retry = retry.saturating_add(1);
        info!(retry, ?delay, "reconnecting");

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reconnect cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Forwards the client's events until it disconnects.
///
/// Returns `false` if cancelled first.
async fn forward_until_closed(
    client: &HeartbeatClient,
    events: &mpsc::Sender<ClientEvent>,
    cancel: &CancellationToken,
) -> bool {
    let Some(mut rx) = client.take_events() else {
        client.closed().await;
        return true;
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            event = rx.recv() => {
                let Some(event) = event else { return true };
                let done = event == ClientEvent::Disconnected;
                if events.send(event).await.is_err() {
                    debug!("event receiver dropped");
                }
                if done {
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use pulselink_protocol::{FrameCodec, Message};
    use tokio::net::TcpListener;
    use tokio_util::codec::Framed;

    use super::*;

    #[test]
    fn reconnect_config_defaults() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(15));
        assert!((config.backoff_factor - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn base_delay_grows_then_caps() {
        let config = ReconnectConfig::default();
        let delays: Vec<u64> = (0..8)
            .map(|retry| config.base_delay(retry).as_millis() as u64)
            .collect();
        assert_eq!(delays, [250, 500, 1000, 2000, 4000, 8000, 15_000, 15_000]);
        assert_eq!(config.base_delay(u32::MAX), config.max_delay);
    }

    #[test]
    fn base_delay_tolerates_odd_settings() {
        let flat = ReconnectConfig {
            backoff_factor: 1.0,
            ..ReconnectConfig::default()
        };
        assert_eq!(flat.base_delay(u32::MAX), Duration::from_millis(250));

        let shrinking = ReconnectConfig {
            backoff_factor: 0.1,
            ..ReconnectConfig::default()
        };
        assert_eq!(shrinking.base_delay(5), Duration::from_millis(250));

        let zero = ReconnectConfig {
            initial_delay: Duration::ZERO,
            ..ReconnectConfig::default()
        };
        assert_eq!(zero.base_delay(u32::MAX), Duration::ZERO);

        let inverted = ReconnectConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        };
        assert_eq!(inverted.base_delay(0), Duration::from_secs(5));

        let explosive = ReconnectConfig {
            backoff_factor: 1e300,
            ..ReconnectConfig::default()
        };
        assert_eq!(explosive.base_delay(3), explosive.max_delay);
    }

    #[test]
    fn spread_covers_a_quarter_either_way() {
        let base = Duration::from_secs(4);
        assert_eq!(spread(base, 0.0), Duration::from_secs(3));
        assert_eq!(spread(base, 0.5), base);
        assert_eq!(spread(base, 1.0), Duration::from_secs(5));
        assert_eq!(spread(base, -3.0), Duration::from_secs(3));
        assert_eq!(spread(base, 7.0), Duration::from_secs(5));
    }

    #[test]
    fn jittered_delay_stays_near_base() {
        let config = ReconnectConfig::default();
        for retry in 0..10 {
            let base = config.base_delay(retry);
            let delay = config.delay_with_jitter(retry);
            assert!(
                delay >= base.mul_f64(0.75) && delay <= base.mul_f64(1.25),
                "retry {retry}: {delay:?} too far from {base:?}"
            );
        }
    }

    #[tokio::test]
    async fn reconnects_with_same_id_after_server_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = ClientConfig {
            write_idle: Duration::from_millis(50),
            poll_granularity: Duration::from_millis(10),
            ..ClientConfig::new("127.0.0.1", port, 31)
        };
        let policy = ReconnectConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        };

        let (events_tx, mut events_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(reconnect_loop(config, policy, events_tx, cancel.clone()));

        for _ in 0..2 {
            let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
                .await
                .expect("client did not connect")
                .unwrap();
            let mut framed = Framed::new(stream, FrameCodec::default());
            let ping = framed.next().await.unwrap().unwrap();
            assert_eq!(ping, Message::ping(31));
            drop(framed);

            // Wait for the client to notice the drop.
            loop {
                let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
                    .await
                    .expect("no disconnect event")
                    .unwrap();
                if event == ClientEvent::Disconnected {
                    break;
                }
            }
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_stops_retrying_unreachable_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (events_tx, _events_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(reconnect_loop(
            ClientConfig::new("127.0.0.1", port, 1),
            ReconnectConfig::default(),
            events_tx,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
