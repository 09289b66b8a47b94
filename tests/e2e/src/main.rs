fn main() {
    println!("Run `cargo test -p pulselink-e2e` to execute the end-to-end tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::BytesMut;
    use pulselink_client::{ClientConfig, ClientEvent, HeartbeatClient};
    use pulselink_protocol::constants::PONG_SENTINEL_ID;
    use pulselink_protocol::{ConnectionId, FrameCodec, Framing, Message, wire};
    use pulselink_server::{
        ConnectionHandle, Handler, HandlerFuture, HeartbeatServer, ServerConfig,
    };
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio_util::codec::{Decoder, Encoder};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_fixture(name: &str) -> Vec<u8> {
        let path = fixtures_dir().join(name);
        fs::read(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<Message>>,
        disconnects: Mutex<u32>,
    }

    impl Recorder {
        fn saw(&self, msg: &Message) -> bool {
            self.messages.lock().unwrap().contains(msg)
        }

        fn disconnects(&self) -> u32 {
            *self.disconnects.lock().unwrap()
        }
    }

    impl Handler for Recorder {
        fn on_message(&self, _conn: ConnectionHandle, msg: Message) -> HandlerFuture<'_> {
            self.messages.lock().unwrap().push(msg);
            Box::pin(async {})
        }

        fn on_disconnected(&self, _conn: ConnectionHandle) -> HandlerFuture<'_> {
            *self.disconnects.lock().unwrap() += 1;
            Box::pin(async {})
        }
    }

    struct Running {
        server: Arc<HeartbeatServer<Recorder>>,
        handle: JoinHandle<()>,
        port: u16,
    }

    impl Running {
        async fn stop(self) {
            self.server.shutdown();
            self.handle.await.unwrap();
        }
    }

    async fn start_server(read_idle: Duration, framing: Framing) -> Running {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            read_idle,
            poll_granularity: Duration::from_millis(10),
            framing,
            ..ServerConfig::default()
        };
        let server = HeartbeatServer::new(config, Recorder::default());
        let server_run = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            server_run.run().await.unwrap();
        });

        let port = loop {
            let p = server.port().await;
            if p > 0 {
                break p;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        Running {
            server,
            handle,
            port,
        }
    }

    fn client_config(port: u16, id: u64, write_idle: Duration) -> ClientConfig {
        ClientConfig {
            write_idle,
            poll_granularity: Duration::from_millis(10),
            ..ClientConfig::new("127.0.0.1", port, id)
        }
    }

    async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
        let reached = tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(reached.is_ok(), "timed out waiting for {what}");
    }

    async fn wait_for_message(events: &mut mpsc::Receiver<ClientEvent>, expected: &Message) {
        let found = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = events.recv().await {
                if event == ClientEvent::Message(expected.clone()) {
                    return true;
                }
            }
            false
        })
        .await;
        assert!(matches!(found, Ok(true)), "client never received {expected}");
    }

    // -----------------------------------------------------------------------
    // Heartbeats
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn client_ping_reaches_server() {
        let running = start_server(Duration::from_secs(30), Framing::LengthPrefixed).await;
        let client = HeartbeatClient::connect(&client_config(
            running.port,
            1001,
            Duration::from_millis(100),
        ))
        .await
        .unwrap();

        let server = &running.server;
        wait_until("ping from 1001", || server.handler().saw(&Message::ping(1001))).await;
        assert!(server.registry().get(ConnectionId(1001)).is_some());

        client.close().await;
        running.stop().await;
    }

    #[tokio::test]
    async fn server_pong_reaches_quiet_client() {
        let running = start_server(Duration::from_millis(100), Framing::LengthPrefixed).await;
        let client = HeartbeatClient::connect(&client_config(running.port, 7, Duration::ZERO))
            .await
            .unwrap();
        let mut events = client.take_events().unwrap();

        let pong = Message::new(PONG_SENTINEL_ID, "pong");
        wait_for_message(&mut events, &pong).await;

        client.close().await;
        running.stop().await;
    }

    #[tokio::test]
    async fn legacy_framing_interop() {
        let running = start_server(Duration::from_secs(30), Framing::Legacy).await;
        let config = ClientConfig {
            framing: Framing::Legacy,
            ..client_config(running.port, 55, Duration::from_millis(100))
        };
        let client = HeartbeatClient::connect(&config).await.unwrap();

        let server = &running.server;
        wait_until("legacy ping", || server.handler().saw(&Message::ping(55))).await;

        client.close().await;
        running.stop().await;
    }

    // -----------------------------------------------------------------------
    // Registry and addressing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn reconnect_replaces_entry_and_stale_close_keeps_it() {
        let running = start_server(Duration::from_secs(30), Framing::LengthPrefixed).await;
        let server = &running.server;
        let id = ConnectionId(5);

        let first = HeartbeatClient::connect(&client_config(running.port, 5, Duration::from_secs(60)))
            .await
            .unwrap();
        first.send("hello").unwrap();
        wait_until("first registration", || server.registry().get(id).is_some()).await;
        let old = server.registry().get(id).unwrap();

        let second =
            HeartbeatClient::connect(&client_config(running.port, 5, Duration::from_secs(60)))
                .await
                .unwrap();
        second.send("hello again").unwrap();
        wait_until("replacement", || {
            server.registry().get(id).is_some_and(|c| c != old)
        })
        .await;
        let current = server.registry().get(id).unwrap();

        first.close().await;
        wait_until("stale disconnect", || server.handler().disconnects() == 1).await;
        assert_eq!(server.registry().get(id), Some(current));
        assert_eq!(server.registry().len(), 1);

        second.close().await;
        wait_until("final removal", || server.registry().is_empty()).await;

        running.stop().await;
    }

    #[tokio::test]
    async fn send_to_reaches_addressed_client_only() {
        let running = start_server(Duration::from_secs(30), Framing::LengthPrefixed).await;
        let server = &running.server;

        let alice = HeartbeatClient::connect(&client_config(running.port, 1, Duration::from_secs(60)))
            .await
            .unwrap();
        let bob = HeartbeatClient::connect(&client_config(running.port, 2, Duration::from_secs(60)))
            .await
            .unwrap();
        let mut alice_events = alice.take_events().unwrap();
        let mut bob_events = bob.take_events().unwrap();

        alice.send("register").unwrap();
        bob.send("register").unwrap();
        wait_until("both registered", || server.registry().len() == 2).await;

        server.send_to(ConnectionId(2), "just for bob").unwrap();
        wait_for_message(&mut bob_events, &Message::new(2, "just for bob")).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        while let Ok(event) = alice_events.try_recv() {
            assert!(
                !matches!(event, ClientEvent::Message(_)),
                "alice received {event:?}"
            );
        }

        alice.close().await;
        bob.close().await;
        running.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_clients_all_register() {
        const N: u64 = 50;
        let running = start_server(Duration::from_secs(30), Framing::LengthPrefixed).await;
        let port = running.port;

        let mut tasks = Vec::new();
        for id in 0..N {
            tasks.push(tokio::spawn(async move {
                let client =
                    HeartbeatClient::connect(&client_config(port, id, Duration::from_secs(60)))
                        .await
                        .unwrap();
                client.send("hello").unwrap();
                client
            }));
        }
        let mut clients = Vec::new();
        for task in tasks {
            clients.push(task.await.unwrap());
        }

        let server = &running.server;
        wait_until("all registrations", || server.registry().len() == N as usize).await;
        let expected: Vec<ConnectionId> = (0..N).map(ConnectionId).collect();
        assert_eq!(server.registry().ids(), expected);

        for client in &clients {
            client.close().await;
        }
        wait_until("all removals", || server.registry().is_empty()).await;
        running.stop().await;
    }

    // -----------------------------------------------------------------------
    // Wire compatibility with captured frames
    // -----------------------------------------------------------------------

    #[test]
    fn legacy_fixtures_decode() {
        let mut codec = FrameCodec::new(Framing::Legacy);

        let mut buf = BytesMut::from(&load_fixture("legacy_ping_1001.bin")[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::ping(1001)));

        let mut buf = BytesMut::from(&load_fixture("legacy_pong.bin")[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::pong()));
    }

    #[test]
    fn legacy_encoding_matches_fixture() {
        assert_eq!(
            wire::to_bytes(&Message::ping(1001)),
            load_fixture("legacy_ping_1001.bin")
        );

        let mut codec = FrameCodec::new(Framing::Legacy);
        let mut out = BytesMut::new();
        codec.encode(Message::pong(), &mut out).unwrap();
        assert_eq!(&out[..], &load_fixture("legacy_pong.bin")[..]);
    }

    #[test]
    fn length_prefixed_fixture_roundtrip() {
        let fixture = load_fixture("framed_data_1001.bin");
        let expected = Message::new(1001, "héllo");

        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&fixture[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(expected.clone()));
        assert!(buf.is_empty());

        let mut out = BytesMut::new();
        codec.encode(expected, &mut out).unwrap();
        assert_eq!(&out[..], &fixture[..]);
    }
}
