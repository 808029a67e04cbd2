//! Integration tests: TCP echo, disconnect detection, pool accounting,
//! and stop semantics over real loopback connections.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use litenet::{Config, ConfigBuilder, TcpClient, TcpClientEvents, TcpServer, TcpServerEvents};

// ── Event plumbing ──────────────────────────────────────────────────

#[derive(Debug)]
enum ServerEv {
    Connected(u32),
    Received(u32, Vec<u8>),
    Disconnected(u32),
}

struct ServerProbe {
    tx: Sender<ServerEv>,
}

impl TcpServerEvents for ServerProbe {
    fn on_connected(&self, sock_id: u32) {
        let _ = self.tx.send(ServerEv::Connected(sock_id));
    }
    fn on_received(&self, sock_id: u32, data: &[u8]) {
        let _ = self.tx.send(ServerEv::Received(sock_id, data.to_vec()));
    }
    fn on_disconnected(&self, sock_id: u32) {
        let _ = self.tx.send(ServerEv::Disconnected(sock_id));
    }
}

#[derive(Debug)]
enum ClientEv {
    Received(u32, Vec<u8>),
    Disconnected(u32),
}

struct ClientProbe {
    tx: Sender<ClientEv>,
}

impl TcpClientEvents for ClientProbe {
    fn on_received(&self, sock_id: u32, data: &[u8]) {
        let _ = self.tx.send(ClientEv::Received(sock_id, data.to_vec()));
    }
    fn on_disconnected(&self, sock_id: u32) {
        let _ = self.tx.send(ClientEv::Disconnected(sock_id));
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn test_config() -> Config {
    ConfigBuilder::new().worker_threads(2).build().unwrap()
}

/// Find an available port by binding to :0.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn start_server(config: Config) -> (TcpServer, Receiver<ServerEv>, u16) {
    let port = free_port();
    let (tx, rx) = unbounded();
    let mut server = TcpServer::with_config(config);
    server
        .init(Arc::new(ServerProbe { tx }), port, Some("127.0.0.1"))
        .expect("server init failed");
    server.start().expect("server start failed");
    (server, rx, port)
}

fn start_client(config: Config) -> (TcpClient, Receiver<ClientEv>) {
    let (tx, rx) = unbounded();
    let mut client = TcpClient::with_config(config);
    client
        .init(Arc::new(ClientProbe { tx }))
        .expect("client init failed");
    client.start().expect("client start failed");
    (client, rx)
}

const WAIT: Duration = Duration::from_secs(5);

fn expect_connected(rx: &Receiver<ServerEv>) -> u32 {
    loop {
        match rx.recv_timeout(WAIT).expect("no server event") {
            ServerEv::Connected(id) => return id,
            other => panic!("expected Connected, got {other:?}"),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn tcp_echo_round_trip_and_server_close() {
    let (server, server_rx, port) = start_server(test_config());
    let (client, client_rx) = start_client(test_config());

    let client_id = client.connect("127.0.0.1", port).expect("connect failed");
    let server_id = expect_connected(&server_rx);

    // Client → server.
    client.send(client_id, b"hello").expect("client send failed");
    match server_rx.recv_timeout(WAIT).expect("no receive at server") {
        ServerEv::Received(id, data) => {
            assert_eq!(id, server_id);
            assert_eq!(data, b"hello");
            // Echo back.
            server.send(id, &data).expect("server send failed");
        }
        other => panic!("expected Received, got {other:?}"),
    }

    // Server → client.
    match client_rx.recv_timeout(WAIT).expect("no receive at client") {
        ClientEv::Received(id, data) => {
            assert_eq!(id, client_id);
            assert_eq!(data, b"hello");
        }
        other => panic!("expected Received, got {other:?}"),
    }

    // Server-side close surfaces as the client's disconnect, exactly once.
    server.close_socket(server_id);
    match client_rx.recv_timeout(WAIT).expect("no disconnect at client") {
        ClientEv::Disconnected(id) => assert_eq!(id, client_id),
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert!(
        client_rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "duplicate client event after disconnect"
    );

    drop(client);
    drop(server);
}

#[test]
fn sequential_messages_arrive_in_order() {
    let (server, server_rx, port) = start_server(test_config());
    let (client, _client_rx) = start_client(test_config());

    let client_id = client.connect("127.0.0.1", port).expect("connect failed");
    let _server_id = expect_connected(&server_rx);

    let mut sent = Vec::new();
    for i in 0..20u32 {
        let msg = format!("msg-{i:03}");
        client.send(client_id, msg.as_bytes()).expect("send failed");
        sent.push(msg.into_bytes());
    }

    // Byte stream order must match wire order even if the OS coalesces
    // segments.
    let expected: Vec<u8> = sent.concat();
    let mut received = Vec::new();
    while received.len() < expected.len() {
        match server_rx.recv_timeout(WAIT).expect("missing data at server") {
            ServerEv::Received(_, data) => received.extend_from_slice(&data),
            ServerEv::Connected(_) => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(received, expected);

    drop(client);
    drop(server);
}

#[test]
fn immediate_server_close_is_detected_fast() {
    let (server, server_rx, port) = start_server(test_config());
    let (client, client_rx) = start_client(test_config());

    let client_id = client.connect("127.0.0.1", port).expect("connect failed");
    let server_id = expect_connected(&server_rx);

    // Close as soon as the connection is known.
    server.close_socket(server_id);
    let start = Instant::now();
    match client_rx.recv_timeout(WAIT).expect("no disconnect at client") {
        ClientEv::Disconnected(id) => assert_eq!(id, client_id),
        ClientEv::Received(_, data) => {
            panic!("unexpected receive ({} bytes) instead of disconnect", data.len())
        }
    }
    // One worker-timeout window is the contract; events usually land in
    // milliseconds.
    assert!(start.elapsed() < Duration::from_millis(1500));

    drop(client);
    drop(server);
}

#[test]
fn pool_saturation_returns_all_contexts() {
    let config = ConfigBuilder::new()
        .worker_threads(2)
        .io_pool_size(4)
        .build()
        .unwrap();
    let (server, server_rx, port) = start_server(config.clone());
    let (client, client_rx) = start_client(config);

    let mut client_ids = Vec::new();
    for _ in 0..10 {
        client_ids.push(client.connect("127.0.0.1", port).expect("connect failed"));
    }

    // One message per connection; the server echoes each.
    for (i, id) in client_ids.iter().enumerate() {
        client
            .send(*id, format!("m{i}").as_bytes())
            .expect("send failed");
    }

    let mut echoed = 0;
    let deadline = Instant::now() + WAIT;
    while echoed < 10 && Instant::now() < deadline {
        match server_rx.recv_timeout(WAIT).expect("server event missing") {
            ServerEv::Received(id, data) => {
                server.send(id, &data).expect("echo failed");
                echoed += 1;
            }
            ServerEv::Connected(_) => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(echoed, 10);

    let mut client_got = 0;
    while client_got < 10 {
        match client_rx.recv_timeout(WAIT).expect("echo missing at client") {
            ClientEv::Received(_, _) => client_got += 1,
            other => panic!("unexpected event {other:?}"),
        }
    }

    // Let the last send completions drain back into the pools.
    std::thread::sleep(Duration::from_millis(300));

    for facade_stats in [
        (server.io_in_flight(), server.io_idle()),
        (client.io_in_flight(), client.io_idle()),
    ] {
        let (in_flight, idle) = facade_stats;
        assert_eq!(in_flight, 0, "contexts leaked");
        assert!(idle <= 4, "idle list exceeded pool capacity: {idle}");
    }

    drop(client);
    drop(server);
}

#[test]
fn no_callbacks_after_stop() {
    let (mut server, server_rx, port) = start_server(test_config());
    let (client, client_rx) = start_client(test_config());

    let client_id = client.connect("127.0.0.1", port).expect("connect failed");
    let _ = expect_connected(&server_rx);
    client.send(client_id, b"ping").expect("send failed");

    // Stop both ends; workers are joined before stop returns.
    let mut client = client;
    client.stop();
    server.stop();

    // Drain anything delivered before the stop completed.
    while server_rx.try_recv().is_ok() {}
    while client_rx.try_recv().is_ok() {}

    std::thread::sleep(Duration::from_millis(400));
    assert!(server_rx.try_recv().is_err(), "server callback after stop");
    assert!(client_rx.try_recv().is_err(), "client callback after stop");

    // Pools drained on teardown.
    assert_eq!(server.io_in_flight(), 0);
    assert_eq!(client.io_in_flight(), 0);
}

#[test]
fn send_on_closed_socket_fails_cleanly() {
    let (server, server_rx, port) = start_server(test_config());
    let (client, client_rx) = start_client(test_config());

    let client_id = client.connect("127.0.0.1", port).expect("connect failed");
    let _ = expect_connected(&server_rx);

    client.close_socket(client_id);
    assert!(client.send(client_id, b"late").is_err());

    // Local close delivers no disconnect callback.
    assert!(client_rx.recv_timeout(Duration::from_millis(300)).is_err());

    drop(client);
    drop(server);
}
