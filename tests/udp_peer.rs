//! Integration tests: UDP peer over real loopback sockets.

use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use litenet::{ConfigBuilder, UdpPeer, UdpPeerEvents};

struct UdpProbe {
    tx: Sender<(u32, Vec<u8>, SocketAddrV4)>,
}

impl UdpPeerEvents for UdpProbe {
    fn on_received_from(&self, sock_id: u32, data: &[u8], src_addr: SocketAddrV4) {
        let _ = self.tx.send((sock_id, data.to_vec(), src_addr));
    }
}

const WAIT: Duration = Duration::from_secs(5);

fn start_peer() -> (UdpPeer, Receiver<(u32, Vec<u8>, SocketAddrV4)>) {
    let (tx, rx) = unbounded();
    let mut peer = UdpPeer::with_config(
        ConfigBuilder::new().worker_threads(2).build().unwrap(),
    );
    peer.init(Arc::new(UdpProbe { tx })).expect("init failed");
    peer.start().expect("start failed");
    (peer, rx)
}

#[test]
fn ephemeral_bind_reports_real_port() {
    let (peer, _rx) = start_peer();
    let (sock_id, port) = peer.create("*", 0).expect("create failed");
    assert_ne!(port, 0);
    assert_ne!(sock_id, 0);
    let (_id2, port2) = peer.create("*", 0).expect("second create failed");
    assert_ne!(port2, port);
    drop(peer);
}

#[test]
fn datagram_round_trip_carries_source_address() {
    let (peer, rx) = start_peer();

    let (sender_id, sender_port) = peer.create("*", 0).expect("sender create failed");
    let (receiver_id, receiver_port) = peer.create("*", 0).expect("receiver create failed");

    let payload: Vec<u8> = (0u8..16).collect();
    peer.send_to(sender_id, &payload, "127.0.0.1", receiver_port)
        .expect("send_to failed");

    let (got_id, got_data, src_addr) = rx.recv_timeout(WAIT).expect("datagram not delivered");
    assert_eq!(got_id, receiver_id);
    assert_eq!(got_data, payload);
    assert_eq!(got_data.len(), 16);
    // The source address names the sending socket's bound port.
    assert_eq!(src_addr.port(), sender_port);

    drop(peer);
}

#[test]
fn sendto_with_preformed_sockaddr() {
    let (peer, rx) = start_peer();

    let (sender_id, _sender_port) = peer.create("127.0.0.1", 0).expect("sender create failed");
    let (receiver_id, receiver_port) =
        peer.create("127.0.0.1", 0).expect("receiver create failed");

    let dst = SocketAddrV4::new("127.0.0.1".parse().unwrap(), receiver_port);
    peer.send_to_addr(sender_id, b"addr-form", dst)
        .expect("send_to_addr failed");

    let (got_id, got_data, _src) = rx.recv_timeout(WAIT).expect("datagram not delivered");
    assert_eq!(got_id, receiver_id);
    assert_eq!(got_data, b"addr-form");

    drop(peer);
}

#[test]
fn closed_socket_rejects_sendto() {
    let (peer, _rx) = start_peer();
    let (sock_id, _port) = peer.create("*", 0).expect("create failed");
    peer.close_socket(sock_id);
    assert!(
        peer.send_to(sock_id, b"x", "127.0.0.1", 9)
            .is_err()
    );
    drop(peer);
}

#[test]
fn create_before_start_is_rejected() {
    let (tx, _rx) = unbounded();
    let mut peer = UdpPeer::new();
    peer.init(Arc::new(UdpProbe { tx })).unwrap();
    assert!(peer.create("*", 0).is_err());
}
