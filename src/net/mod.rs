//! Completion-driven asynchronous socket layer: TCP server, TCP client,
//! and UDP peer façades over a shared readiness multiplexer.

pub(crate) mod context;
pub(crate) mod driver;
pub(crate) mod poller;
pub(crate) mod sock;
pub(crate) mod worker;

pub mod tcp_client;
pub mod tcp_server;
pub mod udp_peer;

use std::net::SocketAddrV4;

/// Callbacks delivered by a [`TcpServer`](tcp_server::TcpServer).
///
/// All callbacks run on worker threads and must return quickly; hand long
/// work to a [`WorkQueue`](crate::work_queue::WorkQueue). Receive buffers
/// are valid only until the callback returns. A `sock_id` is stable while
/// its socket is active and may be reused after close.
pub trait TcpServerEvents: Send + Sync + 'static {
    /// A new connection was accepted.
    fn on_connected(&self, sock_id: u32);
    /// Data arrived on a connection.
    fn on_received(&self, sock_id: u32, data: &[u8]);
    /// The connection closed or failed; fired at most once per socket, and
    /// never for sockets closed via `close_socket`.
    fn on_disconnected(&self, sock_id: u32);
}

/// Callbacks delivered by a [`TcpClient`](tcp_client::TcpClient).
pub trait TcpClientEvents: Send + Sync + 'static {
    fn on_received(&self, sock_id: u32, data: &[u8]);
    fn on_disconnected(&self, sock_id: u32);
}

/// Callbacks delivered by a [`UdpPeer`](udp_peer::UdpPeer).
pub trait UdpPeerEvents: Send + Sync + 'static {
    /// A datagram arrived; zero-length datagrams are delivered as-is.
    fn on_received_from(&self, sock_id: u32, data: &[u8], src_addr: SocketAddrV4);
}
