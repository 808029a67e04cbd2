//! litenet — completion-driven asynchronous socket toolkit.
//!
//! litenet provides the primitives a native networked service needs: an
//! asynchronous socket layer (TCP server, TCP client, UDP peer) whose
//! worker threads multiplex per-socket completions from one shared
//! readiness instance, built on a small concurrency substrate (events,
//! recursive mutex, named threads, timers, a work queue) and a few
//! utilities (byte-order helpers, a cursor-based byte stream, a leveled
//! logger).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use litenet::{TcpServer, TcpServerEvents};
//!
//! struct Echo {
//!     server: std::sync::OnceLock<Arc<TcpServer>>,
//! }
//!
//! impl TcpServerEvents for Echo {
//!     fn on_connected(&self, sock_id: u32) {
//!         println!("connected: {sock_id}");
//!     }
//!     fn on_received(&self, sock_id: u32, data: &[u8]) {
//!         if let Some(server) = self.server.get() {
//!             let _ = server.send(sock_id, data);
//!         }
//!     }
//!     fn on_disconnected(&self, sock_id: u32) {
//!         println!("disconnected: {sock_id}");
//!     }
//! }
//!
//! let events = Arc::new(Echo { server: std::sync::OnceLock::new() });
//! let mut server = TcpServer::new();
//! server.init(events.clone(), 17011, Some("*")).unwrap();
//! server.start().unwrap();
//! let server = Arc::new(server);
//! let _ = events.server.set(server.clone());
//! std::thread::park();
//! ```
//!
//! # Callback discipline
//!
//! All callbacks are invoked on worker threads and must return quickly;
//! receive buffers are valid only until the callback returns. Long work
//! belongs on a [`WorkQueue`].
//!
//! # Platform
//!
//! Linux. Sockets are IPv4; `"*"` binds all interfaces.

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod net;

// ── Public modules ──────────────────────────────────────────────────────
pub mod byte_order;
pub mod byte_stream;
pub mod config;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod sync;
pub mod thread;
pub mod time_fmt;
pub mod timer;
pub mod work_queue;

// ── Re-exports: socket layer ────────────────────────────────────────────

/// Asynchronous TCP client.
pub use net::tcp_client::TcpClient;
/// Asynchronous TCP server.
pub use net::tcp_server::TcpServer;
/// Asynchronous UDP peer.
pub use net::udp_peer::UdpPeer;
/// Callbacks delivered by a [`TcpClient`].
pub use net::TcpClientEvents;
/// Callbacks delivered by a [`TcpServer`].
pub use net::TcpServerEvents;
/// Callbacks delivered by a [`UdpPeer`].
pub use net::UdpPeerEvents;

// ── Re-exports: configuration ───────────────────────────────────────────

/// Façade configuration.
pub use config::Config;
/// Builder for [`Config`] with `build()` validation.
pub use config::ConfigBuilder;
/// Fixed per-operation I/O buffer size.
pub use config::MAX_IO_BUFFER_SIZE;

// ── Re-exports: substrate and utilities ─────────────────────────────────

/// Byte order applied by [`ByteStream`] typed reads and writes.
pub use byte_order::ByteOrder;
/// Growable binary buffer with typed reads and writes.
pub use byte_stream::ByteStream;
/// Toolkit errors.
pub use error::Error;
/// Toolkit result alias.
pub use error::Result;
/// Leveled console/file logger.
pub use logger::Logger;
/// Log severity.
pub use logger::Level;
/// Manual-reset signal with timed wait.
pub use sync::Event;
/// Recursive mutual-exclusion lock.
pub use sync::Mutex;
/// Named OS thread with a cooperative stop signal.
pub use thread::Thread;
/// Stop-cooperation handle passed to run functions.
pub use thread::StopToken;
/// Periodic callback timer.
pub use timer::Timer;
/// Timer resolution class.
pub use timer::TimerClass;
/// One unit of queued work.
pub use work_queue::Work;
/// Single-consumer work queue.
pub use work_queue::WorkQueue;
