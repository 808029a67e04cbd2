//! Completion-driven TCP client façade.

use std::net::SocketAddrV4;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::net::TcpClientEvents;
use crate::net::driver::{Driver, Sink, WorkerKind};
use crate::net::sock;

/// Asynchronous TCP client: any number of outbound connections share one
/// set of worker threads.
///
/// The connect itself is synchronous; once established the socket joins
/// the completion loop and receives flow through
/// [`TcpClientEvents::on_received`] until the peer closes or
/// [`close_socket`](TcpClient::close_socket) is called.
pub struct TcpClient {
    driver: Option<Driver>,
    config: Config,
    logger: Option<Arc<Logger>>,
}

impl Default for TcpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpClient {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        TcpClient {
            driver: None,
            config,
            logger: None,
        }
    }

    /// Attach a logger for lifecycle and error messages.
    pub fn set_logger(&mut self, logger: Option<Arc<Logger>>) {
        self.logger = logger;
    }

    /// Register callbacks and build the pools and worker shells.
    pub fn init(&mut self, events: Arc<dyn TcpClientEvents>) -> Result<()> {
        if self.driver.is_some() {
            return Err(Error::Logic("client already initialized".into()));
        }
        self.driver = Some(Driver::init(
            WorkerKind::Tcp,
            Sink::Client(events),
            self.config.clone(),
            self.logger.clone(),
        )?);
        Ok(())
    }

    /// Spawn the worker threads. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        self.driver
            .as_mut()
            .ok_or_else(|| Error::Logic("start before init".into()))?
            .start()
    }

    /// Open a connection to `(dst_ip, dst_port)` and arm its first
    /// receive. Returns the connection's `sock_id`. A failure at any step
    /// rolls back completely.
    pub fn connect(&self, dst_ip: &str, dst_port: u16) -> Result<u32> {
        let driver = self
            .driver
            .as_ref()
            .ok_or_else(|| Error::Logic("connect before init".into()))?;
        if !driver.is_started() {
            return Err(Error::Logic("connect before start".into()));
        }
        let peer_addr = SocketAddrV4::new(sock::parse_ip(dst_ip)?, dst_port);

        let fd = sock::tcp_socket(false)?;
        if let Err(e) = sock::connect(fd, peer_addr) {
            sock::close(fd);
            return Err(e);
        }
        if let Err(e) = sock::set_nonblocking(fd) {
            sock::close(fd);
            return Err(e);
        }
        if self.config.tcp_nodelay {
            sock::set_nodelay(fd);
        }
        let local_addr = sock::local_addr(fd).unwrap_or(peer_addr);

        let shell = driver.shared.sock_pool.get();
        shell.activate(fd, local_addr, false);
        shell.recv_ctx.lock().unwrap().peer_addr = peer_addr;
        let sock_id = shell.sock_id();

        if let Err(e) = driver.register_socket(&shell) {
            // Unregister and close; the shell returns to the idle list.
            driver.close_socket(sock_id);
            return Err(e);
        }
        if let Some(logger) = &self.logger {
            logger.info(&format!("connected {sock_id} to {peer_addr}"));
        }
        Ok(sock_id)
    }

    /// Queue `data` for asynchronous delivery on a connection.
    pub fn send(&self, sock_id: u32, data: &[u8]) -> Result<()> {
        let driver = self
            .driver
            .as_ref()
            .ok_or_else(|| Error::Logic("send before init".into()))?;
        driver.send(sock_id, data, None)
    }

    /// Close one connection. No disconnect callback is delivered for a
    /// locally initiated close.
    pub fn close_socket(&self, sock_id: u32) {
        if let Some(driver) = &self.driver {
            driver.close_socket(sock_id);
        }
    }

    /// Stop the workers and close every connection. No callbacks fire
    /// after this returns.
    pub fn stop(&mut self) {
        if let Some(driver) = &mut self.driver {
            driver.stop();
        }
    }

    /// Tear everything down; the client may be re-initialized afterwards.
    pub fn deinit(&mut self) {
        self.stop();
        self.driver = None;
    }

    /// Outstanding I/O contexts (pool accounting).
    pub fn io_in_flight(&self) -> usize {
        self.driver.as_ref().map_or(0, Driver::io_in_flight)
    }

    /// Idle I/O contexts resting in the pool.
    pub fn io_idle(&self) -> usize {
        self.driver.as_ref().map_or(0, Driver::io_idle)
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.deinit();
    }
}
