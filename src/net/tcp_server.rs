//! Completion-driven TCP server façade.

use std::net::SocketAddrV4;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::net::TcpServerEvents;
use crate::net::context::SocketContext;
use crate::net::driver::{Driver, Sink, WorkerKind};
use crate::net::poller::Interest;
use crate::net::sock;

/// Asynchronous TCP server.
///
/// Lifecycle: [`init`](TcpServer::init) registers the callbacks and builds
/// the listener, pools, and worker shells; [`start`](TcpServer::start)
/// spawns the workers and primes the accept pipeline;
/// [`stop`](TcpServer::stop) joins the workers and closes every socket
/// including the listener; [`deinit`](TcpServer::deinit) releases
/// everything. Callbacks run on worker threads.
///
/// ```no_run
/// use std::sync::Arc;
/// use litenet::{TcpServer, TcpServerEvents};
///
/// struct Echo;
///
/// impl TcpServerEvents for Echo {
///     fn on_connected(&self, _sock_id: u32) {}
///     fn on_received(&self, _sock_id: u32, _data: &[u8]) {}
///     fn on_disconnected(&self, _sock_id: u32) {}
/// }
///
/// let mut server = TcpServer::new();
/// server.init(Arc::new(Echo), 17011, Some("*")).unwrap();
/// server.start().unwrap();
/// ```
pub struct TcpServer {
    driver: Option<Driver>,
    listener: Option<Arc<SocketContext>>,
    config: Config,
    logger: Option<Arc<Logger>>,
}

impl Default for TcpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpServer {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        TcpServer {
            driver: None,
            listener: None,
            config,
            logger: None,
        }
    }

    /// Attach a logger for lifecycle and error messages.
    pub fn set_logger(&mut self, logger: Option<Arc<Logger>>) {
        self.logger = logger;
    }

    /// Register callbacks and create the listener.
    ///
    /// `host_ip` accepts a dotted quad, `"*"` for all interfaces, or
    /// `None` for the local hostname's first resolved address (loopback on
    /// failure). No partial state survives a failure.
    pub fn init(
        &mut self,
        events: Arc<dyn TcpServerEvents>,
        listen_port: u16,
        host_ip: Option<&str>,
    ) -> Result<()> {
        if self.driver.is_some() {
            return Err(Error::Logic("server already initialized".into()));
        }
        let driver = Driver::init(
            WorkerKind::Tcp,
            Sink::Server(events),
            self.config.clone(),
            self.logger.clone(),
        )?;

        let ip = match host_ip {
            Some(ip) => sock::parse_ip(ip)?,
            None => sock::local_host_ip(),
        };
        let listen_addr = SocketAddrV4::new(ip, listen_port);

        let fd = sock::tcp_socket(true)?;
        sock::set_reuse_addr(fd);
        if let Err(e) = sock::bind(fd, listen_addr).and_then(|_| sock::listen(fd)) {
            sock::close(fd);
            return Err(e);
        }

        let listener = driver.shared.sock_pool.get();
        listener.activate(fd, listen_addr, true);
        driver.shared.sock_pool.add_active(listener.clone());

        if let Some(logger) = &self.logger {
            logger.info(&format!("tcp server listening on {listen_addr}"));
        }
        self.listener = Some(listener);
        self.driver = Some(driver);
        Ok(())
    }

    /// Spawn the workers and arm the accept pipeline. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        let driver = self
            .driver
            .as_mut()
            .ok_or_else(|| Error::Logic("start before init".into()))?;
        if driver.is_started() {
            return Ok(());
        }
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| Error::Logic("start before init".into()))?;
        if listener.fd() < 0 {
            return Err(Error::Logic(
                "listener closed by stop; re-init required".into(),
            ));
        }
        driver.start()?;
        driver
            .shared
            .poller
            .add(listener.fd(), listener.sock_id(), Interest::READABLE)
    }

    /// Queue `data` for asynchronous delivery to a connection.
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

    /// Stop the workers and close every socket, the listener included.
    /// No callbacks fire after this returns.
    pub fn stop(&mut self) {
        if let Some(driver) = &mut self.driver {
            driver.stop();
        }
    }

    /// Tear everything down; the server may be re-initialized afterwards.
    pub fn deinit(&mut self) {
        self.stop();
        self.listener = None;
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

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.deinit();
    }
}
