//! Completion-driven UDP peer façade (server or client role alike).

use std::net::SocketAddrV4;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::net::UdpPeerEvents;
use crate::net::driver::{Driver, Sink, WorkerKind};
use crate::net::sock;

/// Asynchronous UDP peer: any number of datagram sockets share one set of
/// worker threads, with per-datagram source addresses delivered to the
/// receive callback.
pub struct UdpPeer {
    driver: Option<Driver>,
    config: Config,
    logger: Option<Arc<Logger>>,
}

impl Default for UdpPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpPeer {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        UdpPeer {
            driver: None,
            config,
            logger: None,
        }
    }

    /// Attach a logger for lifecycle and error messages.
    pub fn set_logger(&mut self, logger: Option<Arc<Logger>>) {
        self.logger = logger;
    }

    /// Register the receive callback and build the pools and worker
    /// shells.
    pub fn init(&mut self, events: Arc<dyn UdpPeerEvents>) -> Result<()> {
        if self.driver.is_some() {
            return Err(Error::Logic("peer already initialized".into()));
        }
        self.driver = Some(Driver::init(
            WorkerKind::Udp,
            Sink::Udp(events),
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

    /// Create a datagram socket bound to `(bind_ip, bind_port)` and arm
    /// its first receive. A zero `bind_port` picks an ephemeral port;
    /// the actual port is returned alongside the `sock_id`.
    pub fn create(&self, bind_ip: &str, bind_port: u16) -> Result<(u32, u16)> {
        let driver = self
            .driver
            .as_ref()
            .ok_or_else(|| Error::Logic("create before init".into()))?;
        if !driver.is_started() {
            return Err(Error::Logic("create before start".into()));
        }
        let ip = sock::parse_ip(bind_ip)?;

        let fd = sock::udp_socket()?;
        if let Err(e) = sock::bind(fd, SocketAddrV4::new(ip, bind_port)) {
            sock::close(fd);
            return Err(e);
        }
        let bound_port = if bind_port == 0 {
            match sock::local_addr(fd) {
                Ok(addr) => addr.port(),
                Err(e) => {
                    sock::close(fd);
                    return Err(e);
                }
            }
        } else {
            bind_port
        };

        let shell = driver.shared.sock_pool.get();
        shell.activate(fd, SocketAddrV4::new(ip, bound_port), false);
        let sock_id = shell.sock_id();

        if let Err(e) = driver.register_socket(&shell) {
            driver.close_socket(sock_id);
            return Err(e);
        }
        if let Some(logger) = &self.logger {
            logger.info(&format!("udp socket {sock_id} bound to {ip}:{bound_port}"));
        }
        Ok((sock_id, bound_port))
    }

    /// Queue a datagram to `(dst_ip, dst_port)`.
    pub fn send_to(&self, sock_id: u32, data: &[u8], dst_ip: &str, dst_port: u16) -> Result<()> {
        let dst = SocketAddrV4::new(sock::parse_ip(dst_ip)?, dst_port);
        self.send_to_addr(sock_id, data, dst)
    }

    /// Queue a datagram to a pre-formed destination address.
    pub fn send_to_addr(&self, sock_id: u32, data: &[u8], dst: SocketAddrV4) -> Result<()> {
        let driver = self
            .driver
            .as_ref()
            .ok_or_else(|| Error::Logic("send before init".into()))?;
        driver.send(sock_id, data, Some(dst))
    }

    /// Close one socket.
    pub fn close_socket(&self, sock_id: u32) {
        if let Some(driver) = &self.driver {
            driver.close_socket(sock_id);
        }
    }

    /// Stop the workers and close every socket. No callbacks fire after
    /// this returns.
    pub fn stop(&mut self) {
        if let Some(driver) = &mut self.driver {
            driver.stop();
        }
    }

    /// Tear everything down; the peer may be re-initialized afterwards.
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

impl Drop for UdpPeer {
    fn drop(&mut self) {
        self.deinit();
    }
}
