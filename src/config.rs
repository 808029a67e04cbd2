//! Runtime configuration for the socket façades.

/// Fixed per-operation I/O buffer size in bytes.
pub const MAX_IO_BUFFER_SIZE: usize = 4096;

/// Worker threads spawned per processor when `worker_threads` is 0.
pub const WORKER_THREADS_PER_PROCESSOR: usize = 2;

/// Default I/O context pool capacity. The socket-shell idle capacity is
/// always twice this.
pub const MEM_POOL_SIZE: usize = 1000;

/// TCP worker completion-dequeue timeout in milliseconds.
pub const TCP_DEQUEUE_TIMEOUT_MS: u32 = 500;

/// UDP worker completion-dequeue timeout in milliseconds.
pub const UDP_DEQUEUE_TIMEOUT_MS: u32 = 50;

/// Stack size for toolkit threads, in bytes.
pub const THREAD_STACK_SIZE: usize = 20 * 1024;

/// Configuration for a socket façade (TCP server, TCP client, UDP peer).
#[derive(Clone)]
pub struct Config {
    /// Number of worker threads. 0 = `WORKER_THREADS_PER_PROCESSOR × cpus`.
    pub worker_threads: usize,
    /// Capacity of the I/O context pool. Contexts beyond this are freed on
    /// release instead of being retained.
    pub io_pool_size: usize,
    /// Enable TCP_NODELAY on accepted and outbound connections.
    pub tcp_nodelay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            io_pool_size: MEM_POOL_SIZE,
            tcp_nodelay: true,
        }
    }
}

impl Config {
    /// Validate configuration values.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.io_pool_size == 0 {
            return Err(crate::error::Error::invalid("io_pool_size must be > 0"));
        }
        if self.worker_threads > 1024 {
            return Err(crate::error::Error::invalid(
                "worker_threads must be <= 1024",
            ));
        }
        Ok(())
    }

    /// Socket-shell idle-list capacity derived from the I/O pool size.
    pub(crate) fn socket_pool_size(&self) -> usize {
        2 * self.io_pool_size
    }
}

/// Builder for [`Config`] with discoverable methods and `build()` validation.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default config values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads. 0 = `2 × cpus`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.config.worker_threads = n;
        self
    }

    /// Set the I/O context pool capacity.
    pub fn io_pool_size(mut self, n: usize) -> Self {
        self.config.io_pool_size = n;
        self
    }

    /// Enable or disable TCP_NODELAY on connections.
    pub fn tcp_nodelay(mut self, enable: bool) -> Self {
        self.config.tcp_nodelay = enable;
        self
    }

    /// Validate and build the final [`Config`].
    pub fn build(self) -> crate::error::Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn builder_rejects_zero_pool() {
        assert!(ConfigBuilder::new().io_pool_size(0).build().is_err());
    }

    #[test]
    fn socket_pool_is_twice_io_pool() {
        let config = ConfigBuilder::new().io_pool_size(4).build().unwrap();
        assert_eq!(config.socket_pool_size(), 8);
    }
}
