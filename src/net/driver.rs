//! Shared engine behind the three socket façades: the multiplexer, both
//! pools, the worker threads, and the send/close entry points.

use std::net::SocketAddrV4;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{Config, MAX_IO_BUFFER_SIZE, WORKER_THREADS_PER_PROCESSOR};
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::metrics;
use crate::net::context::{IoContextPool, IoOp, SocketContext, SocketContextPool};
use crate::net::poller::{Interest, Poller};
use crate::net::{TcpClientEvents, TcpServerEvents, UdpPeerEvents, worker};
use crate::thread::{STOP_WAIT_INFINITE, Thread};

/// Transport flavor of a façade's workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerKind {
    Tcp,
    Udp,
}

/// The façade's callback surface, dispatched by workers. User callback
/// panics are contained so they terminate only that completion's dispatch.
pub(crate) enum Sink {
    Server(Arc<dyn TcpServerEvents>),
    Client(Arc<dyn TcpClientEvents>),
    Udp(Arc<dyn UdpPeerEvents>),
}

impl Sink {
    pub fn on_connected(&self, sock_id: u32) {
        if let Sink::Server(events) = self {
            let _ = catch_unwind(AssertUnwindSafe(|| events.on_connected(sock_id)));
        }
    }

    pub fn on_received(&self, sock_id: u32, data: &[u8]) {
        match self {
            Sink::Server(events) => {
                let _ = catch_unwind(AssertUnwindSafe(|| events.on_received(sock_id, data)));
            }
            Sink::Client(events) => {
                let _ = catch_unwind(AssertUnwindSafe(|| events.on_received(sock_id, data)));
            }
            Sink::Udp(_) => {}
        }
    }

    pub fn on_received_from(&self, sock_id: u32, data: &[u8], src_addr: SocketAddrV4) {
        if let Sink::Udp(events) = self {
            let _ = catch_unwind(AssertUnwindSafe(|| {
                events.on_received_from(sock_id, data, src_addr)
            }));
        }
    }

    pub fn on_disconnected(&self, sock_id: u32) {
        match self {
            Sink::Server(events) => {
                let _ = catch_unwind(AssertUnwindSafe(|| events.on_disconnected(sock_id)));
            }
            Sink::Client(events) => {
                let _ = catch_unwind(AssertUnwindSafe(|| events.on_disconnected(sock_id)));
            }
            Sink::Udp(_) => {}
        }
    }
}

/// State shared between the façade and its workers.
pub(crate) struct Shared {
    pub poller: Poller,
    pub io_pool: Arc<IoContextPool>,
    pub sock_pool: SocketContextPool,
    pub sink: Sink,
    pub kind: WorkerKind,
    pub config: Config,
    pub logger: Option<Arc<Logger>>,
    pub started: AtomicBool,
}

impl Shared {
    pub fn log_info(&self, text: &str) {
        if let Some(logger) = &self.logger {
            logger.info(text);
        }
    }

    pub fn log_error(&self, text: &str) {
        if let Some(logger) = &self.logger {
            logger.error(text);
        }
    }
}

/// Remove a socket from the active map and deliver the disconnect
/// notification. `del_active`'s return makes the callback at-most-once.
pub(crate) fn disconnect(shared: &Shared, sock_id: u32) {
    if shared.sock_pool.del_active(sock_id) {
        shared.sink.on_disconnected(sock_id);
    }
}

/// Owns the pools, multiplexer, and worker threads of one façade.
pub(crate) struct Driver {
    pub shared: Arc<Shared>,
    workers: Vec<Thread>,
}

impl Driver {
    pub fn init(
        kind: WorkerKind,
        sink: Sink,
        config: Config,
        logger: Option<Arc<Logger>>,
    ) -> Result<Driver> {
        config.validate()?;
        let poller = Poller::new()?;
        let io_pool = Arc::new(IoContextPool::new(config.io_pool_size));
        let sock_pool = SocketContextPool::new(io_pool.clone(), config.socket_pool_size());

        let worker_count = if config.worker_threads == 0 {
            WORKER_THREADS_PER_PROCESSOR * num_cpus()
        } else {
            config.worker_threads
        };
        let prefix = match kind {
            WorkerKind::Tcp => "tcp",
            WorkerKind::Udp => "udp",
        };
        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let mut thread = Thread::new(format!("litenet-{prefix}-worker-{i}"));
            thread.set_logger(logger.clone());
            workers.push(thread);
        }

        Ok(Driver {
            shared: Arc::new(Shared {
                poller,
                io_pool,
                sock_pool,
                sink,
                kind,
                config,
                logger,
                started: AtomicBool::new(false),
            }),
            workers,
        })
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::Acquire)
    }

    /// Spawn the worker threads. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }
        for thread in &mut self.workers {
            let shared = self.shared.clone();
            thread.start(move |token| worker::run(&shared, token))?;
        }
        self.shared.started.store(true, Ordering::Release);
        Ok(())
    }

    /// Signal every worker, join them, then tear down all active sockets.
    /// After this returns no further callbacks fire.
    pub fn stop(&mut self) {
        if !self.is_started() {
            return;
        }
        self.shared.started.store(false, Ordering::Release);
        for thread in &self.workers {
            thread.signal();
        }
        for thread in &mut self.workers {
            thread.stop(STOP_WAIT_INFINITE);
        }
        self.shared.sock_pool.clear_active();
    }

    /// Queue `data` for asynchronous delivery on `sock_id`. For UDP, `dst`
    /// carries the destination address.
    pub fn send(&self, sock_id: u32, data: &[u8], dst: Option<SocketAddrV4>) -> Result<()> {
        if !self.is_started() {
            return Err(Error::Logic("send before start".into()));
        }
        if data.len() > MAX_IO_BUFFER_SIZE {
            return Err(Error::invalid(format!(
                "message of {} bytes exceeds the {MAX_IO_BUFFER_SIZE}-byte I/O buffer",
                data.len()
            )));
        }
        let shell = self
            .shared
            .sock_pool
            .get_active(sock_id)
            .ok_or_else(|| Error::invalid(format!("unknown sock_id {sock_id}")))?;

        let mut context = self.shared.io_pool.get();
        context.op = IoOp::Send;
        context.buf[..data.len()].copy_from_slice(data);
        context.len = data.len();
        context.transferred = 0;
        if let Some(dst) = dst {
            context.peer_addr = dst;
        }

        // Queue and arm under the send-queue lock: a concurrent close
        // either drains this context on reset or is visible here.
        let mut context = Some(context);
        let queue_arm = {
            let mut queue = shell.send_queue.lock().unwrap();
            if shell.is_closed() {
                None
            } else {
                queue.push_back(context.take().unwrap());
                Some(shell.fd())
            }
        };
        let Some(fd) = queue_arm else {
            // Context was never queued; hand it straight back.
            self.shared.io_pool.put(context.take().unwrap());
            return Err(Error::invalid(format!("sock_id {sock_id} is closed")));
        };

        // Writable-only arm: never re-enables readable interest a worker
        // may be mid-dispatch on; the worker's re-arm restores it.
        let _ = self
            .shared
            .poller
            .modify(fd, sock_id, Interest { readable: false, writable: true });
        Ok(())
    }

    /// Close one socket. Synchronous from the caller's view; later events
    /// for the id resolve to a stale lookup and are discarded.
    pub fn close_socket(&self, sock_id: u32) {
        self.shared.sock_pool.del_active(sock_id);
    }

    /// Register a freshly activated socket and arm its first receive.
    pub fn register_socket(&self, shell: &Arc<SocketContext>) -> Result<()> {
        self.shared.sock_pool.add_active(shell.clone());
        metrics::CONNECTIONS_OPENED.increment();
        self.shared
            .poller
            .add(shell.fd(), shell.sock_id(), Interest::READABLE)
    }

    /// Outstanding I/O contexts (for pool accounting).
    pub fn io_in_flight(&self) -> usize {
        self.shared.io_pool.in_flight()
    }

    /// Idle I/O contexts resting in the pool.
    pub fn io_idle(&self) -> usize {
        self.shared.io_pool.idle_len()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Number of online processors.
pub(crate) fn num_cpus() -> usize {
    let ret = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if ret < 1 { 1 } else { ret as usize }
}
