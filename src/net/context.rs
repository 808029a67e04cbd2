//! Per-operation and per-socket state, and the pools that recycle them.

use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use crate::config::MAX_IO_BUFFER_SIZE;
use crate::metrics;
use crate::net::sock;

/// Operation carried by an [`IoContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum IoOp {
    Accept,
    Recv,
    Send,
    #[default]
    Idle,
}

/// State for one asynchronous operation: the I/O buffer, transfer
/// bookkeeping, the operation tag, and the peer address for UDP.
pub(crate) struct IoContext {
    pub buf: [u8; MAX_IO_BUFFER_SIZE],
    /// Valid bytes in `buf` (for sends: the total to transmit).
    pub len: usize,
    /// Bytes moved so far; for partial sends this is the resume offset.
    pub transferred: usize,
    pub op: IoOp,
    /// Datagram source or destination.
    pub peer_addr: SocketAddrV4,
    /// Accepted socket parked here between `accept` and hand-off; −1
    /// otherwise. Closed on reset if still present.
    pub accepted: RawFd,
}

impl Default for IoContext {
    fn default() -> Self {
        IoContext {
            buf: [0; MAX_IO_BUFFER_SIZE],
            len: 0,
            transferred: 0,
            op: IoOp::Idle,
            peer_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            accepted: -1,
        }
    }
}

impl IoContext {
    /// Return to the idle state, closing a still-carried accepted socket.
    pub fn reset(&mut self) {
        if self.accepted >= 0 {
            sock::close(self.accepted);
            self.accepted = -1;
        }
        self.reset_buffer();
        self.op = IoOp::Idle;
    }

    /// Clear transfer state without touching the accept slot.
    pub fn reset_buffer(&mut self) {
        self.buf.fill(0);
        self.len = 0;
        self.transferred = 0;
        self.peer_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    }

    /// The slice still to be sent.
    pub fn unsent(&self) -> &[u8] {
        &self.buf[self.transferred..self.len]
    }
}

/// Bounded reservoir of [`IoContext`]s.
///
/// `get` pops a recycled context or allocates; `put` resets the context
/// and re-admits it below capacity, freeing it otherwise.
pub(crate) struct IoContextPool {
    idle: StdMutex<Vec<Box<IoContext>>>,
    capacity: usize,
    in_flight: AtomicUsize,
}

impl IoContextPool {
    pub fn new(capacity: usize) -> Self {
        IoContextPool {
            idle: StdMutex::new(Vec::new()),
            capacity,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn get(&self) -> Box<IoContext> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let recycled = self.idle.lock().unwrap().pop();
        match recycled {
            Some(context) => context,
            None => {
                metrics::IO_POOL_ALLOCATED.increment();
                Box::new(IoContext::default())
            }
        }
    }

    pub fn put(&self, mut context: Box<IoContext>) {
        context.reset();
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        let mut idle = self.idle.lock().unwrap();
        if idle.len() < self.capacity {
            idle.push(context);
        } else {
            metrics::IO_POOL_DISCARDED.increment();
        }
    }

    /// Contexts currently checked out (gets minus puts).
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Contexts resting in the pool.
    pub fn idle_len(&self) -> usize {
        self.idle.lock().unwrap().len()
    }
}

/// Per-socket shell: the handle, its stable id, the inline receive
/// context, and the outstanding-send list.
///
/// Shells are shared (`Arc`): the active map and any worker currently
/// dispatching a completion hold them simultaneously. All mutable state is
/// behind atomics or its own lock; `reset` is idempotent.
pub(crate) struct SocketContext {
    sock: AtomicI32,
    sock_id: AtomicU32,
    is_listen: AtomicBool,
    closed: AtomicBool,
    local_addr: StdMutex<SocketAddrV4>,
    /// Inline receive context; lives for the socket's whole active life
    /// and is never moved into the send list.
    pub recv_ctx: StdMutex<IoContext>,
    /// Outstanding send contexts, in post order. Leaf lock.
    pub send_queue: StdMutex<VecDeque<Box<IoContext>>>,
    pool: Arc<IoContextPool>,
}

impl SocketContext {
    fn new(pool: Arc<IoContextPool>) -> Self {
        SocketContext {
            sock: AtomicI32::new(-1),
            sock_id: AtomicU32::new(0),
            is_listen: AtomicBool::new(false),
            closed: AtomicBool::new(true),
            local_addr: StdMutex::new(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            recv_ctx: StdMutex::new(IoContext::default()),
            send_queue: StdMutex::new(VecDeque::new()),
            pool,
        }
    }

    /// Install a live socket into this shell.
    pub fn activate(&self, fd: RawFd, local_addr: SocketAddrV4, is_listen: bool) {
        self.sock.store(fd, Ordering::Release);
        self.sock_id.store(fd as u32, Ordering::Release);
        self.is_listen.store(is_listen, Ordering::Release);
        *self.local_addr.lock().unwrap() = local_addr;
        self.closed.store(false, Ordering::Release);
    }

    pub fn fd(&self) -> RawFd {
        self.sock.load(Ordering::Acquire)
    }

    pub fn sock_id(&self) -> u32 {
        self.sock_id.load(Ordering::Acquire)
    }

    pub fn is_listen(&self) -> bool {
        self.is_listen.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn local_addr(&self) -> SocketAddrV4 {
        *self.local_addr.lock().unwrap()
    }

    pub fn set_local_addr(&self, addr: SocketAddrV4) {
        *self.local_addr.lock().unwrap() = addr;
    }

    /// Shut the socket down and return every outstanding context to the
    /// pool. Idempotent; safe while other threads still hold the shell.
    pub fn reset(&self) {
        self.closed.store(true, Ordering::Release);
        let fd = self.sock.swap(-1, Ordering::AcqRel);
        if fd >= 0 {
            sock::shutdown_send(fd);
            sock::close(fd);
        }
        self.sock_id.store(0, Ordering::Release);
        *self.local_addr.lock().unwrap() = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);

        // A worker mid-dispatch owns the recv context lock; its buffer
        // contents are irrelevant once the fd is gone, so skip it then.
        if let Ok(mut recv_ctx) = self.recv_ctx.try_lock() {
            recv_ctx.reset();
        }

        let drained: Vec<Box<IoContext>> =
            self.send_queue.lock().unwrap().drain(..).collect();
        for context in drained {
            self.pool.put(context);
        }
    }
}

/// Two-part shell reservoir: an idle list of reusable shells and the
/// active map keyed by `sock_id`. Lock order: active, then idle.
pub(crate) struct SocketContextPool {
    idle: StdMutex<Vec<Arc<SocketContext>>>,
    active: StdMutex<HashMap<u32, Arc<SocketContext>>>,
    capacity: usize,
    io_pool: Arc<IoContextPool>,
}

impl SocketContextPool {
    pub fn new(io_pool: Arc<IoContextPool>, capacity: usize) -> Self {
        SocketContextPool {
            idle: StdMutex::new(Vec::new()),
            active: StdMutex::new(HashMap::new()),
            capacity,
            io_pool,
        }
    }

    /// Obtain a reset shell, reusing an idle one when available.
    pub fn get(&self) -> Arc<SocketContext> {
        if let Some(shell) = self.idle.lock().unwrap().pop() {
            return shell;
        }
        Arc::new(SocketContext::new(self.io_pool.clone()))
    }

    /// Re-admit a reset shell below capacity.
    pub fn put(&self, shell: Arc<SocketContext>) {
        let mut idle = self.idle.lock().unwrap();
        if idle.len() < self.capacity {
            idle.push(shell);
        }
    }

    pub fn add_active(&self, shell: Arc<SocketContext>) {
        let sock_id = shell.sock_id();
        self.active.lock().unwrap().insert(sock_id, shell);
        metrics::CONNECTIONS_ACTIVE.increment();
    }

    pub fn get_active(&self, sock_id: u32) -> Option<Arc<SocketContext>> {
        self.active.lock().unwrap().get(&sock_id).cloned()
    }

    /// Snapshot of the active shells, for the liveness probe.
    pub fn active_snapshot(&self) -> Vec<Arc<SocketContext>> {
        self.active.lock().unwrap().values().cloned().collect()
    }

    /// Atomically unregister `sock_id`, reset the shell (returning its
    /// outstanding contexts), and re-admit it. Returns false if the id was
    /// not active — callers rely on this for at-most-once disconnect
    /// delivery.
    pub fn del_active(&self, sock_id: u32) -> bool {
        let shell = self.active.lock().unwrap().remove(&sock_id);
        let Some(shell) = shell else {
            return false;
        };
        metrics::CONNECTIONS_ACTIVE.decrement();
        metrics::CONNECTIONS_CLOSED.increment();
        shell.reset();
        self.put(shell);
        true
    }

    /// Reset and recycle every active shell.
    pub fn clear_active(&self) {
        let drained: Vec<Arc<SocketContext>> = {
            let mut active = self.active.lock().unwrap();
            active.drain().map(|(_, shell)| shell).collect()
        };
        for shell in drained {
            metrics::CONNECTIONS_ACTIVE.decrement();
            metrics::CONNECTIONS_CLOSED.increment();
            shell.reset();
            self.put(shell);
        }
    }

    pub fn active_len(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    pub fn idle_len(&self) -> usize {
        self.idle.lock().unwrap().len()
    }
}
