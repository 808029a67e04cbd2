//! Worker loop: dequeue completions, dispatch by operation, re-arm.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{TCP_DEQUEUE_TIMEOUT_MS, UDP_DEQUEUE_TIMEOUT_MS};
use crate::metrics;
use crate::net::context::{IoOp, SocketContext};
use crate::net::driver::{Shared, WorkerKind, disconnect};
use crate::net::poller::{CompletionEvent, Interest};
use crate::net::sock;
use crate::thread::StopToken;

const EVENT_BATCH: usize = 16;

const EMPTY_EVENT: CompletionEvent = CompletionEvent {
    sock_id: 0,
    readable: false,
    writable: false,
    failed: false,
};

/// Run function shared by every worker thread of a façade.
///
/// The dequeue timeout (500 ms TCP, 50 ms UDP) bounds how long a stop
/// signal can go unnoticed. A timeout on the TCP side doubles as the
/// liveness-probe tick for idle connections.
pub(crate) fn run(shared: &Arc<Shared>, token: &StopToken) {
    let timeout_ms = match shared.kind {
        WorkerKind::Tcp => TCP_DEQUEUE_TIMEOUT_MS,
        WorkerKind::Udp => UDP_DEQUEUE_TIMEOUT_MS,
    };
    let mut events = [EMPTY_EVENT; EVENT_BATCH];

    while !token.signalled() {
        let n = shared.poller.wait(&mut events, timeout_ms);
        if n == 0 {
            if shared.kind == WorkerKind::Tcp {
                probe_idle_sockets(shared);
            }
            continue;
        }
        for event in &events[..n] {
            metrics::EVENTS_PROCESSED.increment();
            // A key whose socket has been closed resolves to nothing and
            // is silently discarded.
            let Some(shell) = shared.sock_pool.get_active(event.sock_id) else {
                metrics::EVENTS_STALE.increment();
                continue;
            };
            handle_event(shared, &shell, *event);
        }
    }
}

fn handle_event(shared: &Arc<Shared>, shell: &Arc<SocketContext>, event: CompletionEvent) {
    if shell.is_listen() {
        do_accept(shared, shell);
        return;
    }

    if event.failed && shared.kind == WorkerKind::Tcp {
        // Peer hard-reset class: immediate disconnect.
        disconnect(shared, event.sock_id);
        return;
    }

    let mut alive = true;
    if event.writable {
        alive = drain_sends(shared, shell, event.sock_id);
    }
    if alive && (event.readable || event.failed) {
        alive = match shared.kind {
            WorkerKind::Tcp => do_recv_tcp(shared, shell, event.sock_id),
            WorkerKind::Udp => do_recv_udp(shared, shell, event.sock_id),
        };
    }
    if alive {
        rearm(shared, shell, event.sock_id);
    }
}

/// Accept one pending connection and prime the next accept.
fn do_accept(shared: &Arc<Shared>, listener: &Arc<SocketContext>) {
    let listen_fd = listener.fd();
    if listen_fd < 0 {
        return;
    }

    match sock::accept(listen_fd) {
        Ok((fd, peer_addr)) => {
            // Park the accepted socket in the accept slot until the new
            // shell owns it; a teardown in between closes it there.
            {
                let mut accept_ctx = listener.recv_ctx.lock().unwrap();
                accept_ctx.op = IoOp::Accept;
                accept_ctx.accepted = fd;
                accept_ctx.peer_addr = peer_addr;
            }
            if shared.config.tcp_nodelay {
                sock::set_nodelay(fd);
            }

            let shell = shared.sock_pool.get();
            shell.activate(fd, peer_addr, false);
            listener.recv_ctx.lock().unwrap().accepted = -1;
            shared.sock_pool.add_active(shell.clone());
            metrics::CONNECTIONS_ACCEPTED.increment();

            let sock_id = shell.sock_id();
            shared.log_info(&format!("accepted connection {sock_id} from {peer_addr}"));
            shared.sink.on_connected(sock_id);

            // First receive; on failure roll the connection back.
            if shared
                .poller
                .add(fd, sock_id, Interest::READABLE)
                .is_err()
            {
                shared.log_error(&format!("arming first recv failed for {sock_id}"));
                disconnect(shared, sock_id);
            }
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e)
            if e.raw_os_error() == Some(libc::EMFILE)
                || e.raw_os_error() == Some(libc::ENFILE) =>
        {
            // Out of descriptors: back off briefly before re-arming.
            shared.log_error("accept failed: file table full");
            std::thread::sleep(Duration::from_millis(10));
        }
        Err(e) => {
            shared.log_error(&format!("accept failed: {e}"));
        }
    }

    // Reset the accept context and re-post the accept.
    listener.recv_ctx.lock().unwrap().reset_buffer();
    let listen_fd = listener.fd();
    if listen_fd >= 0 {
        let _ = shared
            .poller
            .modify(listen_fd, listener.sock_id(), Interest::READABLE);
    }
}

/// One receive into the inline recv context, then the user callback.
///
/// The recv-context lock is held across the callback: it serializes
/// per-socket delivery (FIFO) and keeps the buffer alive for exactly the
/// callback's duration. `SocketContext::reset` only try-locks it, so user
/// code may close the socket from inside the callback.
fn do_recv_tcp(shared: &Arc<Shared>, shell: &Arc<SocketContext>, sock_id: u32) -> bool {
    let mut recv_ctx = shell.recv_ctx.lock().unwrap();
    if shell.is_closed() {
        return false;
    }
    recv_ctx.reset_buffer();
    recv_ctx.op = IoOp::Recv;
    let fd = shell.fd();
    if fd < 0 {
        return false;
    }

    match sock::recv(fd, &mut recv_ctx.buf) {
        Ok(0) => {
            // Orderly close.
            drop(recv_ctx);
            disconnect(shared, sock_id);
            false
        }
        Ok(n) => {
            recv_ctx.len = n;
            recv_ctx.transferred = n;
            metrics::BYTES_RECEIVED.add(n as u64);
            shared.sink.on_received(sock_id, &recv_ctx.buf[..n]);
            true
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
        Err(_) => {
            drop(recv_ctx);
            disconnect(shared, sock_id);
            false
        }
    }
}

/// One datagram receive. Errors (ICMP-induced and spurious wakeups alike)
/// never close the socket, and zero-length datagrams are delivered.
fn do_recv_udp(shared: &Arc<Shared>, shell: &Arc<SocketContext>, sock_id: u32) -> bool {
    let mut recv_ctx = shell.recv_ctx.lock().unwrap();
    if shell.is_closed() {
        return false;
    }
    recv_ctx.reset_buffer();
    recv_ctx.op = IoOp::Recv;
    let fd = shell.fd();
    if fd < 0 {
        return false;
    }

    match sock::recv_from(fd, &mut recv_ctx.buf) {
        Ok((n, src_addr)) => {
            recv_ctx.len = n;
            recv_ctx.transferred = n;
            recv_ctx.peer_addr = src_addr;
            metrics::BYTES_RECEIVED.add(n as u64);
            shared
                .sink
                .on_received_from(sock_id, &recv_ctx.buf[..n], src_addr);
            true
        }
        Err(_) => true,
    }
}

/// Drain the outstanding-send queue. Completed contexts return to the
/// pool; a partial or would-block send stays queued for the next writable
/// event. Returns false once the socket is gone.
fn drain_sends(shared: &Arc<Shared>, shell: &Arc<SocketContext>, sock_id: u32) -> bool {
    loop {
        let mut queue = shell.send_queue.lock().unwrap();
        if shell.is_closed() {
            return false;
        }
        let Some(mut context) = queue.pop_front() else {
            return true;
        };
        let fd = shell.fd();
        if fd < 0 {
            drop(queue);
            shared.io_pool.put(context);
            return false;
        }

        let result = match shared.kind {
            WorkerKind::Tcp => sock::send(fd, context.unsent()),
            WorkerKind::Udp => sock::send_to(fd, context.unsent(), context.peer_addr),
        };
        match result {
            Ok(n) => {
                context.transferred += n;
                metrics::BYTES_SENT.add(n as u64);
                if context.transferred >= context.len {
                    drop(queue);
                    // Send completion: the context goes back to the pool.
                    shared.io_pool.put(context);
                } else {
                    queue.push_front(context);
                    return true;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                queue.push_front(context);
                return true;
            }
            Err(e) => {
                drop(queue);
                shared.io_pool.put(context);
                match shared.kind {
                    WorkerKind::Tcp => {
                        disconnect(shared, sock_id);
                        return false;
                    }
                    WorkerKind::Udp => {
                        // Datagram dropped; the socket stays usable.
                        shared.log_error(&format!("sendto failed on {sock_id}: {e}"));
                    }
                }
            }
        }
    }
}

/// Re-arm one-shot interest after a dispatch: always readable, writable
/// while sends are pending. A failed re-arm drops the connection.
fn rearm(shared: &Arc<Shared>, shell: &Arc<SocketContext>, sock_id: u32) {
    let armed = {
        let queue = shell.send_queue.lock().unwrap();
        if shell.is_closed() {
            return;
        }
        let fd = shell.fd();
        if fd < 0 {
            return;
        }
        let interest = Interest::READABLE.with_writable(!queue.is_empty());
        shared.poller.modify(fd, sock_id, interest).is_ok()
    };
    if !armed {
        disconnect(shared, sock_id);
    }
}

/// Liveness probe on dequeue timeout: a zero-byte send to every idle TCP
/// connection; a probe error means the peer is gone.
fn probe_idle_sockets(shared: &Arc<Shared>) {
    for shell in shared.sock_pool.active_snapshot() {
        if shell.is_listen() || shell.is_closed() {
            continue;
        }
        let fd = shell.fd();
        if fd < 0 {
            continue;
        }
        if sock::send(fd, &[]).is_err() {
            disconnect(shared, shell.sock_id());
        }
    }
}
