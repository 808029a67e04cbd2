//! Shared readiness multiplexer: one epoll instance per façade.
//!
//! The epoll event payload carries the socket's completion key
//! (`sock_id`); interest is always one-shot, so every event is delivered
//! to exactly one of the workers blocked in [`Poller::wait`].

use std::os::fd::RawFd;

use crate::error::{Error, Result};

/// Readiness interest for one arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub const READABLE: Interest = Interest {
        readable: true,
        writable: false,
    };

    pub fn with_writable(self, writable: bool) -> Interest {
        Interest { writable, ..self }
    }

    fn bits(self) -> u32 {
        let mut bits = (libc::EPOLLONESHOT | libc::EPOLLRDHUP) as u32;
        if self.readable {
            bits |= libc::EPOLLIN as u32;
        }
        if self.writable {
            bits |= libc::EPOLLOUT as u32;
        }
        bits
    }
}

/// One dequeued readiness event.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CompletionEvent {
    pub sock_id: u32,
    pub readable: bool,
    pub writable: bool,
    /// Error or hang-up class (peer hard reset, broken pipe).
    pub failed: bool,
}

pub(crate) struct Poller {
    epoll_fd: RawFd,
}

impl Poller {
    pub fn new() -> Result<Poller> {
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(Error::last_os());
        }
        Ok(Poller { epoll_fd })
    }

    /// Register a socket under its completion key and arm the first
    /// interest.
    pub fn add(&self, fd: RawFd, sock_id: u32, interest: Interest) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, sock_id, interest)
    }

    /// Re-arm a one-shot registration with new interest.
    pub fn modify(&self, fd: RawFd, sock_id: u32, interest: Interest) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, sock_id, interest)
    }

    /// Drop a registration. Harmless if the fd is already gone.
    pub fn remove(&self, fd: RawFd) {
        unsafe {
            libc::epoll_ctl(
                self.epoll_fd,
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            );
        }
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, sock_id: u32, interest: Interest) -> Result<()> {
        let mut event = libc::epoll_event {
            events: interest.bits(),
            u64: sock_id as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut event) };
        if ret < 0 {
            return Err(Error::last_os());
        }
        Ok(())
    }

    /// Dequeue up to `out.len()` events, waiting at most `timeout_ms`.
    /// Returns 0 on timeout (and on interruption, which callers treat the
    /// same way).
    pub fn wait(&self, out: &mut [CompletionEvent], timeout_ms: u32) -> usize {
        let mut raw = [libc::epoll_event { events: 0, u64: 0 }; 16];
        let max = out.len().min(raw.len()) as libc::c_int;
        let n = unsafe {
            libc::epoll_wait(self.epoll_fd, raw.as_mut_ptr(), max, timeout_ms as libc::c_int)
        };
        if n <= 0 {
            return 0;
        }
        let n = n as usize;
        for (slot, ev) in out.iter_mut().zip(raw.iter().take(n)) {
            let bits = ev.events;
            *slot = CompletionEvent {
                sock_id: ev.u64 as u32,
                readable: bits & (libc::EPOLLIN as u32) != 0,
                writable: bits & (libc::EPOLLOUT as u32) != 0,
                failed: bits & ((libc::EPOLLERR | libc::EPOLLHUP) as u32) != 0,
            };
        }
        n
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::sock;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::time::Instant;

    #[test]
    fn wait_times_out_without_events() {
        let poller = Poller::new().unwrap();
        let mut events = [CompletionEvent {
            sock_id: 0,
            readable: false,
            writable: false,
            failed: false,
        }; 4];
        let start = Instant::now();
        assert_eq!(poller.wait(&mut events, 50), 0);
        assert!(start.elapsed().as_millis() >= 40);
    }

    #[test]
    fn readable_event_carries_key_and_is_one_shot() {
        let poller = Poller::new().unwrap();
        let fd = sock::udp_socket().unwrap();
        sock::bind(fd, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = sock::local_addr(fd).unwrap();
        poller.add(fd, 42, Interest::READABLE).unwrap();

        // Make it readable.
        let sender = sock::udp_socket().unwrap();
        sock::send_to(sender, b"ping", addr).unwrap();

        let mut events = [CompletionEvent {
            sock_id: 0,
            readable: false,
            writable: false,
            failed: false,
        }; 4];
        let n = poller.wait(&mut events, 2000);
        assert_eq!(n, 1);
        assert_eq!(events[0].sock_id, 42);
        assert!(events[0].readable);

        // One-shot: no second delivery until re-armed.
        assert_eq!(poller.wait(&mut events, 50), 0);
        poller.modify(fd, 42, Interest::READABLE).unwrap();
        assert_eq!(poller.wait(&mut events, 2000), 1);

        sock::close(sender);
        sock::close(fd);
    }
}
