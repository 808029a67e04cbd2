//! Thin libc wrappers for socket setup and data transfer.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, ToSocketAddrs};
use std::os::fd::RawFd;

use crate::error::{Error, Result};

/// Build a `sockaddr_in` from a v4 socket address.
pub(crate) fn socket_addr_to_sockaddr(addr: SocketAddrV4) -> libc::sockaddr_in {
    let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    sa.sin_family = libc::AF_INET as libc::sa_family_t;
    sa.sin_port = addr.port().to_be();
    sa.sin_addr.s_addr = u32::from_ne_bytes(addr.ip().octets());
    sa
}

/// Convert a `sockaddr_in` back to a v4 socket address.
pub(crate) fn sockaddr_to_socket_addr(sa: &libc::sockaddr_in) -> SocketAddrV4 {
    let ip = Ipv4Addr::from(u32::from_be(sa.sin_addr.s_addr));
    SocketAddrV4::new(ip, u16::from_be(sa.sin_port))
}

/// Parse a dotted-quad bind/destination address. The literal `"*"` means
/// all interfaces.
pub(crate) fn parse_ip(ip: &str) -> Result<Ipv4Addr> {
    if ip == "*" {
        return Ok(Ipv4Addr::UNSPECIFIED);
    }
    ip.parse()
        .map_err(|_| Error::invalid(format!("bad IPv4 address: {ip}")))
}

/// First resolved IPv4 address of the local hostname, or loopback when the
/// lookup fails.
pub(crate) fn local_host_ip() -> Ipv4Addr {
    let mut name = [0u8; 256];
    let ret = unsafe { libc::gethostname(name.as_mut_ptr() as *mut libc::c_char, name.len()) };
    if ret == 0 {
        let len = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        if let Ok(host) = std::str::from_utf8(&name[..len]) {
            if let Ok(mut addrs) = (host, 0u16).to_socket_addrs() {
                if let Some(v4) = addrs.find_map(|a| match a {
                    std::net::SocketAddr::V4(v4) => Some(*v4.ip()),
                    _ => None,
                }) {
                    return v4;
                }
            }
        }
    }
    Ipv4Addr::LOCALHOST
}

/// Create a TCP socket. Non-blocking when `nonblock` is set.
pub(crate) fn tcp_socket(nonblock: bool) -> Result<RawFd> {
    let mut flags = libc::SOCK_STREAM | libc::SOCK_CLOEXEC;
    if nonblock {
        flags |= libc::SOCK_NONBLOCK;
    }
    let fd = unsafe { libc::socket(libc::AF_INET, flags, 0) };
    if fd < 0 {
        return Err(Error::last_os());
    }
    Ok(fd)
}

/// Create a non-blocking UDP socket.
pub(crate) fn udp_socket() -> Result<RawFd> {
    let fd = unsafe {
        libc::socket(
            libc::AF_INET,
            libc::SOCK_DGRAM | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            0,
        )
    };
    if fd < 0 {
        return Err(Error::last_os());
    }
    Ok(fd)
}

pub(crate) fn set_reuse_addr(fd: RawFd) {
    let optval: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

pub(crate) fn set_nodelay(fd: RawFd) {
    let optval: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_NODELAY,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

pub(crate) fn set_nonblocking(fd: RawFd) -> Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(Error::last_os());
        }
    }
    Ok(())
}

pub(crate) fn bind(fd: RawFd, addr: SocketAddrV4) -> Result<()> {
    let sa = socket_addr_to_sockaddr(addr);
    let ret = unsafe {
        libc::bind(
            fd,
            &sa as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(Error::last_os());
    }
    Ok(())
}

pub(crate) fn listen(fd: RawFd) -> Result<()> {
    let ret = unsafe { libc::listen(fd, libc::SOMAXCONN) };
    if ret < 0 {
        return Err(Error::last_os());
    }
    Ok(())
}

/// Blocking connect; any failure is fatal to the attempt.
pub(crate) fn connect(fd: RawFd, addr: SocketAddrV4) -> Result<()> {
    let sa = socket_addr_to_sockaddr(addr);
    let ret = unsafe {
        libc::connect(
            fd,
            &sa as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(Error::last_os());
    }
    Ok(())
}

/// Accept one pending connection, non-blocking and close-on-exec.
pub(crate) fn accept(listen_fd: RawFd) -> io::Result<(RawFd, SocketAddrV4)> {
    let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let fd = unsafe {
        libc::accept4(
            listen_fd,
            &mut sa as *mut _ as *mut libc::sockaddr,
            &mut len,
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((fd, sockaddr_to_socket_addr(&sa)))
}

/// Bound local address of a socket.
pub(crate) fn local_addr(fd: RawFd) -> Result<SocketAddrV4> {
    let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let ret = unsafe { libc::getsockname(fd, &mut sa as *mut _ as *mut libc::sockaddr, &mut len) };
    if ret < 0 {
        return Err(Error::last_os());
    }
    Ok(sockaddr_to_socket_addr(&sa))
}

pub(crate) fn recv(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

pub(crate) fn recv_from(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, SocketAddrV4)> {
    let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let n = unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            0,
            &mut sa as *mut _ as *mut libc::sockaddr,
            &mut len,
        )
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((n as usize, sockaddr_to_socket_addr(&sa)))
}

pub(crate) fn send(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let n = unsafe {
        libc::send(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            libc::MSG_NOSIGNAL,
        )
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

pub(crate) fn send_to(fd: RawFd, buf: &[u8], dst: SocketAddrV4) -> io::Result<usize> {
    let sa = socket_addr_to_sockaddr(dst);
    let n = unsafe {
        libc::sendto(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            libc::MSG_NOSIGNAL,
            &sa as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

/// Half-close the send side before the socket is closed.
pub(crate) fn shutdown_send(fd: RawFd) {
    unsafe {
        libc::shutdown(fd, libc::SHUT_WR);
    }
}

pub(crate) fn close(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sockaddr_round_trip() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 20), 17011);
        let sa = socket_addr_to_sockaddr(addr);
        assert_eq!(sockaddr_to_socket_addr(&sa), addr);
    }

    #[test]
    fn parse_ip_star_and_quad() {
        assert_eq!(parse_ip("*").unwrap(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(parse_ip("127.0.0.1").unwrap(), Ipv4Addr::LOCALHOST);
        assert!(parse_ip("not-an-ip").is_err());
        assert!(parse_ip("::1").is_err());
    }

    #[test]
    fn local_host_ip_is_v4() {
        // Must always produce something usable, loopback at worst.
        let ip = local_host_ip();
        assert_ne!(ip, Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn udp_bind_and_getsockname() {
        let fd = udp_socket().unwrap();
        bind(fd, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = local_addr(fd).unwrap();
        assert_ne!(addr.port(), 0);
        close(fd);
    }
}
