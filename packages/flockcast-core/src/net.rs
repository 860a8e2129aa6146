//! Socket construction helpers shared by the announcer, listener, control
//! server, and controller.
//!
//! Built on `socket2` for the raw socket-option control
//! (`SO_REUSEADDR`/`SO_REUSEPORT`/`SO_BROADCAST`) plain `std::net` sockets
//! don't expose, yielding blocking sockets rather than async ones — this
//! system's three daemon loops are independent blocking threads, not an
//! async runtime.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

/// Derives a best-effort broadcast address for `iface_ip` by assuming a
/// `/24` network, since the actual netmask isn't available through this
/// simple connect-and-read-back resolution.
pub fn broadcast_addr_for(iface_ip: Ipv4Addr) -> Ipv4Addr {
    let o = iface_ip.octets();
    Ipv4Addr::new(o[0], o[1], o[2], 255)
}

/// Creates a UDP socket bound to `bind_addr` with the requested options.
///
/// `read_timeout` bounds every `recv_from` call so a shutdown flag can be
/// checked between reads within a known interval.
pub fn new_udp_socket(
    bind_addr: SocketAddrV4,
    reuse: bool,
    broadcast: bool,
    read_timeout: Option<Duration>,
) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    if reuse {
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
    }

    if broadcast {
        socket.set_broadcast(true)?;
    }

    socket.bind(&SocketAddr::V4(bind_addr).into())?;
    socket.set_read_timeout(read_timeout)?;

    Ok(socket.into())
}

/// Creates a TCP listener bound to `bind_addr` with `SO_REUSEADDR`/`SO_REUSEPORT`.
pub fn new_tcp_listener(bind_addr: SocketAddrV4, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddr::V4(bind_addr).into())?;
    socket.listen(backlog)?;
    Ok(socket.into())
}

/// Resolves this node's local IPv4 address by connecting a UDP socket to
/// `destination` and reading back the bound source address
///
/// This avoids depending on interface-enumeration crates: the kernel's
/// routing table picks the outbound interface for us, which is exactly the
/// address peers will see packets arrive from.
pub fn resolve_local_ip(destination: SocketAddrV4) -> io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(destination)?;
    match socket.local_addr()?.ip() {
        std::net::IpAddr::V4(ip) => Ok(ip),
        std::net::IpAddr::V6(_) => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "local address resolved to IPv6, expected IPv4",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_addr_assumes_slash_24() {
        assert_eq!(
            broadcast_addr_for(Ipv4Addr::new(192, 168, 1, 42)),
            Ipv4Addr::new(192, 168, 1, 255)
        );
    }

    #[test]
    fn resolve_local_ip_finds_loopback_route() {
        let dest = SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 9); // discard port
        let ip = resolve_local_ip(dest).unwrap();
        assert!(ip.is_loopback());
    }
}
