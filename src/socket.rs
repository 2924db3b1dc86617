use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::Result;
use crate::icmp::IpVersion;

const RECV_BUFFER_SIZE: usize = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketType {
    /// `SOCK_RAW`; requires elevated privileges, delivers every ICMP message.
    Raw,
    /// `SOCK_DGRAM` ICMP ("ping socket"); unprivileged on Linux, but the
    /// kernel rewrites echo identifiers, so reply correlation only works for
    /// ids the kernel assigned.
    Dgram,
}

/// One ICMP socket. Implementations deliver received messages starting at
/// the ICMP header; any enclosing IP header is stripped.
pub trait IcmpSocket: Send + Sync {
    fn send_to(&self, buf: &[u8], addr: IpAddr) -> io::Result<usize>;

    /// Bounded receive. Returns `Ok(None)` when the receive timeout expires
    /// so callers can re-check their halt signal.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, IpAddr)>>;
}

/// Produces the sockets an engine needs. Injected so tests can substitute a
/// mock transport and so deployments sharing one read socket between engines
/// can hand out the shared handle explicitly instead of through a hidden
/// global.
pub trait SocketFactory: Send + Sync {
    /// A write socket for outbound probes. `ttl` of 0 leaves the OS default.
    fn write_socket(&self, version: IpVersion, ttl: u8) -> Result<Arc<dyn IcmpSocket>>;

    /// A read socket with the given receive timeout.
    fn read_socket(&self, version: IpVersion, timeout: Duration) -> Result<Arc<dyn IcmpSocket>>;
}

/// Default factory creating kernel ICMP sockets through `socket2`.
pub struct RawSocketFactory {
    socket_type: SocketType,
}

impl RawSocketFactory {
    #[must_use]
    pub fn new(socket_type: SocketType) -> Self {
        RawSocketFactory { socket_type }
    }
}

impl SocketFactory for RawSocketFactory {
    fn write_socket(&self, version: IpVersion, ttl: u8) -> Result<Arc<dyn IcmpSocket>> {
        tracing::trace!(?version, ttl, "creating write socket");
        let socket = create_socket(version, self.socket_type)?;
        if ttl > 0 {
            match version {
                IpVersion::V4 => socket.set_ttl(u32::from(ttl))?,
                IpVersion::V6 => socket.set_unicast_hops_v6(u32::from(ttl))?,
            }
        }
        Ok(Arc::new(KernelIcmpSocket::new(socket, version, self.socket_type)))
    }

    fn read_socket(&self, version: IpVersion, timeout: Duration) -> Result<Arc<dyn IcmpSocket>> {
        tracing::trace!(?version, ?timeout, "creating read socket");
        let socket = create_socket(version, self.socket_type)?;
        socket.set_read_timeout(Some(timeout))?;
        Ok(Arc::new(KernelIcmpSocket::new(socket, version, self.socket_type)))
    }
}

fn create_socket(version: IpVersion, socket_type: SocketType) -> io::Result<Socket> {
    let (domain, protocol) = match version {
        IpVersion::V4 => (Domain::IPV4, Protocol::ICMPV4),
        IpVersion::V6 => (Domain::IPV6, Protocol::ICMPV6),
    };
    let ty = match socket_type {
        SocketType::Raw => Type::RAW,
        SocketType::Dgram => Type::DGRAM,
    };
    Socket::new(domain, ty, Some(protocol))
}

struct KernelIcmpSocket {
    socket: Socket,
    // Raw IPv4 sockets receive the whole IP datagram; everything else
    // already starts at the ICMP header.
    strip_ip_header: bool,
}

impl KernelIcmpSocket {
    fn new(socket: Socket, version: IpVersion, socket_type: SocketType) -> Self {
        KernelIcmpSocket {
            socket,
            strip_ip_header: version == IpVersion::V4 && socket_type == SocketType::Raw,
        }
    }
}

impl IcmpSocket for KernelIcmpSocket {
    fn send_to(&self, buf: &[u8], addr: IpAddr) -> io::Result<usize> {
        let addr = SockAddr::from(SocketAddr::new(addr, 0));
        self.socket.send_to(buf, &addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, IpAddr)>> {
        let mut recv_buf = [MaybeUninit::<u8>::uninit(); RECV_BUFFER_SIZE];
        let (n, from) = match self.socket.recv_from(&mut recv_buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // socket2 guarantees the first n bytes are initialized after a
        // successful recv_from.
        let datagram: &[u8] = unsafe { std::slice::from_raw_parts(recv_buf.as_ptr().cast(), n) };

        let message = if self.strip_ip_header && datagram.len() >= 20 {
            // low nibble of the first octet is the header length in 32-bit words
            let header_len = usize::from(datagram[0] & 0x0F) * 4;
            &datagram[header_len.min(datagram.len())..]
        } else {
            datagram
        };

        if message.len() > buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "receive buffer too small for ICMP message",
            ));
        }
        buf[..message.len()].copy_from_slice(message);

        let ip = from
            .as_socket()
            .map(|socket_addr| socket_addr.ip())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "unexpected source address family")
            })?;

        Ok(Some((message.len(), ip)))
    }
}
