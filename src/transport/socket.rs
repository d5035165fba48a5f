//! UDP link used by the update client.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, trace};

use super::error::{Result, TransportError};

/// How long a receive may wait for a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Return immediately if nothing is queued
    Poll,
    /// Block until a datagram arrives
    Block,
    /// Block for at most the given duration
    Timeout(Duration),
}

/// How the link reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Connected socket to a single server
    Unicast,
    /// Bound socket joined to a multicast group
    Multicast,
}

/// Datagram link to an update server.
pub trait Link {
    /// Send one datagram.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Receive and consume one datagram.
    fn recv(&mut self, buf: &mut [u8], wait: Wait) -> io::Result<usize>;

    /// Read the next datagram without consuming it.
    fn peek(&mut self, buf: &mut [u8], wait: Wait) -> io::Result<usize>;
}

/// Opens links; one call per (re)connect.
pub trait Connector {
    /// Link type produced.
    type Link: Link;

    /// Open a fresh link to `host:port`.
    fn open(&mut self, host: &str, port: u16, mode: LinkMode) -> Result<Self::Link>;
}

/// UDP socket link, non-blocking between calls.
#[derive(Debug)]
pub struct UdpLink {
    socket: UdpSocket,
}

impl UdpLink {
    /// Wrap a socket, switching it to non-blocking mode.
    pub fn new(socket: UdpSocket) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    /// Access the local address for this link.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    // Applies the wait mode for one call and restores non-blocking mode after.
    fn with_wait<T>(
        &self,
        wait: Wait,
        op: impl FnOnce(&UdpSocket) -> io::Result<T>,
    ) -> io::Result<T> {
        let timeout = match wait {
            Wait::Poll => return op(&self.socket),
            Wait::Timeout(d) if d.is_zero() => return op(&self.socket),
            Wait::Block => None,
            Wait::Timeout(d) => Some(d),
        };

        self.socket.set_nonblocking(false)?;
        self.socket.set_read_timeout(timeout)?;
        let result = op(&self.socket);
        let restored = self
            .socket
            .set_read_timeout(None)
            .and_then(|()| self.socket.set_nonblocking(true));
        match (result, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(err), _) | (Ok(_), Err(err)) => Err(err),
        }
    }
}

impl Link for UdpLink {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf)
    }

    fn recv(&mut self, buf: &mut [u8], wait: Wait) -> io::Result<usize> {
        self.with_wait(wait, |socket| socket.recv_from(buf).map(|(len, _)| len))
    }

    fn peek(&mut self, buf: &mut [u8], wait: Wait) -> io::Result<usize> {
        self.with_wait(wait, |socket| socket.peek_from(buf).map(|(len, _)| len))
    }
}

/// Opens `UdpLink`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpConnector;

impl UdpConnector {
    fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
        let mut addrs = (host, port).to_socket_addrs()?.collect::<Vec<_>>();
        // IPv4 first
        addrs.sort_by_key(|addr| !addr.is_ipv4());
        addrs.into_iter().next().ok_or_else(|| TransportError::Resolve {
            host: host.to_string(),
            port,
        })
    }
}

impl Connector for UdpConnector {
    type Link = UdpLink;

    fn open(&mut self, host: &str, port: u16, mode: LinkMode) -> Result<UdpLink> {
        let addr = Self::resolve(host, port)?;
        trace!(%addr, ?mode, "opening update link");

        let socket = match mode {
            LinkMode::Unicast => {
                let local: SocketAddr = if addr.is_ipv4() {
                    (Ipv4Addr::UNSPECIFIED, 0).into()
                } else {
                    (Ipv6Addr::UNSPECIFIED, 0).into()
                };
                let socket = UdpSocket::bind(local)?;
                socket.connect(addr)?;
                socket
            }
            LinkMode::Multicast => {
                let SocketAddr::V4(group) = addr else {
                    return Err(TransportError::Unsupported("IPv6 multicast"));
                };
                if !group.ip().is_multicast() {
                    return Err(TransportError::Unsupported("multicast to a unicast address"));
                }
                let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
                socket.join_multicast_v4(group.ip(), &Ipv4Addr::UNSPECIFIED)?;
                socket
            }
        };

        let link = UdpLink::new(socket)?;
        debug!(%addr, local = ?link.local_addr().ok(), "update link open");
        Ok(link)
    }
}
