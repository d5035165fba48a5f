//! Connected peers as seen by a message family

use std::io::{self, Read, Write};
use std::net::{SocketAddr, UdpSocket};

use super::{Result, ServiceError};

/// A client connection a family reads requests from and replies to.
pub trait Peer {
    /// Printable peer identity (`host:port`)
    fn id(&self) -> String;

    /// Read available bytes; `WouldBlock` when nothing is pending.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write bytes to the peer.
    fn send(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Send all of `data` in one write.
    fn send_all(&mut self, data: &[u8]) -> Result<usize> {
        let sent = self.send(data)?;
        if sent != data.len() {
            return Err(ServiceError::ShortSend {
                sent,
                len: data.len(),
            });
        }
        Ok(sent)
    }
}

/// Peer over a byte stream (normally a TCP connection).
#[derive(Debug)]
pub struct StreamPeer<S> {
    stream: S,
    id: String,
}

impl<S: Read + Write> StreamPeer<S> {
    /// Wrap a stream with a display id
    pub fn new(stream: S, id: impl Into<String>) -> Self {
        Self {
            stream,
            id: id.into(),
        }
    }

    /// Borrow the stream
    #[must_use]
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Mutably borrow the stream
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unwrap the stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Peer for StreamPeer<S> {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream.write_all(data)?;
        self.stream.flush()?;
        Ok(data.len())
    }
}

/// Peer sharing a server's UDP socket.
///
/// Every receive records the sender, so replies go to whoever sent the last
/// request.
#[derive(Debug)]
pub struct DatagramPeer {
    socket: UdpSocket,
    addr: Option<SocketAddr>,
}

impl DatagramPeer {
    /// Peer with no address yet; learns it from the first receive
    #[must_use]
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket, addr: None }
    }

    /// Peer with a known address (publish targets)
    #[must_use]
    pub fn with_addr(socket: UdpSocket, addr: SocketAddr) -> Self {
        Self {
            socket,
            addr: Some(addr),
        }
    }

    /// Last known peer address
    #[must_use]
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }
}

impl Peer for DatagramPeer {
    fn id(&self) -> String {
        self.addr
            .map_or_else(|| "-".to_string(), |addr| addr.to_string())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (n, from) = self.socket.recv_from(buf)?;
        self.addr = Some(from);
        Ok(n)
    }

    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        let addr = self
            .addr
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "peer address unknown"))?;
        self.socket.send_to(data, addr)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory stream: reads drain `input`, writes land in `output`.
    #[derive(Debug, Default)]
    pub(crate) struct MemStream {
        pub input: VecDeque<u8>,
        pub output: Vec<u8>,
        pub closed: bool,
    }

    impl MemStream {
        pub fn with_input(bytes: &[u8]) -> Self {
            Self {
                input: bytes.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl Read for MemStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.input.is_empty() {
                if self.closed {
                    return Ok(0);
                }
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.input.len());
            for (dst, src) in buf.iter_mut().zip(self.input.drain(..n)) {
                *dst = src;
            }
            Ok(n)
        }
    }

    impl Write for MemStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn mem_peer(input: &[u8]) -> StreamPeer<MemStream> {
        StreamPeer::new(MemStream::with_input(input), "mem:0")
    }

    #[test]
    fn test_stream_peer_roundtrip() {
        let mut peer = mem_peer(b"abc");
        let mut buf = [0u8; 8];
        assert_eq!(peer.recv(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(
            peer.recv(&mut buf).unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );

        peer.send_all(b"ACK\0").unwrap();
        assert_eq!(peer.get_ref().output, b"ACK\0");
        assert_eq!(peer.id(), "mem:0");
    }

    #[test]
    fn test_datagram_peer_learns_sender() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.send_to(b"PING\0", server.local_addr().unwrap()).unwrap();

        let mut peer = DatagramPeer::new(server);
        assert_eq!(peer.id(), "-");
        assert!(peer.send(b"x").is_err());

        let mut buf = [0u8; 16];
        let n = peer.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"PING\0");
        assert_eq!(peer.addr(), Some(client.local_addr().unwrap()));

        peer.send_all(b"ACK\0").unwrap();
        let n = client.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ACK\0");
    }
}
