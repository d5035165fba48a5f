//! Transport-level error types covering socket, reply and record failures.

use core::fmt;
use std::io;

use crate::protocol;

/// Unified error type for update transport operations.
#[derive(Debug)]
pub enum TransportError {
    /// Underlying socket failure.
    Io(io::Error),
    /// Host name did not resolve to a usable address.
    Resolve {
        /// Host as given by the caller.
        host: String,
        /// Port as given by the caller.
        port: u16,
    },
    /// Operation requires an open socket.
    NotConnected,
    /// No ACK or NAK arrived within the retry budget.
    AckTimeout {
        /// Receive attempts made.
        retries: u32,
    },
    /// Datagram is not the size of an update record.
    UnexpectedSize {
        /// Bytes received.
        got: usize,
        /// Record size.
        expected: usize,
    },
    /// Record failed to decode.
    Decode(protocol::Error),
    /// Operation not available in the current mode.
    Unsupported(&'static str),
}

impl TransportError {
    /// True if the receive found nothing to read (would block or timed out).
    #[must_use]
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::Io(err) if is_no_data(err))
    }
}

pub(crate) fn is_no_data(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "socket error: {err}"),
            Self::Resolve { host, port } => write!(f, "could not resolve {host}:{port}"),
            Self::NotConnected => f.write_str("not connected"),
            Self::AckTimeout { retries } => {
                write!(f, "no ACK/NAK after {retries} attempts")
            }
            Self::UnexpectedSize { got, expected } => write!(
                f,
                "unexpected datagram size: got {got} bytes, expected {expected}"
            ),
            Self::Decode(err) => write!(f, "update decode error: {err}"),
            Self::Unsupported(what) => write!(f, "{what} not supported"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<protocol::Error> for TransportError {
    fn from(err: protocol::Error) -> Self {
        Self::Decode(err)
    }
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
