//! Service layer errors

use std::io;

use thiserror::Error;

use crate::protocol;

/// Request/reply service errors
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Peer socket failure
    #[error("peer I/O error: {0}")]
    Io(#[from] io::Error),

    /// Peer closed the connection
    #[error("peer closed connection")]
    PeerClosed,

    /// Peer has no known address to reply to
    #[error("peer address unknown")]
    NoPeerAddress,

    /// Message failed to decode
    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::Error),

    /// Legacy message type code not recognized
    #[error("unknown message type {0:#04x}")]
    UnknownType(u8),

    /// Short write to the peer
    #[error("short send: {sent} of {len} bytes")]
    ShortSend {
        /// Bytes written
        sent: usize,
        /// Bytes requested
        len: usize,
    },

    /// No family registered for the requested kind
    #[error("no {0} family registered")]
    Unregistered(&'static str),
}

impl ServiceError {
    /// True if the peer had nothing to read
    #[must_use]
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::Io(err) if crate::transport::is_no_data_io(err))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ServiceError>;
