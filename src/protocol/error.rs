//! Protocol error types

use thiserror::Error;

/// Framing and payload decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid sync word
    #[error("invalid sync word: expected {expected:#010x}, got {found:#010x}")]
    InvalidSync {
        /// Expected sync word
        expected: u32,
        /// Found sync word
        found: u32,
    },

    /// Message id outside the known range
    #[error("invalid message id: {id}")]
    InvalidMessageId {
        /// Raw message id
        id: u16,
    },

    /// Zero-length payload
    #[error("empty payload")]
    EmptyPayload,

    /// Payload too large
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Buffer too small
    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall {
        /// Needed size
        needed: usize,
        /// Actual size
        got: usize,
    },

    /// Checksum mismatch (only reported when verification is enabled)
    #[error("checksum mismatch: expected {expected:#x}, got {found:#x}")]
    ChecksumMismatch {
        /// Checksum computed over the received payload
        expected: u32,
        /// Checksum carried in the header
        found: u32,
    },

    /// A typed payload could not be parsed
    #[error("malformed {what} payload: {reason}")]
    MalformedPayload {
        /// Payload kind
        what: &'static str,
        /// Reason
        reason: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
