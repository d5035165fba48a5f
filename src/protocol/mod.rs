//! TRN framed message protocol
//!
//! This module provides the wire format, message ids, payload value objects
//! and codec for framed TRN request/reply messages.

mod codec;
mod error;
mod header;
mod message;
mod payload;
mod types;

pub use codec::{DecodeOptions, checksum, decode, decode_with, encode};
pub use error::{Error, Result};
pub use header::MessageHeader;
pub use message::Message;
pub use payload::{InitParams, Measurement, N_COVAR, Pose, SensorType};
pub use types::{MSG_ID_COUNT, MessageId, idstr};

/// Framed message sync word: "TRNM" in ASCII (little-endian)
pub const TRNMSG_SYNC: u32 = 0x4D4E_5254;

/// Maximum payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = 2048;

/// Header size in bytes (packed)
pub const HEADER_SIZE: usize = 14;

/// Largest encoded message (header + maximum payload)
pub const MAX_MESSAGE_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;
