//! Framed message header
//!
//! The header is 14 bytes, packed, little-endian.

use bytes::{Buf, BufMut};

use super::{Error, HEADER_SIZE, MAX_PAYLOAD_SIZE, MessageId, Result, TRNMSG_SYNC};

/// Framed message header (14 bytes, packed)
///
/// # Wire Format
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          Sync (4)                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |        Message ID (2)         |        Checksum (4) ...       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   ... Checksum                |      Data Length (4) ...      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   ... Data Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    sync: u32,
    msg_id: u16,
    checksum: u32,
    data_len: u32,
}

impl MessageHeader {
    /// Create a new message header
    #[must_use]
    pub fn new(msg_id: MessageId, checksum: u32, data_len: u32) -> Self {
        Self {
            sync: TRNMSG_SYNC,
            msg_id: msg_id.as_u16(),
            checksum,
            data_len,
        }
    }

    /// Get sync word
    #[must_use]
    pub const fn sync(&self) -> u32 {
        self.sync
    }

    /// Get raw message id
    #[must_use]
    pub const fn msg_id_raw(&self) -> u16 {
        self.msg_id
    }

    /// Get message id
    #[must_use]
    pub fn msg_id(&self) -> Option<MessageId> {
        MessageId::from_u16(self.msg_id)
    }

    /// Get payload checksum
    #[must_use]
    pub const fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Get payload length
    #[must_use]
    pub const fn data_len(&self) -> u32 {
        self.data_len
    }

    /// Validate header fields before the payload length is trusted
    pub fn validate(&self) -> Result<()> {
        if self.sync != TRNMSG_SYNC {
            return Err(Error::InvalidSync {
                expected: TRNMSG_SYNC,
                found: self.sync,
            });
        }

        if self.msg_id().is_none() {
            return Err(Error::InvalidMessageId { id: self.msg_id });
        }

        if self.data_len == 0 {
            return Err(Error::EmptyPayload);
        }

        let data_len = self.data_len as usize;
        if data_len > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: data_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(())
    }

    /// Convert to bytes (little-endian)
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        let mut out = &mut bytes[..];

        out.put_u32_le(self.sync);
        out.put_u16_le(self.msg_id);
        out.put_u32_le(self.checksum);
        out.put_u32_le(self.data_len);

        bytes
    }

    /// Parse from bytes (little-endian) without validating
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                needed: HEADER_SIZE,
                got: bytes.len(),
            });
        }

        let mut buf = &bytes[..HEADER_SIZE];
        Ok(Self {
            sync: buf.get_u32_le(),
            msg_id: buf.get_u16_le(),
            checksum: buf.get_u32_le(),
            data_len: buf.get_u32_le(),
        })
    }

    /// Parse from bytes (little-endian) and validate
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse(bytes)?;
        header.validate()?;
        Ok(header)
    }
}
