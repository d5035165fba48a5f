//! Framed message codec (encode/decode)

use bytes::Bytes;

use super::{Error, HEADER_SIZE, Message, MessageHeader, Result};

/// Decode behavior switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Reject messages whose header checksum does not match the payload
    pub verify_checksum: bool,
}

impl DecodeOptions {
    /// Options that verify the payload checksum
    #[must_use]
    pub const fn verified() -> Self {
        Self {
            verify_checksum: true,
        }
    }
}

/// Additive payload checksum (byte sum modulo 2^32)
#[must_use]
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |sum, b| sum.wrapping_add(u32::from(*b)))
}

/// Encode a message to bytes
///
/// # Format
///
/// ```text
/// [HEADER (14 bytes)] [PAYLOAD (data_len bytes)]
/// ```
#[must_use]
pub fn encode(message: &Message) -> Vec<u8> {
    let payload = message.payload();
    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());

    bytes.extend_from_slice(&message.header().to_bytes());
    bytes.extend_from_slice(payload);

    bytes
}

/// Decode a message from bytes without checksum verification
///
/// # Errors
///
/// Returns an error if:
/// - Buffer is shorter than the header or the declared payload
/// - Sync word is invalid
/// - Message id is outside the known range
/// - Payload length is zero or exceeds `MAX_PAYLOAD_SIZE`
pub fn decode(bytes: &[u8]) -> Result<Message> {
    decode_with(bytes, DecodeOptions::default())
}

/// Decode a message from bytes
///
/// The header is validated before `data_len` is used to size anything.
/// Trailing bytes past the declared payload are ignored.
pub fn decode_with(bytes: &[u8], options: DecodeOptions) -> Result<Message> {
    let header = MessageHeader::from_bytes(bytes)?;

    let total_size = HEADER_SIZE + header.data_len() as usize;
    if bytes.len() < total_size {
        return Err(Error::BufferTooSmall {
            needed: total_size,
            got: bytes.len(),
        });
    }

    let payload = Bytes::copy_from_slice(&bytes[HEADER_SIZE..total_size]);

    if options.verify_checksum {
        let computed = checksum(&payload);
        if computed != header.checksum() {
            return Err(Error::ChecksumMismatch {
                expected: computed,
                found: header.checksum(),
            });
        }
    }

    Ok(Message::from_parts(header, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MAX_PAYLOAD_SIZE, MSG_ID_COUNT, MessageId, TRNMSG_SYNC};

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = Message::build(MessageId::Mle, b"test payload".to_vec()).unwrap();
        let encoded = encode(&original);
        let decoded = decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_checksum_sum() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0xFF, 0xFF]), 0x1FE);
        assert_eq!(checksum(&[0x80; MAX_PAYLOAD_SIZE]), 0x80 * MAX_PAYLOAD_SIZE as u32);
    }

    #[test]
    fn test_decode_invalid_sync() {
        let mut bytes = encode(&Message::build_typed(MessageId::Ping, 0));
        bytes[0..4].copy_from_slice(&0xDEAD_BEEF_u32.to_le_bytes());

        let result = decode(&bytes);
        assert!(matches!(result, Err(Error::InvalidSync { .. })));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let bytes = encode(&Message::build_typed(MessageId::Ping, 0));

        let result = decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(
            result,
            Err(Error::BufferTooSmall { needed: 18, got: 17 })
        ));
    }

    #[test]
    fn test_decode_buffer_too_small() {
        let result = decode(&TRNMSG_SYNC.to_le_bytes());
        assert!(matches!(result, Err(Error::BufferTooSmall { .. })));
    }

    #[test]
    fn test_checksum_not_verified_by_default() {
        let mut bytes = encode(&Message::build_typed(MessageId::SetFr, 1));
        bytes[HEADER_SIZE] ^= 0x01;

        let decoded = decode(&bytes).unwrap();
        assert!(!decoded.checksum_valid());
        assert_eq!(decoded.param().unwrap(), 0);

        let result = decode_with(&bytes, DecodeOptions::verified());
        assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
    }

    // Property-based tests
    #[cfg(test)]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn message_id_strategy() -> impl Strategy<Value = MessageId> {
            (0..MSG_ID_COUNT as u16).prop_map(|raw| MessageId::from_u16(raw).unwrap())
        }

        fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
            prop::collection::vec(any::<u8>(), 1..=MAX_PAYLOAD_SIZE)
        }

        fn frame(msg_id: u16, data_len: u32, payload: &[u8]) -> Vec<u8> {
            let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
            bytes.extend_from_slice(&TRNMSG_SYNC.to_le_bytes());
            bytes.extend_from_slice(&msg_id.to_le_bytes());
            bytes.extend_from_slice(&checksum(payload).to_le_bytes());
            bytes.extend_from_slice(&data_len.to_le_bytes());
            bytes.extend_from_slice(payload);
            bytes
        }

        proptest! {
            /// Property: any valid message roundtrips byte-for-byte
            #[test]
            fn prop_roundtrip_preserves_data(
                msg_id in message_id_strategy(),
                payload in payload_strategy(),
            ) {
                let original = Message::build(msg_id, payload.clone()).unwrap();
                let encoded = encode(&original);
                let decoded = decode_with(&encoded, DecodeOptions::verified()).unwrap();

                prop_assert_eq!(decoded.msg_id(), Some(msg_id));
                prop_assert_eq!(decoded.payload().as_ref(), payload.as_slice());
                prop_assert_eq!(encode(&decoded), encoded);
            }

            /// Property: a single flipped payload byte changes the checksum
            /// but is only rejected when verification is enabled
            #[test]
            fn prop_payload_corruption(
                msg_id in message_id_strategy(),
                payload in payload_strategy(),
                corrupt_offset_ratio in 0.0f64..1.0,
                corrupt_value in 1u8..=255,
            ) {
                let original = Message::build(msg_id, payload.clone()).unwrap();
                let mut encoded = encode(&original);

                let offset = HEADER_SIZE + (payload.len() as f64 * corrupt_offset_ratio) as usize;
                encoded[offset] ^= corrupt_value;

                let decoded = decode(&encoded).unwrap();
                prop_assert_ne!(checksum(decoded.payload()), original.checksum());
                prop_assert!(!decoded.checksum_valid());

                let result = decode_with(&encoded, DecodeOptions::verified());
                let is_mismatch = matches!(result, Err(Error::ChecksumMismatch { .. }));
                prop_assert!(is_mismatch);
            }

            /// Property: invalid sync words are always rejected
            #[test]
            fn prop_invalid_sync_rejected(
                invalid_sync in any::<u32>().prop_filter("not sync", |s| *s != TRNMSG_SYNC),
                payload in payload_strategy(),
            ) {
                let mut encoded = encode(&Message::build(MessageId::Ping, payload).unwrap());
                encoded[0..4].copy_from_slice(&invalid_sync.to_le_bytes());

                prop_assert!(decode(&encoded).is_err());
            }

            /// Property: out-of-range message ids are rejected
            #[test]
            fn prop_invalid_id_rejected(
                msg_id in (MSG_ID_COUNT as u16)..=u16::MAX,
                payload in payload_strategy(),
            ) {
                let bytes = frame(msg_id, payload.len() as u32, &payload);
                let is_invalid = matches!(decode(&bytes), Err(Error::InvalidMessageId { .. }));
                prop_assert!(is_invalid);
            }

            /// Property: oversized length fields are rejected before the
            /// payload is read
            #[test]
            fn prop_oversized_length_rejected(
                msg_id in message_id_strategy(),
                data_len in (MAX_PAYLOAD_SIZE as u32 + 1)..=u32::MAX,
            ) {
                let bytes = frame(msg_id.as_u16(), data_len, &[0u8; 16]);
                let is_too_large = matches!(decode(&bytes), Err(Error::PayloadTooLarge { .. }));
                prop_assert!(is_too_large);
            }

            /// Property: zero-length payloads are rejected
            #[test]
            fn prop_empty_payload_rejected(msg_id in message_id_strategy()) {
                let bytes = frame(msg_id.as_u16(), 0, &[]);
                prop_assert_eq!(decode(&bytes), Err(Error::EmptyPayload));
            }

            /// Property: decoding arbitrary bytes never panics
            #[test]
            fn prop_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
                let _ = decode(&bytes);
            }
        }
    }
}
