//! Framed TRN message

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::payload::{ensure, malformed};
use super::{
    Error, InitParams, MAX_PAYLOAD_SIZE, Measurement, MessageHeader, MessageId, Pose, Result,
};

/// Framed TRN message (header + payload)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message header
    header: MessageHeader,
    /// Message payload
    payload: Bytes,
}

impl Message {
    /// Build a message, computing the payload checksum
    ///
    /// # Errors
    ///
    /// Fails if the payload is empty or longer than `MAX_PAYLOAD_SIZE`, so
    /// every built message decodes back to itself.
    pub fn build(msg_id: MessageId, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        // bounded by MAX_PAYLOAD_SIZE above
        let data_len = payload.len() as u32;
        let header = MessageHeader::new(msg_id, super::checksum(&payload), data_len);
        Ok(Self { header, payload })
    }

    /// Build a message carrying a single integer parameter
    #[must_use]
    pub fn build_typed(msg_id: MessageId, param: i32) -> Self {
        Self::from_small(msg_id, &param.to_le_bytes())
    }

    /// Build a message carrying an integer parameter and a float value
    #[must_use]
    pub fn build_float(msg_id: MessageId, param: i32, value: f32) -> Self {
        let mut buf = [0u8; 8];
        let mut out = &mut buf[..];
        out.put_i32_le(param);
        out.put_f32_le(value);
        Self::from_small(msg_id, &buf)
    }

    /// Build a message carrying a pose
    #[must_use]
    pub fn build_pose(msg_id: MessageId, pose: &Pose) -> Self {
        Self::from_small(msg_id, &pose.to_bytes())
    }

    /// Build a message carrying a parameter and a measurement set
    pub fn build_meas(msg_id: MessageId, param: i32, meas: &Measurement) -> Result<Self> {
        let mut out = BytesMut::with_capacity(4 + meas.encoded_len());
        out.put_i32_le(param);
        meas.encode_into(&mut out)?;
        Self::build(msg_id, out.freeze())
    }

    /// Build an INIT message
    pub fn build_init(params: &InitParams) -> Result<Self> {
        let mut out = BytesMut::new();
        params.encode_into(&mut out);
        Self::build(MessageId::Init, out.freeze())
    }

    // Payloads known to fit: fixed-size and non-empty.
    fn from_small(msg_id: MessageId, payload: &[u8]) -> Self {
        debug_assert!(!payload.is_empty() && payload.len() <= MAX_PAYLOAD_SIZE);
        let payload = Bytes::copy_from_slice(payload);
        let header =
            MessageHeader::new(msg_id, super::checksum(&payload), payload.len() as u32);
        Self { header, payload }
    }

    /// Assemble from already-validated parts
    pub(crate) fn from_parts(header: MessageHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get message id
    #[must_use]
    pub fn msg_id(&self) -> Option<MessageId> {
        self.header.msg_id()
    }

    /// Get header
    #[must_use]
    pub const fn header(&self) -> &MessageHeader {
        &self.header
    }

    /// Get payload
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Checksum carried in the header
    #[must_use]
    pub const fn checksum(&self) -> u32 {
        self.header.checksum()
    }

    /// Check the header checksum against the payload
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        super::checksum(&self.payload) == self.header.checksum()
    }

    /// Integer parameter at the start of the payload
    pub fn param(&self) -> Result<i32> {
        let mut buf = &self.payload[..];
        ensure(buf, 4, "parameter")?;
        Ok(buf.get_i32_le())
    }

    /// Integer parameter and float value
    pub fn float_value(&self) -> Result<(i32, f32)> {
        let mut buf = &self.payload[..];
        ensure(buf, 8, "float")?;
        Ok((buf.get_i32_le(), buf.get_f32_le()))
    }

    /// Pose payload
    pub fn pose(&self) -> Result<Pose> {
        let mut buf = &self.payload[..];
        Pose::decode_from(&mut buf)
    }

    /// Parameter and measurement payload
    pub fn meas(&self) -> Result<(i32, Measurement)> {
        let mut buf = &self.payload[..];
        ensure(buf, 4, "measurement")?;
        let param = buf.get_i32_le();
        let meas = Measurement::decode_from(&mut buf)?;
        if buf.has_remaining() {
            return Err(malformed(
                "measurement",
                format!("{} trailing bytes", buf.remaining()),
            ));
        }
        Ok((param, meas))
    }

    /// INIT payload
    pub fn init_params(&self) -> Result<InitParams> {
        let mut buf = &self.payload[..];
        InitParams::decode_from(&mut buf)
    }

    /// Encode message to bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        super::encode(self)
    }

    /// Decode message from bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        super::decode(bytes)
    }

    /// Multi-line diagnostic dump with a hex listing of the payload
    #[must_use]
    pub fn show(&self, max_bytes: usize) -> String {
        use fmt::Write;

        let mut out = format!("{self}\n");
        let shown = &self.payload[..self.payload.len().min(max_bytes)];
        for (row, chunk) in shown.chunks(16).enumerate() {
            let _ = write!(out, "  {:04x}:", row * 16);
            for b in chunk {
                let _ = write!(out, " {b:02x}");
            }
            out.push('\n');
        }
        if shown.len() < self.payload.len() {
            let _ = writeln!(out, "  ... {} more bytes", self.payload.len() - shown.len());
        }
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = super::idstr(self.header.msg_id_raw()).unwrap_or("?");
        write!(
            f,
            "sync={:#010x} id={}({}) checksum={:#010x} len={}",
            self.header.sync(),
            name,
            self.header.msg_id_raw(),
            self.header.checksum(),
            self.header.data_len()
        )
    }
}
