//! Control tokens and replies exchanged with an update server.
//!
//! Each token is a short null-terminated ASCII string sent as the whole UDP
//! payload. Replies are always four bytes.

/// Control request sent by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Subscribe to updates
    Connect,
    /// Unsubscribe
    Disconnect,
    /// Reinitialize the filter
    Reset,
    /// Keep the subscription alive
    Heartbeat,
    /// Generic request
    Request,
    /// Liveness check
    Ping,
}

impl Control {
    /// All tokens
    pub const ALL: [Self; 6] = [
        Self::Connect,
        Self::Disconnect,
        Self::Reset,
        Self::Heartbeat,
        Self::Request,
        Self::Ping,
    ];

    /// Wire bytes, including the terminating null
    #[must_use]
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Connect => b"CON\0",
            Self::Disconnect => b"DIS\0",
            Self::Reset => b"RST\0",
            Self::Heartbeat => b"HBT\0",
            Self::Request => b"REQ\0",
            Self::Ping => b"PING\0",
        }
    }

    /// Token text
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connect => "CON",
            Self::Disconnect => "DIS",
            Self::Reset => "RST",
            Self::Heartbeat => "HBT",
            Self::Request => "REQ",
            Self::Ping => "PING",
        }
    }

    /// Parse a received datagram; trailing nulls are optional
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        let token = &bytes[..end];
        Self::ALL
            .into_iter()
            .find(|ctl| ctl.name().as_bytes() == token)
    }
}

/// Reply to a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reply {
    /// Request accepted
    Ack,
    /// Request rejected
    Nak,
}

/// Size of a reply datagram
pub const REPLY_BYTES: usize = 4;

impl Reply {
    /// Wire bytes
    #[must_use]
    pub const fn as_bytes(self) -> &'static [u8; REPLY_BYTES] {
        match self {
            Self::Ack => b"ACK\0",
            Self::Nak => b"NAK\0",
        }
    }

    /// Match the leading bytes of a datagram against the reply strings
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let head = bytes.get(..REPLY_BYTES)?;
        if head == Self::Ack.as_bytes() {
            Some(Self::Ack)
        } else if head == Self::Nak.as_bytes() {
            Some(Self::Nak)
        } else {
            None
        }
    }

    /// Check for ACK
    #[must_use]
    pub const fn is_ack(self) -> bool {
        matches!(self, Self::Ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_tokens() {
        for ctl in Control::ALL {
            assert_eq!(Control::parse(ctl.as_bytes()), Some(ctl));
            assert_eq!(*ctl.as_bytes().last().unwrap(), 0);
        }
        assert_eq!(Control::parse(b"HBT"), Some(Control::Heartbeat));
        assert_eq!(Control::parse(b"XYZ\0"), None);
        assert_eq!(Control::parse(b""), None);
    }

    #[test]
    fn test_reply_parse() {
        assert_eq!(Reply::parse(b"ACK\0"), Some(Reply::Ack));
        assert_eq!(Reply::parse(b"NAK\0trailing"), Some(Reply::Nak));
        assert_eq!(Reply::parse(b"ACK"), None);
        assert_eq!(Reply::parse(b"TZDS"), None);
        assert_eq!(u32::from_le_bytes(*Reply::Ack.as_bytes()), 0x004B_4341);
    }
}
