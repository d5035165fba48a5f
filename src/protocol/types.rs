//! Framed message ids

use std::fmt;

/// Number of known message ids
pub const MSG_ID_COUNT: usize = 22;

static ID_NAMES: [&str; MSG_ID_COUNT] = [
    "INIT",
    "MEAS",
    "MOTN",
    "MLE",
    "MMSE",
    "SET_MW",
    "SET_FR",
    "SET_IMA",
    "SET_VDR",
    "SET_MIM",
    "FILT_GRD",
    "ACK",
    "NACK",
    "BYE",
    "OUT_MEAS",
    "LAST_MEAS",
    "IS_CONV",
    "FILT_TYPE",
    "FILT_STATE",
    "FILT_REINIT",
    "PING",
    "N_REINITS",
];

/// Framed message ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageId {
    /// Initialize filter (map, config, particles, log dir)
    Init = 0,
    /// Measurement update
    Meas = 1,
    /// Motion update
    Motn = 2,
    /// Maximum likelihood estimate
    Mle = 3,
    /// Minimum mean square error estimate
    Mmse = 4,
    /// Set modified weighting
    SetMw = 5,
    /// Set filter reinit enable
    SetFr = 6,
    /// Set interpolate measurement attitude
    SetIma = 7,
    /// Set vehicle drift rate
    SetVdr = 8,
    /// Set map interpolation method
    SetMim = 9,
    /// Select filter grade
    FiltGrd = 10,
    /// Acknowledgment
    Ack = 11,
    /// Negative acknowledgment
    Nack = 12,
    /// Session end
    Bye = 13,
    /// Outstanding measurement query
    OutMeas = 14,
    /// Last measurement successful query
    LastMeas = 15,
    /// Convergence query
    IsConv = 16,
    /// Filter type query
    FiltType = 17,
    /// Filter state query
    FiltState = 18,
    /// Reinitialize filter
    FiltReinit = 19,
    /// Liveness check
    Ping = 20,
    /// Reinit count query
    NReinits = 21,
}

impl MessageId {
    /// Convert from the wire value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        use MessageId::*;
        let id = match value {
            0 => Init,
            1 => Meas,
            2 => Motn,
            3 => Mle,
            4 => Mmse,
            5 => SetMw,
            6 => SetFr,
            7 => SetIma,
            8 => SetVdr,
            9 => SetMim,
            10 => FiltGrd,
            11 => Ack,
            12 => Nack,
            13 => Bye,
            14 => OutMeas,
            15 => LastMeas,
            16 => IsConv,
            17 => FiltType,
            18 => FiltState,
            19 => FiltReinit,
            20 => Ping,
            21 => NReinits,
            _ => return None,
        };
        Some(id)
    }

    /// Convert to the wire value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Protocol name of this id
    #[must_use]
    pub fn name(self) -> &'static str {
        ID_NAMES[self as usize]
    }

    /// Check if this id is a reply
    #[must_use]
    pub const fn is_reply(self) -> bool {
        matches!(self, Self::Ack | Self::Nack)
    }
}

/// Look up the name of a raw message id.
///
/// Returns `None` for ids outside the known range.
#[must_use]
pub fn idstr(id: u16) -> Option<&'static str> {
    ID_NAMES.get(usize::from(id)).copied()
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
