//! Worker state and action enums

use std::fmt;

/// Context state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CtxState {
    /// Worker not running
    #[default]
    Stopped,
    /// Worker running without a session
    Disconnected,
    /// Opening a session
    Connecting,
    /// Receiving updates
    Listening,
    /// Out-of-range sentinel
    Invalid,
}

impl CtxState {
    /// State name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "STOPPED",
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Listening => "LISTENING",
            Self::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for CtxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the worker does next
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CtxAction {
    /// Nothing
    #[default]
    Nop,
    /// Open a session
    Connect,
    /// Receive the next update
    Listen,
    /// Close the session
    Disconnect,
}
