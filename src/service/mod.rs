//! Request/reply protocol layer
//!
//! A server reactor owns the sockets and decides when a peer is readable.
//! For each message family it looks up a [`MessageFamily`] in a
//! [`FamilyTable`] and lets the family read one request, answer it, or
//! publish unsolicited data to a subscriber.
//!
//! Three families are provided:
//!
//! - [`CommsFamily`]: legacy fixed-size commsT requests
//! - [`FramedFamily`]: sync-word framed [`Message`](crate::protocol::Message)
//!   requests
//! - [`UpdateFamily`]: update-client control strings and update records

mod comms;
mod error;
mod filter;
mod framed;
mod peer;
mod update;

use std::fmt;

use tracing::trace;

pub use comms::{
    COMMS_HEADER_SIZE, COMMS_MSG_SIZE, COMMS_READ_DELAY, COMMS_READ_RETRIES, CommsBody,
    CommsFamily, CommsKind, CommsMessage,
};
pub use error::{Result, ServiceError};
pub use filter::{
    EstimateKind, FilterApi, Query, Request, Response, SharedFilter, dispatch, shared,
};
pub use framed::{FRAME_READ_DELAY, FRAME_READ_RETRIES, FramedFamily, PING_REPLY_PARAM};
pub use peer::{DatagramPeer, Peer, StreamPeer};
pub use update::{CONTROL_MSG_SIZE, ResetCallback, UpdateFamily};

/// Message family identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FamilyKind {
    /// Legacy commsT
    Comms,
    /// Framed messages
    Framed,
    /// Update protocol
    Update,
}

impl FamilyKind {
    /// Short name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Comms => "commsT",
            Self::Framed => "trnmsg",
            Self::Update => "trnu",
        }
    }
}

impl fmt::Display for FamilyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read, handle and publish operations for one message family.
pub trait MessageFamily: Send {
    /// Family served
    fn kind(&self) -> FamilyKind;

    /// Read one request; `None` when the peer has nothing pending.
    fn read(&mut self, peer: &mut dyn Peer) -> Result<Option<Vec<u8>>>;

    /// Answer one request; returns bytes sent.
    fn handle(&mut self, msg: &[u8], peer: &mut dyn Peer) -> Result<usize>;

    /// Send unsolicited data to a subscriber.
    fn publish(&mut self, peer: &mut dyn Peer, data: &[u8]) -> Result<usize> {
        peer.send_all(data)
    }
}

/// Capability table mapping each family kind to its implementation.
#[derive(Default)]
pub struct FamilyTable {
    families: Vec<Box<dyn MessageFamily>>,
}

impl FamilyTable {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a family, replacing any with the same kind
    pub fn register(&mut self, family: Box<dyn MessageFamily>) -> Option<Box<dyn MessageFamily>> {
        let kind = family.kind();
        match self.families.iter_mut().find(|f| f.kind() == kind) {
            Some(slot) => Some(std::mem::replace(slot, family)),
            None => {
                self.families.push(family);
                None
            }
        }
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, family: impl MessageFamily + 'static) -> Self {
        self.register(Box::new(family));
        self
    }

    /// Family registered for `kind`
    pub fn get_mut(&mut self, kind: FamilyKind) -> Result<&mut (dyn MessageFamily + 'static)> {
        self.families
            .iter_mut()
            .find(|f| f.kind() == kind)
            .map(Box::as_mut)
            .ok_or(ServiceError::Unregistered(kind.name()))
    }

    /// Registered kinds
    pub fn kinds(&self) -> impl Iterator<Item = FamilyKind> + '_ {
        self.families.iter().map(|f| f.kind())
    }

    /// Read and answer one request from `peer`.
    ///
    /// Returns the reply size, or `None` if nothing was pending.
    pub fn serve(&mut self, kind: FamilyKind, peer: &mut dyn Peer) -> Result<Option<usize>> {
        let family = self.get_mut(kind)?;
        let Some(msg) = family.read(peer)? else {
            return Ok(None);
        };
        trace!(family = %kind, peer = %peer.id(), bytes = msg.len(), "request");
        family.handle(&msg, peer).map(Some)
    }

    /// Publish `data` to `peer` through the family for `kind`.
    pub fn publish(&mut self, kind: FamilyKind, peer: &mut dyn Peer, data: &[u8]) -> Result<usize> {
        self.get_mut(kind)?.publish(peer, data)
    }
}

impl fmt::Debug for FamilyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}
