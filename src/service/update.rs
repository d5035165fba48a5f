//! Update-protocol family (server side of the UDP update client)

use std::fmt;

use tracing::{debug, info};

use super::{FamilyKind, MessageFamily, Peer, Result};
use crate::transport::{Control, Reply, is_no_data_io};
use crate::update::UpdateRecord;

/// Largest control datagram accepted
pub const CONTROL_MSG_SIZE: usize = 64;

/// Server hook invoked for `RST`; `true` when the filter was reset.
pub type ResetCallback = Box<dyn FnMut() -> bool + Send>;

/// Answers update-client control requests and publishes update records.
#[derive(Default)]
pub struct UpdateFamily {
    reset: Option<ResetCallback>,
}

impl UpdateFamily {
    /// Family without a reset hook; `RST` is refused
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Family resetting the filter through `callback`
    #[must_use]
    pub fn with_reset(callback: ResetCallback) -> Self {
        Self {
            reset: Some(callback),
        }
    }

    /// Reply for one control request
    pub fn respond(&mut self, msg: &[u8]) -> Reply {
        match Control::parse(msg) {
            Some(Control::Reset) => match self.reset.as_mut().map(|reset| reset()) {
                Some(true) => Reply::Ack,
                Some(false) => Reply::Nak,
                None => {
                    debug!("reset requested without a reset hook");
                    Reply::Nak
                }
            },
            Some(_) => Reply::Ack,
            None => Reply::Nak,
        }
    }

    /// Publish an update record to a subscriber
    pub fn publish_record(&mut self, peer: &mut dyn Peer, record: &UpdateRecord) -> Result<usize> {
        self.publish(peer, &record.to_bytes())
    }
}

impl fmt::Debug for UpdateFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateFamily")
            .field("reset", &self.reset.is_some())
            .finish()
    }
}

impl MessageFamily for UpdateFamily {
    fn kind(&self) -> FamilyKind {
        FamilyKind::Update
    }

    fn read(&mut self, peer: &mut dyn Peer) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; CONTROL_MSG_SIZE];
        match peer.recv(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(buf))
            }
            Err(err) if is_no_data_io(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn handle(&mut self, msg: &[u8], peer: &mut dyn Peer) -> Result<usize> {
        let reply = self.respond(msg);
        if Control::parse(msg) == Some(Control::Reset) {
            info!(peer = %peer.id(), ?reply, "filter reset requested");
        } else {
            debug!(peer = %peer.id(), ?reply, "control request");
        }
        peer.send_all(reply.as_bytes())
    }
}
