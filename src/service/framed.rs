//! Framed-message request family
//!
//! Reads hunt for the sync word one byte at a time, then read the rest of
//! the header and the payload. Frames whose checksum does not match are
//! dropped.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use super::filter::{EstimateKind, Query, Request, Response, SharedFilter, dispatch};
use super::{FamilyKind, MessageFamily, Peer, Result, ServiceError};
use crate::protocol::{
    self, DecodeOptions, HEADER_SIZE, MAX_PAYLOAD_SIZE, Message, MessageId, TRNMSG_SYNC,
};
use crate::transport::is_no_data_io;

/// Parameter carried by the ACK answering a PING
pub const PING_REPLY_PARAM: i32 = 0xabcd;

/// Attempts to complete a header or payload read
pub const FRAME_READ_RETRIES: u32 = 40;

/// Delay between incomplete read attempts
pub const FRAME_READ_DELAY: Duration = Duration::from_millis(10);

const SYNC_BYTES: [u8; 4] = TRNMSG_SYNC.to_le_bytes();

enum Fill {
    Done,
    Incomplete,
}

/// Request family for framed-message clients
pub struct FramedFamily {
    filter: SharedFilter,
    read_retries: u32,
    read_delay: Duration,
}

impl FramedFamily {
    /// Family serving requests against `filter`
    #[must_use]
    pub fn new(filter: SharedFilter) -> Self {
        Self {
            filter,
            read_retries: FRAME_READ_RETRIES,
            read_delay: FRAME_READ_DELAY,
        }
    }

    /// Override the read budget for header and payload
    #[must_use]
    pub fn with_read_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.read_retries = retries.max(1);
        self.read_delay = delay;
        self
    }

    /// Hunt for the sync word. `false` when the peer has nothing pending.
    fn hunt_sync(peer: &mut dyn Peer, frame: &mut Vec<u8>) -> Result<bool> {
        frame.clear();
        let mut byte = [0u8; 1];
        while frame.len() < SYNC_BYTES.len() {
            match peer.recv(&mut byte) {
                Ok(0) => return Err(ServiceError::PeerClosed),
                Ok(_) if byte[0] == SYNC_BYTES[frame.len()] => frame.push(byte[0]),
                Ok(_) => {
                    trace!(skipped = byte[0], "sync mismatch");
                    frame.clear();
                    // the mismatched byte may start the next sync word
                    if byte[0] == SYNC_BYTES[0] {
                        frame.push(byte[0]);
                    }
                }
                Err(err) if is_no_data_io(&err) => return Ok(false),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(true)
    }

    // Append exactly `len` bytes, waiting briefly for stragglers.
    fn fill(&self, peer: &mut dyn Peer, frame: &mut Vec<u8>, len: usize) -> Result<Fill> {
        let start = frame.len();
        frame.resize(start + len, 0);
        let mut got = 0;
        let mut attempts = 0;

        while got < len {
            match peer.recv(&mut frame[start + got..]) {
                Ok(0) => return Err(ServiceError::PeerClosed),
                Ok(n) => got += n,
                Err(err) if is_no_data_io(&err) => {
                    attempts += 1;
                    if attempts >= self.read_retries {
                        return Ok(Fill::Incomplete);
                    }
                    thread::sleep(self.read_delay);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Fill::Done)
    }

    fn request(msg: &Message) -> Result<Option<Request>> {
        let Some(id) = msg.msg_id() else {
            return Ok(None);
        };
        let request = match id {
            MessageId::Init => Request::Init(msg.init_params()?),
            MessageId::Meas => {
                let (param, meas) = msg.meas()?;
                Request::Meas { param, meas }
            }
            MessageId::Motn => Request::Motion(msg.pose()?),
            MessageId::Mle => Request::Estimate(EstimateKind::Mle, msg.pose()?),
            MessageId::Mmse => Request::Estimate(EstimateKind::Mmse, msg.pose()?),
            MessageId::LastMeas => Request::Query(Query::LastMeas),
            MessageId::NReinits => Request::Query(Query::NumReinits),
            MessageId::FiltType => Request::Query(Query::FilterType),
            MessageId::FiltState => Request::Query(Query::FilterState),
            MessageId::OutMeas => Request::Query(Query::OutstandingMeas),
            MessageId::IsConv => Request::Query(Query::IsConverged),
            MessageId::FiltReinit => Request::Reinit,
            MessageId::SetMw => Request::SetWeighting(msg.param()?),
            MessageId::SetFr => Request::SetFilterReinit(msg.param()? != 0),
            MessageId::SetIma => Request::SetInterpAttitude(msg.param()? != 0),
            MessageId::SetMim => Request::SetInterpMethod(msg.param()?),
            MessageId::SetVdr => Request::SetDriftRate(f64::from(msg.float_value()?.1)),
            MessageId::FiltGrd => Request::FilterGrade(msg.param()?),
            MessageId::Ping => Request::Ping,
            MessageId::Ack | MessageId::Nack | MessageId::Bye => return Ok(None),
        };
        Ok(Some(request))
    }

    /// Reply message for a filter response
    pub fn reply(response: Response) -> Result<Message> {
        Ok(match response {
            Response::Ack => Message::build_typed(MessageId::Ack, 0),
            Response::Nack => Message::build_typed(MessageId::Nack, 0),
            Response::Value(value) => Message::build_typed(MessageId::Ack, value),
            Response::Pong => Message::build_typed(MessageId::Ack, PING_REPLY_PARAM),
            Response::Meas { param, meas } => Message::build_meas(MessageId::Meas, param, &meas)?,
            Response::Estimate(EstimateKind::Mle, pose) => {
                Message::build_pose(MessageId::Mle, &pose)
            }
            Response::Estimate(EstimateKind::Mmse, pose) => {
                Message::build_pose(MessageId::Mmse, &pose)
            }
        })
    }
}

impl fmt::Debug for FramedFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramedFamily")
            .field("read_retries", &self.read_retries)
            .field("read_delay", &self.read_delay)
            .finish_non_exhaustive()
    }
}

impl MessageFamily for FramedFamily {
    fn kind(&self) -> FamilyKind {
        FamilyKind::Framed
    }

    fn read(&mut self, peer: &mut dyn Peer) -> Result<Option<Vec<u8>>> {
        let mut frame = Vec::with_capacity(HEADER_SIZE);
        loop {
            if !Self::hunt_sync(peer, &mut frame)? {
                return Ok(None);
            }
            if let Fill::Incomplete = self.fill(peer, &mut frame, HEADER_SIZE - SYNC_BYTES.len())? {
                debug!(peer = %peer.id(), "truncated header, resyncing");
                continue;
            }

            let data_len = u32::from_le_bytes([frame[10], frame[11], frame[12], frame[13]]) as usize;
            if data_len > MAX_PAYLOAD_SIZE {
                debug!(peer = %peer.id(), data_len, "oversized frame, resyncing");
                continue;
            }
            if let Fill::Incomplete = self.fill(peer, &mut frame, data_len)? {
                debug!(peer = %peer.id(), data_len, "truncated payload, resyncing");
                continue;
            }

            // surfaces checksum, id and length errors
            protocol::decode_with(&frame, DecodeOptions::verified())?;
            trace!(peer = %peer.id(), bytes = frame.len(), "frame read");
            return Ok(Some(frame));
        }
    }

    fn handle(&mut self, msg: &[u8], peer: &mut dyn Peer) -> Result<usize> {
        let msg = protocol::decode_with(msg, DecodeOptions::verified())?;
        debug!(peer = %peer.id(), msg = %msg, "framed request");

        let response = match Self::request(&msg) {
            Ok(Some(request)) => dispatch(&mut *self.filter.lock(), request),
            Ok(None) => Response::Nack,
            Err(err) => {
                debug!(peer = %peer.id(), error = %err, "framed request rejected");
                Response::Nack
            }
        };
        let reply = Self::reply(response)?;
        peer.send_all(&reply.encode())
    }
}
