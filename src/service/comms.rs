//! Legacy commsT request family
//!
//! A commsT message is a one-byte type code, an `i32` parameter, a `u32` body
//! length and a type-dependent body, sent zero-padded to [`COMMS_MSG_SIZE`].
//! Writers may split a message across several stream reads and there is no
//! sync word, so reads gather chunks until the buffer fills or retries run
//! out.

use std::fmt;
use std::thread;
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, trace};

use super::filter::{EstimateKind, Query, Request, Response, SharedFilter, dispatch};
use super::{FamilyKind, MessageFamily, Peer, Result, ServiceError};
use crate::protocol::{self, InitParams, Measurement, Pose};
use crate::transport::is_no_data_io;

/// Padded commsT message size
pub const COMMS_MSG_SIZE: usize = 8000;

/// Type code, parameter and body length
pub const COMMS_HEADER_SIZE: usize = 9;

/// Chunked read attempts
pub const COMMS_READ_RETRIES: u32 = 40;

/// Delay between chunked read attempts
pub const COMMS_READ_DELAY: Duration = Duration::from_millis(10);

/// commsT message type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommsKind {
    /// Initialize filter
    Init = b'I',
    /// Measurement update
    Meas = b'M',
    /// Motion update
    Motn = b'N',
    /// Maximum likelihood estimate
    Mle = b'E',
    /// Minimum mean square error estimate
    Mmse = b'S',
    /// Set modified weighting
    SetMw = b'W',
    /// Set filter reinit
    SetFr = b'F',
    /// Set interpolate measurement attitude
    SetIma = b'A',
    /// Set vehicle drift rate
    SetVdr = b'V',
    /// Set map interpolation method
    SetMim = b'Q',
    /// Select filter grade
    FiltGrd = b'G',
    /// Acknowledgment
    Ack = b'K',
    /// Negative acknowledgment
    Nack = b'k',
    /// Session end
    Bye = b'B',
    /// Outstanding measurements query
    OutMeas = b'O',
    /// Last measurement success query
    LastMeas = b'L',
    /// Convergence query
    IsConv = b'C',
    /// Filter type query
    FiltType = b'T',
    /// Filter state query
    FiltState = b'H',
    /// Reinitialize filter
    FiltReinit = b'R',
    /// Reinitialization count query
    NReinits = b'r',
    /// Liveness check
    Ping = b'P',
    /// Initialization query
    IsInit = b'i',
}

impl CommsKind {
    const ALL: [Self; 23] = [
        Self::Init,
        Self::Meas,
        Self::Motn,
        Self::Mle,
        Self::Mmse,
        Self::SetMw,
        Self::SetFr,
        Self::SetIma,
        Self::SetVdr,
        Self::SetMim,
        Self::FiltGrd,
        Self::Ack,
        Self::Nack,
        Self::Bye,
        Self::OutMeas,
        Self::LastMeas,
        Self::IsConv,
        Self::FiltType,
        Self::FiltState,
        Self::FiltReinit,
        Self::NReinits,
        Self::Ping,
        Self::IsInit,
    ];

    /// Look up a type code
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Wire code
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    fn carries_pose(self) -> bool {
        matches!(self, Self::Motn | Self::Mle | Self::Mmse)
    }
}

/// Type-dependent commsT body
#[derive(Debug, Clone, PartialEq)]
pub enum CommsBody {
    /// No body
    Empty,
    /// Pose (MOTN, MLE, MMSE)
    Pose(Box<Pose>),
    /// Measurement set (MEAS)
    Meas(Measurement),
    /// Vehicle drift rate (SET_VDR)
    DriftRate(f32),
    /// Initialization file names (INIT)
    Init(InitParams),
}

/// Legacy commsT message
#[derive(Debug, Clone, PartialEq)]
pub struct CommsMessage {
    /// Type code
    pub kind: CommsKind,
    /// Integer parameter
    pub parameter: i32,
    /// Body
    pub body: CommsBody,
}

impl CommsMessage {
    /// Message with no body
    #[must_use]
    pub fn new(kind: CommsKind, parameter: i32) -> Self {
        Self {
            kind,
            parameter,
            body: CommsBody::Empty,
        }
    }

    /// ACK
    #[must_use]
    pub fn ack() -> Self {
        Self::new(CommsKind::Ack, 0)
    }

    /// NACK
    #[must_use]
    pub fn nack() -> Self {
        Self::new(CommsKind::Nack, 0)
    }

    /// Message carrying a pose
    #[must_use]
    pub fn with_pose(kind: CommsKind, pose: Pose) -> Self {
        Self {
            kind,
            parameter: 0,
            body: CommsBody::Pose(Box::new(pose)),
        }
    }

    /// MEAS message
    #[must_use]
    pub fn with_meas(parameter: i32, meas: Measurement) -> Self {
        Self {
            kind: CommsKind::Meas,
            parameter,
            body: CommsBody::Meas(meas),
        }
    }

    /// SET_VDR message
    #[must_use]
    pub fn drift_rate(rate: f32) -> Self {
        Self {
            kind: CommsKind::SetVdr,
            parameter: 0,
            body: CommsBody::DriftRate(rate),
        }
    }

    /// INIT message
    #[must_use]
    pub fn init(params: InitParams) -> Self {
        Self {
            kind: CommsKind::Init,
            parameter: 0,
            body: CommsBody::Init(params),
        }
    }

    /// Encode without padding
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut body = BytesMut::new();
        match &self.body {
            CommsBody::Empty => {}
            CommsBody::Pose(pose) => pose.encode_into(&mut body),
            CommsBody::Meas(meas) => meas.encode_into(&mut body)?,
            CommsBody::DriftRate(rate) => body.put_f32_le(*rate),
            CommsBody::Init(params) => params.encode_into(&mut body),
        }

        let body_len = u32::try_from(body.len()).map_err(|_| protocol::Error::PayloadTooLarge {
            size: body.len(),
            max: COMMS_MSG_SIZE - COMMS_HEADER_SIZE,
        })?;
        let mut out = Vec::with_capacity(COMMS_HEADER_SIZE + body.len());
        out.put_u8(self.kind.code());
        out.put_i32_le(self.parameter);
        out.put_u32_le(body_len);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Encode zero-padded to [`COMMS_MSG_SIZE`]
    pub fn to_padded(&self) -> Result<Vec<u8>> {
        let mut out = self.encode()?;
        if out.len() > COMMS_MSG_SIZE {
            return Err(protocol::Error::PayloadTooLarge {
                size: out.len() - COMMS_HEADER_SIZE,
                max: COMMS_MSG_SIZE - COMMS_HEADER_SIZE,
            }
            .into());
        }
        out.resize(COMMS_MSG_SIZE, 0);
        Ok(out)
    }

    /// Decode from a (possibly padded) buffer
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < COMMS_HEADER_SIZE {
            return Err(protocol::Error::BufferTooSmall {
                needed: COMMS_HEADER_SIZE,
                got: bytes.len(),
            }
            .into());
        }
        let mut buf = bytes;
        let code = buf.get_u8();
        let kind = CommsKind::from_code(code).ok_or(ServiceError::UnknownType(code))?;
        let parameter = buf.get_i32_le();
        let body_len = buf.get_u32_le();

        let body = match kind {
            k if k.carries_pose() && body_len > 0 => {
                CommsBody::Pose(Box::new(Pose::decode_from(&mut buf)?))
            }
            CommsKind::Meas if body_len > 0 => CommsBody::Meas(Measurement::decode_from(&mut buf)?),
            CommsKind::SetVdr => {
                if buf.remaining() < 4 {
                    return Err(protocol::Error::BufferTooSmall {
                        needed: COMMS_HEADER_SIZE + 4,
                        got: bytes.len(),
                    }
                    .into());
                }
                CommsBody::DriftRate(buf.get_f32_le())
            }
            CommsKind::Init => CommsBody::Init(InitParams::decode_from(&mut buf)?),
            _ => CommsBody::Empty,
        };

        Ok(Self {
            kind,
            parameter,
            body,
        })
    }

    /// Filter request carried by this message, if any
    #[must_use]
    pub fn request(&self) -> Option<Request> {
        let pose = || match &self.body {
            CommsBody::Pose(pose) => Some((**pose).clone()),
            _ => None,
        };
        let flag = self.parameter != 0;

        Some(match self.kind {
            CommsKind::Init => match &self.body {
                CommsBody::Init(params) => Request::Init(params.clone()),
                _ => return None,
            },
            CommsKind::Meas => match &self.body {
                CommsBody::Meas(meas) => Request::Meas {
                    param: self.parameter,
                    meas: meas.clone(),
                },
                _ => return None,
            },
            CommsKind::Motn => Request::Motion(pose()?),
            CommsKind::Mle => Request::Estimate(EstimateKind::Mle, pose().unwrap_or_default()),
            CommsKind::Mmse => Request::Estimate(EstimateKind::Mmse, pose().unwrap_or_default()),
            CommsKind::LastMeas => Request::Query(Query::LastMeas),
            CommsKind::NReinits => Request::Query(Query::NumReinits),
            CommsKind::FiltType => Request::Query(Query::FilterType),
            CommsKind::FiltState => Request::Query(Query::FilterState),
            CommsKind::OutMeas => Request::Query(Query::OutstandingMeas),
            CommsKind::IsConv => Request::Query(Query::IsConverged),
            CommsKind::IsInit => Request::Query(Query::IsInitialized),
            CommsKind::FiltReinit => Request::Reinit,
            CommsKind::SetMw => Request::SetWeighting(self.parameter),
            CommsKind::SetFr => Request::SetFilterReinit(flag),
            CommsKind::SetIma => Request::SetInterpAttitude(flag),
            CommsKind::SetMim => Request::SetInterpMethod(self.parameter),
            CommsKind::SetVdr => match self.body {
                CommsBody::DriftRate(rate) => Request::SetDriftRate(f64::from(rate)),
                _ => return None,
            },
            CommsKind::FiltGrd => Request::FilterGrade(self.parameter),
            CommsKind::Ping => Request::Ping,
            CommsKind::Ack | CommsKind::Nack | CommsKind::Bye => return None,
        })
    }

    /// Reply message for a filter response
    #[must_use]
    pub fn reply(response: Response) -> Self {
        match response {
            Response::Ack | Response::Pong => Self::ack(),
            Response::Nack => Self::nack(),
            Response::Value(value) => Self::new(CommsKind::Ack, value),
            Response::Meas { param, meas } => Self::with_meas(param, meas),
            Response::Estimate(EstimateKind::Mle, pose) => Self::with_pose(CommsKind::Mle, pose),
            Response::Estimate(EstimateKind::Mmse, pose) => Self::with_pose(CommsKind::Mmse, pose),
        }
    }
}

impl fmt::Display for CommsMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "commsT {{type:{}|parameter:{}",
            char::from(self.kind.code()),
            self.parameter
        )?;
        match &self.body {
            CommsBody::Empty => {}
            CommsBody::Pose(pose) => write!(f, "|pose time:{:.2}", pose.time)?,
            CommsBody::Meas(meas) => {
                write!(f, "|meas time:{:.2}|numMeas:{}", meas.time, meas.num_meas())?;
            }
            CommsBody::DriftRate(rate) => write!(f, "|vdr:{rate}")?,
            CommsBody::Init(params) => write!(f, "|map:{}|cfg:{}", params.map, params.cfg)?,
        }
        f.write_str("}")
    }
}

/// Request family for legacy commsT clients
pub struct CommsFamily {
    filter: SharedFilter,
    read_retries: u32,
    read_delay: Duration,
}

impl CommsFamily {
    /// Family serving requests against `filter`
    #[must_use]
    pub fn new(filter: SharedFilter) -> Self {
        Self {
            filter,
            read_retries: COMMS_READ_RETRIES,
            read_delay: COMMS_READ_DELAY,
        }
    }

    /// Override the chunked read budget
    #[must_use]
    pub fn with_read_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.read_retries = retries.max(1);
        self.read_delay = delay;
        self
    }
}

impl fmt::Debug for CommsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommsFamily")
            .field("read_retries", &self.read_retries)
            .field("read_delay", &self.read_delay)
            .finish_non_exhaustive()
    }
}

impl MessageFamily for CommsFamily {
    fn kind(&self) -> FamilyKind {
        FamilyKind::Comms
    }

    fn read(&mut self, peer: &mut dyn Peer) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; COMMS_MSG_SIZE];
        let mut got = 0;
        let mut attempt = 0;

        while attempt < self.read_retries && got < buf.len() {
            match peer.recv(&mut buf[got..]) {
                Ok(0) if got == 0 => return Err(ServiceError::PeerClosed),
                Ok(0) => break,
                Ok(n) => got += n,
                Err(err) if is_no_data_io(&err) => {}
                Err(err) => return Err(err.into()),
            }
            // nothing pending on the first try
            if got == 0 && attempt == 0 {
                break;
            }
            if got < buf.len() {
                thread::sleep(self.read_delay);
            }
            attempt += 1;
        }

        trace!(peer = %peer.id(), bytes = got, attempts = attempt, "commsT read");
        if got == 0 {
            return Ok(None);
        }
        buf.truncate(got);
        Ok(Some(buf))
    }

    fn handle(&mut self, msg: &[u8], peer: &mut dyn Peer) -> Result<usize> {
        let reply = match CommsMessage::decode(msg) {
            Ok(request) => {
                debug!(peer = %peer.id(), msg = %request, "commsT request");
                match request.request() {
                    Some(req) => CommsMessage::reply(dispatch(&mut *self.filter.lock(), req)),
                    None => CommsMessage::nack(),
                }
            }
            Err(err) => {
                debug!(peer = %peer.id(), error = %err, "commsT request rejected");
                CommsMessage::nack()
            }
        };
        peer.send_all(&reply.to_padded()?)
    }
}
