//! UDP update transport
//!
//! A thin synchronous client for one update server: control requests
//! (`CON`, `DIS`, `RST`, `HBT`) answered by `ACK`/`NAK`, and unsolicited
//! update records, multiplexed on one socket.

mod client;
mod control;
mod error;
mod socket;

pub use client::{ACK_DELAY, ACK_RETRIES, ClientConfig, UpdateClient};
pub use control::{Control, REPLY_BYTES, Reply};
pub use error::{Result, TransportError};
pub(crate) use error::is_no_data as is_no_data_io;
pub use socket::{Connector, Link, LinkMode, UdpConnector, UdpLink, Wait};

#[cfg(test)]
pub(crate) use client::tests::{ScriptedConnector, record as scripted_record};
