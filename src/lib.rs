//! trnlink - Terrain-relative navigation update distribution
//!
//! This library carries TRN filter results from a navigation server to its
//! clients. It includes the framed request/reply message codec, the fixed
//! binary update record, a UDP update client, a reconnecting background
//! client context and the server-side request families.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use trnlink::context::{ContextConfig, UpdateContext};
//! use trnlink::transport::ClientConfig;
//!
//! let config = ContextConfig::new("trn-server.local", 8000).with_recon_timeout(10.0);
//! let mut ctx = UpdateContext::udp(config, ClientConfig::default())?;
//! ctx.start()?;
//!
//! // later, from the application loop
//! if let Ok((update, age)) = ctx.last_update_with_age() {
//!     println!("ping {} mmse ({:.1}, {:.1}) age {age:.2}s",
//!         update.ping_number, update.mmse.x, update.mmse.y);
//! }
//!
//! ctx.stop()?;
//! # Ok::<(), trnlink::context::ContextError>(())
//! ```
//!
//! # Layers
//!
//! - [`protocol`] - framed messages: sync word, id, checksum, length, payload
//! - [`update`] - the 396-byte update record published over UDP
//! - [`transport`] - synchronous update client with ACK/NAK discrimination
//! - [`context`] - worker thread that connects, listens and reconnects
//! - [`service`] - server-side read/handle/publish per message family

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod context;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod update;

pub use context::{ContextConfig, ContextError, UpdateContext};
pub use protocol::{Error, MAX_PAYLOAD_SIZE, Message, MessageHeader, MessageId, Result};
pub use transport::{ClientConfig, TransportError, UpdateClient};
pub use update::{TRNU_PUB_BYTES, UpdateRecord};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default update server port
pub const DEFAULT_PORT: u16 = context::DEFAULT_PORT;
