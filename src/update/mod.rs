//! TRN update record
//!
//! The update record is the fixed-size binary snapshot of filter state that a
//! TRN server publishes to its clients, one record per UDP datagram.

mod record;

pub use record::{Estimate, FilterState, UpdateRecord};

/// Update record sync word: "TZDS" in ASCII (little-endian)
pub const TRNU_PUB_SYNC: u32 = 0x5344_5A54;

/// Encoded update record size in bytes (packed)
pub const TRNU_PUB_BYTES: usize = 396;

/// Number of estimates carried in a record
pub const TRNU_EST_COUNT: usize = 5;

/// Application callback invoked with each received record
pub type UpdateCallback = std::sync::Arc<dyn Fn(&UpdateRecord) + Send + Sync>;
