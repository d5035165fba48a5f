//! Running counters and time-in-state accumulators

use std::fmt;
use std::time::Duration;

use tracing::info;

/// Context statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContextStats {
    /// Successful connects
    pub n_connect: u64,
    /// Sessions closed
    pub n_disconnect: u64,
    /// Resets acknowledged
    pub n_reset: u64,
    /// Updates received
    pub n_update: u64,
    /// Heartbeats acknowledged
    pub n_hbeat: u64,
    /// Reconnects forced by the reconnect timeout
    pub n_recon_timeout: u64,
    /// Failed listens (including no data)
    pub n_listen_err: u64,
    /// Failed connects
    pub n_connect_err: u64,
    /// Reconnects requested by the application
    pub n_reconnect_req: u64,
    /// Time spent connecting
    pub connecting_time: Duration,
    /// Time spent listening
    pub listening_time: Duration,
}

impl ContextStats {
    /// Emit a structured stats event
    pub fn emit(&self) {
        info!(
            target: "trnlink::stats",
            n_connect = self.n_connect,
            n_disconnect = self.n_disconnect,
            n_reset = self.n_reset,
            n_update = self.n_update,
            n_hbeat = self.n_hbeat,
            n_recon_timeout = self.n_recon_timeout,
            n_listen_err = self.n_listen_err,
            n_connect_err = self.n_connect_err,
            n_reconnect_req = self.n_reconnect_req,
            connecting_sec = self.connecting_time.as_secs_f64(),
            listening_sec = self.listening_time.as_secs_f64(),
            "update context stats"
        );
    }
}

impl fmt::Display for ContextStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "con {} dis {} rst {} upd {} hbt {} rto {} lerr {} cerr {} rreq {} tcon {:.3} tlis {:.3}",
            self.n_connect,
            self.n_disconnect,
            self.n_reset,
            self.n_update,
            self.n_hbeat,
            self.n_recon_timeout,
            self.n_listen_err,
            self.n_connect_err,
            self.n_reconnect_req,
            self.connecting_time.as_secs_f64(),
            self.listening_time.as_secs_f64()
        )
    }
}
