//! Reconnecting context configuration

use std::path::PathBuf;
use std::time::Duration;

/// Default update server port
pub const DEFAULT_PORT: u16 = 8000;

/// Context configuration.
///
/// Timeouts keep their traditional units; a value of zero (or below) turns
/// the corresponding policy off.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContextConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Heartbeat period in seconds
    pub hbeat_to_sec: f64,
    /// Per-listen receive timeout in milliseconds; zero uses the client's
    /// own listen mode
    pub listen_to_ms: u32,
    /// Delay after a failed listen in milliseconds
    pub enodata_delay_ms: u32,
    /// Delay after a failed connect in milliseconds
    pub erecon_delay_ms: u32,
    /// Reconnect when no update arrives for this many seconds
    pub recon_to_sec: f64,
    /// Stats logging period in seconds
    pub stats_log_period_sec: f64,
    /// Write a session log file
    pub log_enable: bool,
    /// Session log directory
    pub log_dir: PathBuf,
    /// Session log name prefix
    pub log_name: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            hbeat_to_sec: 0.0,
            listen_to_ms: 50,
            enodata_delay_ms: 10,
            erecon_delay_ms: 5000,
            recon_to_sec: 0.0,
            stats_log_period_sec: 0.0,
            log_enable: false,
            log_dir: PathBuf::from("."),
            log_name: "trnucli".to_string(),
        }
    }
}

impl ContextConfig {
    /// Configuration for a server with default policies
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the heartbeat period
    #[must_use]
    pub fn with_hbeat(mut self, sec: f64) -> Self {
        self.hbeat_to_sec = sec;
        self
    }

    /// Set the reconnect timeout
    #[must_use]
    pub fn with_recon_timeout(mut self, sec: f64) -> Self {
        self.recon_to_sec = sec;
        self
    }

    /// Set listen timeout and error delays
    #[must_use]
    pub fn with_delays(mut self, listen_to_ms: u32, enodata_delay_ms: u32, erecon_delay_ms: u32) -> Self {
        self.listen_to_ms = listen_to_ms;
        self.enodata_delay_ms = enodata_delay_ms;
        self.erecon_delay_ms = erecon_delay_ms;
        self
    }

    /// Set the stats logging period
    #[must_use]
    pub fn with_stats_period(mut self, sec: f64) -> Self {
        self.stats_log_period_sec = sec;
        self
    }

    /// Enable the session log
    #[must_use]
    pub fn with_log(mut self, dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        self.log_enable = true;
        self.log_dir = dir.into();
        self.log_name = name.into();
        self
    }

    /// Heartbeat period, if enabled
    #[must_use]
    pub fn hbeat_period(&self) -> Option<Duration> {
        positive_secs(self.hbeat_to_sec)
    }

    /// Per-listen timeout, if set
    #[must_use]
    pub fn listen_timeout(&self) -> Option<Duration> {
        (self.listen_to_ms > 0).then(|| Duration::from_millis(u64::from(self.listen_to_ms)))
    }

    /// Delay after a failed listen
    #[must_use]
    pub fn enodata_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.enodata_delay_ms))
    }

    /// Delay after a failed connect
    #[must_use]
    pub fn erecon_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.erecon_delay_ms))
    }

    /// Reconnect timeout, if enabled
    #[must_use]
    pub fn recon_timeout(&self) -> Option<Duration> {
        positive_secs(self.recon_to_sec)
    }

    /// Stats logging period, if enabled
    #[must_use]
    pub fn stats_period(&self) -> Option<Duration> {
        positive_secs(self.stats_log_period_sec)
    }
}

fn positive_secs(sec: f64) -> Option<Duration> {
    if sec > 0.0 {
        Duration::try_from_secs_f64(sec).ok()
    } else {
        None
    }
}
