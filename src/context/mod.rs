//! Reconnecting update client context
//!
//! [`UpdateContext`] runs an update transport on a background worker. The
//! worker connects, listens, sends heartbeats and reconnects when updates stop
//! arriving; the application reads the latest record and statistics through
//! short, lock-guarded accessors that never touch the network.

mod config;
mod session_log;
mod state;
mod stats;
mod worker;

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::warn;

use crate::transport::{self, ClientConfig, Connector, Reply, UpdateClient};
use crate::update::{UpdateCallback, UpdateRecord};

pub use config::{ContextConfig, DEFAULT_PORT};
pub use session_log::SessionLog;
pub use state::{CtxAction, CtxState};
pub use stats::ContextStats;

use worker::{Shared, Worker};

/// Context errors
#[derive(Error, Debug)]
pub enum ContextError {
    /// Worker already started
    #[error("worker already running")]
    AlreadyRunning,

    /// Operation needs a listening session
    #[error("not connected")]
    NotConnected,

    /// No update received yet
    #[error("no update received")]
    NoUpdate,

    /// Worker thread panicked; the transport is lost
    #[error("worker thread panicked")]
    WorkerPanicked,

    /// I/O error (thread spawn, session log)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ContextError>;

/// Transport operations the worker needs.
pub trait UpdateTransport: Send + 'static {
    /// Open a session, replacing any previous one.
    fn open_session(&mut self, host: &str, port: u16) -> transport::Result<()>;

    /// Close the session.
    fn close_session(&mut self) -> transport::Result<()>;

    /// Request a filter reset.
    fn request_reset(&mut self) -> transport::Result<Reply>;

    /// Send a heartbeat.
    fn send_hbeat(&mut self) -> transport::Result<Reply>;

    /// Receive one update; `None` uses the transport's own listen mode.
    fn receive_update(&mut self, timeout: Option<Duration>) -> transport::Result<UpdateRecord>;

    /// Records that arrived during the last connect, reset or heartbeat
    /// exchange, oldest first.
    fn take_absorbed(&mut self) -> Vec<UpdateRecord> {
        Vec::new()
    }
}

impl<C> UpdateTransport for UpdateClient<C>
where
    C: Connector + Send + 'static,
    C::Link: Send,
{
    fn open_session(&mut self, host: &str, port: u16) -> transport::Result<()> {
        self.connect(host, port)
    }

    fn close_session(&mut self) -> transport::Result<()> {
        self.disconnect()
    }

    fn request_reset(&mut self) -> transport::Result<Reply> {
        self.reset_trn()
    }

    fn send_hbeat(&mut self) -> transport::Result<Reply> {
        self.hbeat()
    }

    fn receive_update(&mut self, timeout: Option<Duration>) -> transport::Result<UpdateRecord> {
        match timeout {
            Some(timeout) => self.listen_timeout(timeout, false),
            None => self.listen(false),
        }
    }

    fn take_absorbed(&mut self) -> Vec<UpdateRecord> {
        UpdateClient::take_absorbed(self)
    }
}

/// Background update client with thread-safe snapshot accessors.
pub struct UpdateContext<T: UpdateTransport = UpdateClient> {
    config: ContextConfig,
    shared: Arc<Shared>,
    transport: Option<T>,
    worker: Option<JoinHandle<T>>,
    callback: Option<UpdateCallback>,
    log: Option<SessionLog>,
}

impl UpdateContext<UpdateClient> {
    /// Context over a UDP update client.
    pub fn udp(config: ContextConfig, client: ClientConfig) -> Result<Self> {
        Self::new(config, UpdateClient::new(client))
    }
}

impl<T: UpdateTransport> UpdateContext<T> {
    /// Create a stopped context; opens the session log if enabled.
    pub fn new(config: ContextConfig, transport: T) -> Result<Self> {
        let log = if config.log_enable {
            Some(SessionLog::create(&config.log_dir, &config.log_name)?)
        } else {
            None
        };

        Ok(Self {
            config,
            shared: Arc::new(Shared::default()),
            transport: Some(transport),
            worker: None,
            callback: None,
            log,
        })
    }

    /// Set the callback run on the worker thread for each update.
    #[must_use]
    pub fn with_callback(mut self, callback: UpdateCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Session log, if enabled
    #[must_use]
    pub fn session_log(&self) -> Option<&SessionLog> {
        self.log.as_ref()
    }

    /// Spawn the worker.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(ContextError::AlreadyRunning);
        }
        let transport = self.transport.take().ok_or(ContextError::WorkerPanicked)?;

        {
            let mut shared = self.shared.state.lock();
            shared.stop = false;
            shared.reconnect_req = false;
            shared.reset_req = false;
            shared.state = CtxState::Connecting;
            shared.action = CtxAction::Connect;
        }

        let worker = Worker::new(
            transport,
            Arc::clone(&self.shared),
            self.config.clone(),
            self.callback.clone(),
            self.log.clone(),
        );
        let handle = thread::Builder::new()
            .name("trnucli-ctx".to_string())
            .spawn(move || worker.run())?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Stop the worker and wait for it; a no-op when not running.
    pub fn stop(&mut self) -> Result<()> {
        let joined = self.worker.take().map(|handle| {
            self.shared.request_stop();
            handle.join()
        });

        {
            let mut shared = self.shared.state.lock();
            shared.state = CtxState::Stopped;
            shared.action = CtxAction::Nop;
        }

        match joined {
            None => Ok(()),
            Some(Ok(transport)) => {
                self.transport = Some(transport);
                Ok(())
            }
            Some(Err(_)) => Err(ContextError::WorkerPanicked),
        }
    }

    /// Copy out the latest record; clears `new_count`.
    pub fn last_update(&self) -> Result<UpdateRecord> {
        self.last_update_with_age().map(|(record, _)| record)
    }

    /// Copy out the latest record and its age in seconds; clears `new_count`.
    pub fn last_update_with_age(&self) -> Result<(UpdateRecord, f64)> {
        let mut shared = self.shared.state.lock();
        let arrival = shared.arrival.ok_or(ContextError::NoUpdate)?;
        shared.new_count = 0;
        Ok((shared.record, epoch_secs() - arrival))
    }

    /// Updates received since the last `last_update`
    #[must_use]
    pub fn new_count(&self) -> u32 {
        self.shared.state.lock().new_count
    }

    /// Arrival time of the latest update (epoch seconds)
    #[must_use]
    pub fn update_arrtime(&self) -> Option<f64> {
        self.shared.state.lock().arrival
    }

    /// Seconds since the latest update arrived
    #[must_use]
    pub fn update_arrage(&self) -> Option<f64> {
        self.update_arrtime().map(|t| epoch_secs() - t)
    }

    /// Sensor time of the latest update (epoch seconds)
    #[must_use]
    pub fn update_mb1time(&self) -> Option<f64> {
        self.with_record(|r| r.mb1_time)
    }

    /// Seconds since the latest update's sensor time
    #[must_use]
    pub fn update_mb1age(&self) -> Option<f64> {
        self.update_mb1time().map(|t| epoch_secs() - t)
    }

    /// Server processing time of the latest update (epoch seconds)
    #[must_use]
    pub fn update_hosttime(&self) -> Option<f64> {
        self.with_record(|r| r.update_time)
    }

    /// Seconds since the latest update's server processing time
    #[must_use]
    pub fn update_hostage(&self) -> Option<f64> {
        self.update_hosttime().map(|t| epoch_secs() - t)
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> CtxState {
        self.shared.state.lock().state
    }

    /// Current state name
    #[must_use]
    pub fn state_str(&self) -> &'static str {
        self.state().as_str()
    }

    /// Current worker action
    #[must_use]
    pub fn action(&self) -> CtxAction {
        self.shared.state.lock().action
    }

    /// True while listening
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == CtxState::Listening
    }

    /// Copy of the statistics
    #[must_use]
    pub fn stats(&self) -> ContextStats {
        self.shared.state.lock().stats.clone()
    }

    /// Ask the worker to send a reset on its next iteration.
    ///
    /// Confirmation arrives asynchronously as a `reinit_count` change.
    pub fn reset_trn(&self) -> Result<()> {
        let mut shared = self.shared.state.lock();
        if shared.state != CtxState::Listening {
            return Err(ContextError::NotConnected);
        }
        shared.reset_req = true;
        Ok(())
    }

    /// Ask the worker to drop and reopen the session.
    pub fn reconnect(&self) {
        self.shared.state.lock().reconnect_req = true;
    }

    fn with_record<R>(&self, f: impl FnOnce(&UpdateRecord) -> R) -> Option<R> {
        let shared = self.shared.state.lock();
        shared.arrival.map(|_| f(&shared.record))
    }
}

impl<T: UpdateTransport> Drop for UpdateContext<T> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "update context stop failed");
        }
    }
}

pub(crate) fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ScriptedConnector, scripted_record};

    fn scripted_context(script: &ScriptedConnector) -> UpdateContext<UpdateClient<ScriptedConnector>> {
        let client = UpdateClient::with_connector(
            ClientConfig::default().with_ack_retries(3, Duration::from_millis(1)),
            script.clone(),
        );
        let config = ContextConfig::new("localhost", 8000).with_delays(0, 5, 5);
        UpdateContext::new(config, client).unwrap()
    }

    fn wait_for(ctx: &UpdateContext<impl UpdateTransport>, cond: impl Fn(&ContextStats) -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !cond(&ctx.stats()) {
            assert!(std::time::Instant::now() < deadline, "timed out: {}", ctx.stats());
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_stop_without_start() {
        let script = ScriptedConnector::default();
        let mut ctx = scripted_context(&script);

        ctx.stop().unwrap();
        ctx.stop().unwrap();
        assert_eq!(ctx.state(), CtxState::Stopped);
        assert!(matches!(ctx.last_update(), Err(ContextError::NoUpdate)));
        assert_eq!(ctx.update_arrage(), None);
    }

    #[test]
    fn test_update_client_under_worker() {
        let script = ScriptedConnector::default();
        script
            .0
            .lock()
            .inbound
            .extend([Some(b"ACK\0".to_vec()), Some(scripted_record(11))]);

        let mut ctx = scripted_context(&script);
        ctx.start().unwrap();
        assert!(matches!(ctx.start(), Err(ContextError::AlreadyRunning)));
        wait_for(&ctx, |s| s.n_update == 1);

        assert!(ctx.is_connected());
        assert_eq!(ctx.new_count(), 1);
        let (record, age) = ctx.last_update_with_age().unwrap();
        assert_eq!(record.ping_number, 11);
        assert!(age >= 0.0);
        assert_eq!(ctx.new_count(), 0);

        ctx.stop().unwrap();
        assert_eq!(ctx.state(), CtxState::Stopped);
        assert_eq!(ctx.stats().n_disconnect, 1);
        assert_eq!(script.0.lock().sent.last().unwrap(), b"DIS\0");
    }

    #[test]
    fn test_reset_requires_listening() {
        let script = ScriptedConnector::default();
        let ctx = scripted_context(&script);
        assert!(matches!(ctx.reset_trn(), Err(ContextError::NotConnected)));
    }

    #[test]
    fn test_reset_forwarded_by_worker() {
        let script = ScriptedConnector::default();
        script.0.lock().auto_ack = true;

        let mut ctx = scripted_context(&script);
        ctx.start().unwrap();
        wait_for(&ctx, |s| s.n_connect == 1);

        ctx.reset_trn().unwrap();
        wait_for(&ctx, |s| s.n_reset == 1);
        ctx.stop().unwrap();

        assert!(script.0.lock().sent.iter().any(|m| m == b"RST\0"));
    }
}
