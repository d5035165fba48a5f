//! Background worker driving the update transport

use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::{ContextConfig, ContextStats, CtxAction, CtxState, SessionLog, UpdateTransport, epoch_secs};
use crate::update::{UpdateCallback, UpdateRecord};

/// State shared by the application and the worker.
///
/// `record`, `arrival` and `new_count` change together under one lock.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub record: UpdateRecord,
    pub arrival: Option<f64>,
    pub new_count: u32,
    pub stats: ContextStats,
    pub state: CtxState,
    pub action: CtxAction,
    pub stop: bool,
    pub reconnect_req: bool,
    pub reset_req: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub state: Mutex<SharedState>,
    wake: Condvar,
}

impl Shared {
    /// Sleep for `delay` unless a stop is requested first.
    fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let mut guard = self.state.lock();
        self.wake.wait_while_for(&mut guard, |s| !s.stop, delay);
    }

    pub fn request_stop(&self) {
        self.state.lock().stop = true;
        self.wake.notify_all();
    }
}

pub(crate) struct Worker<T> {
    transport: T,
    shared: Arc<Shared>,
    config: ContextConfig,
    callback: Option<UpdateCallback>,
    log: Option<SessionLog>,
    state_since: Instant,
    last_rx: Instant,
    last_hbeat: Instant,
    last_stats: Instant,
}

impl<T: UpdateTransport> Worker<T> {
    pub fn new(
        transport: T,
        shared: Arc<Shared>,
        config: ContextConfig,
        callback: Option<UpdateCallback>,
        log: Option<SessionLog>,
    ) -> Self {
        let now = Instant::now();
        Self {
            transport,
            shared,
            config,
            callback,
            log,
            state_since: now,
            last_rx: now,
            last_hbeat: now,
            last_stats: now,
        }
    }

    /// Run until stopped; hands the transport back for a later restart.
    pub fn run(mut self) -> T {
        info!(host = %self.config.host, port = self.config.port, "update worker started");

        loop {
            let state = {
                let shared = self.shared.state.lock();
                if shared.stop {
                    break;
                }
                shared.state
            };

            match state {
                CtxState::Connecting => self.connect(),
                CtxState::Listening => {
                    self.listen();
                    self.service_listening();
                }
                _ => self.enter(CtxState::Connecting),
            }

            if let Some(period) = self.config.stats_period() {
                if self.last_stats.elapsed() >= period {
                    self.emit_stats();
                }
            }
        }

        self.shutdown();
        self.transport
    }

    fn connect(&mut self) {
        match self
            .transport
            .open_session(&self.config.host, self.config.port)
        {
            Ok(()) => {
                let now = Instant::now();
                self.last_rx = now;
                self.last_hbeat = now;
                self.enter(CtxState::Listening);
                {
                    let mut shared = self.shared.state.lock();
                    shared.stats.n_connect += 1;
                    shared.reconnect_req = false;
                }
                info!(host = %self.config.host, port = self.config.port, "connected");
                self.note("connect", format_args!("{}:{}", self.config.host, self.config.port));
                self.accept_absorbed();
            }
            Err(err) => {
                self.shared.state.lock().stats.n_connect_err += 1;
                debug!(error = %err, "connect failed");
                self.shared.pause(self.config.erecon_delay());
            }
        }
    }

    // The lock is only held to publish results, never across the receive.
    fn listen(&mut self) {
        match self.transport.receive_update(self.config.listen_timeout()) {
            Ok(record) => self.accept(record),
            Err(err) => {
                self.shared.state.lock().stats.n_listen_err += 1;
                if !err.is_no_data() {
                    debug!(error = %err, "listen failed");
                }
                self.shared.pause(self.config.enodata_delay());
            }
        }
    }

    fn accept(&mut self, record: UpdateRecord) {
        let arrival = epoch_secs();
        {
            let mut shared = self.shared.state.lock();
            shared.record = record;
            shared.arrival = Some(arrival);
            shared.new_count = shared.new_count.saturating_add(1);
            shared.stats.n_update += 1;
        }
        self.last_rx = Instant::now();
        if let Some(callback) = &self.callback {
            callback(&record);
        }
    }

    // Records the transport consumed while waiting for a control reply.
    fn accept_absorbed(&mut self) {
        for record in self.transport.take_absorbed() {
            self.accept(record);
        }
    }

    // Runs after every listen, successful or not.
    fn service_listening(&mut self) {
        let (reset, reconnect) = {
            let mut shared = self.shared.state.lock();
            (
                mem::take(&mut shared.reset_req),
                mem::take(&mut shared.reconnect_req),
            )
        };

        if reset {
            match self.transport.request_reset() {
                Ok(reply) => {
                    if reply.is_ack() {
                        self.shared.state.lock().stats.n_reset += 1;
                    }
                    self.note("reset", format_args!("{reply:?}"));
                }
                Err(err) => warn!(error = %err, "reset request failed"),
            }
            self.accept_absorbed();
        }

        if let Some(period) = self.config.hbeat_period() {
            if self.last_hbeat.elapsed() >= period {
                self.last_hbeat = Instant::now();
                match self.transport.send_hbeat() {
                    Ok(_) => self.shared.state.lock().stats.n_hbeat += 1,
                    Err(err) => debug!(error = %err, "heartbeat failed"),
                }
                self.accept_absorbed();
            }
        }

        let timed_out = self
            .config
            .recon_timeout()
            .is_some_and(|timeout| self.last_rx.elapsed() > timeout);

        if reconnect || timed_out {
            {
                let mut shared = self.shared.state.lock();
                if reconnect {
                    shared.stats.n_reconnect_req += 1;
                } else {
                    shared.stats.n_recon_timeout += 1;
                }
            }
            let reason = if reconnect { "request" } else { "timeout" };
            info!(reason, "reconnecting");
            self.disconnect(reason);
            self.enter(CtxState::Connecting);
        }
    }

    fn disconnect(&mut self, reason: &str) {
        self.shared.state.lock().action = CtxAction::Disconnect;
        if let Err(err) = self.transport.close_session() {
            debug!(error = %err, "disconnect failed");
        }
        self.shared.state.lock().stats.n_disconnect += 1;
        self.note("disconnect", reason);
    }

    fn enter(&mut self, next: CtxState) {
        let now = Instant::now();
        let spent = now - self.state_since;
        self.state_since = now;

        let mut shared = self.shared.state.lock();
        accumulate(&mut shared, spent);
        shared.state = next;
        shared.action = match next {
            CtxState::Connecting => CtxAction::Connect,
            CtxState::Listening => CtxAction::Listen,
            _ => CtxAction::Nop,
        };
    }

    fn emit_stats(&mut self) {
        let now = Instant::now();
        let spent = now - self.state_since;
        self.state_since = now;
        self.last_stats = now;

        let stats = {
            let mut shared = self.shared.state.lock();
            accumulate(&mut shared, spent);
            shared.stats.clone()
        };
        stats.emit();
        self.note("stats", &stats);
    }

    fn shutdown(&mut self) {
        if self.shared.state.lock().state == CtxState::Listening {
            self.disconnect("stop");
        }
        self.emit_stats();
        self.enter(CtxState::Stopped);
        info!("update worker stopped");
    }

    fn note(&self, event: &str, detail: impl std::fmt::Display) {
        if let Some(log) = &self.log {
            if let Err(err) = log.record(event, detail) {
                warn!(error = %err, "session log write failed");
            }
        }
    }
}

fn accumulate(shared: &mut SharedState, spent: Duration) {
    match shared.state {
        CtxState::Connecting => shared.stats.connecting_time += spent,
        CtxState::Listening => shared.stats.listening_time += spent,
        _ => {}
    }
}
