//! Synchronous update client over one UDP link.

use std::fmt;
use std::mem;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace, warn};

use super::control::{Control, Reply};
use super::error::{Result, TransportError, is_no_data};
use super::socket::{Connector, Link, LinkMode, UdpConnector, Wait};
use crate::update::{TRNU_PUB_BYTES, UpdateCallback, UpdateRecord};

/// Default number of receive attempts while waiting for ACK/NAK.
pub const ACK_RETRIES: u32 = 10;

/// Default delay between ACK/NAK receive attempts.
pub const ACK_DELAY: Duration = Duration::from_millis(100);

// one byte over a record so oversized datagrams are detected
const RECV_BYTES: usize = TRNU_PUB_BYTES + 1;

/// Update client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientConfig {
    /// Wait for the connect ACK with blocking receives instead of polling.
    pub blocking_connect: bool,
    /// `listen` blocks until a datagram arrives.
    pub blocking_listen: bool,
    /// Send `CON` and wait for a reply on connect.
    pub send_connect: bool,
    /// Subscribe to a multicast group instead of a unicast server.
    pub multicast: bool,
    /// Receive attempts while waiting for ACK/NAK.
    pub ack_retries: u32,
    /// Delay between ACK/NAK receive attempts.
    pub ack_delay: Duration,
    /// Heartbeat period; zero disables.
    pub hbeat_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            blocking_connect: false,
            blocking_listen: false,
            send_connect: true,
            multicast: false,
            ack_retries: ACK_RETRIES,
            ack_delay: ACK_DELAY,
            hbeat_timeout: Duration::ZERO,
        }
    }
}

impl ClientConfig {
    /// Set blocking listen.
    #[must_use]
    pub fn with_blocking_listen(mut self, blocking: bool) -> Self {
        self.blocking_listen = blocking;
        self
    }

    /// Set the ACK retry budget.
    #[must_use]
    pub fn with_ack_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.ack_retries = retries;
        self.ack_delay = delay;
        self
    }

    /// Set the heartbeat period.
    #[must_use]
    pub fn with_hbeat_timeout(mut self, timeout: Duration) -> Self {
        self.hbeat_timeout = timeout;
        self
    }

    /// Use multicast mode.
    #[must_use]
    pub fn with_multicast(mut self, multicast: bool) -> Self {
        self.multicast = multicast;
        self
    }
}

/// Update client: control requests and update reception on one link.
///
/// Not thread-safe; a single owner drives it.
pub struct UpdateClient<C: Connector = UdpConnector> {
    config: ClientConfig,
    connector: C,
    link: Option<C::Link>,
    callback: Option<UpdateCallback>,
    update: UpdateRecord,
    absorbed: Vec<UpdateRecord>,
    last_hbeat: Option<Instant>,
}

impl UpdateClient<UdpConnector> {
    /// Create a UDP update client.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, UdpConnector)
    }
}

impl<C: Connector> UpdateClient<C> {
    /// Create a client over a custom connector.
    pub fn with_connector(config: ClientConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            link: None,
            callback: None,
            update: UpdateRecord::default(),
            absorbed: Vec::new(),
            last_hbeat: None,
        }
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// True while a link is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Most recent record received.
    #[must_use]
    pub fn update(&self) -> &UpdateRecord {
        &self.update
    }

    /// Drain the records that arrived while the last control request waited
    /// for its reply, oldest first.
    pub fn take_absorbed(&mut self) -> Vec<UpdateRecord> {
        mem::take(&mut self.absorbed)
    }

    /// Replace the update callback; applies from the next `listen`.
    pub fn set_callback(&mut self, callback: Option<UpdateCallback>) {
        self.callback = callback;
    }

    /// Open a fresh link and, unless disabled or multicast, request updates.
    ///
    /// Any previous link is dropped first. Both ACK and NAK complete the
    /// request.
    #[instrument(level = "debug", skip(self))]
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.link = None;

        let mode = if self.config.multicast {
            LinkMode::Multicast
        } else {
            LinkMode::Unicast
        };
        self.link = Some(self.connector.open(host, port, mode)?);

        if mode == LinkMode::Unicast && self.config.send_connect {
            let wait = if self.config.blocking_connect {
                Wait::Timeout(self.config.ack_delay)
            } else {
                Wait::Poll
            };
            match self.request(Control::Connect, wait) {
                Ok(reply) => debug!(?reply, "connect acknowledged"),
                Err(err) => {
                    self.link = None;
                    return Err(err);
                }
            }
        }

        self.last_hbeat = Some(Instant::now());
        Ok(())
    }

    /// Send `DIS` (best effort) and close the link.
    #[instrument(level = "debug", skip(self))]
    pub fn disconnect(&mut self) -> Result<()> {
        let mut link = self.link.take().ok_or(TransportError::NotConnected)?;
        if !self.config.multicast {
            link.send(Control::Disconnect.as_bytes())?;
        }
        Ok(())
    }

    /// Ask the server to reinitialize its filter.
    ///
    /// The reply confirms receipt only; a later record's `reinit_count`
    /// confirms the reset.
    #[instrument(level = "debug", skip(self))]
    pub fn reset_trn(&mut self) -> Result<Reply> {
        if self.config.multicast {
            return Err(TransportError::Unsupported("reset in multicast mode"));
        }
        self.request(Control::Reset, Wait::Poll)
    }

    /// Send a heartbeat and wait for the reply.
    #[instrument(level = "trace", skip(self))]
    pub fn hbeat(&mut self) -> Result<Reply> {
        if self.config.multicast {
            return Err(TransportError::Unsupported("heartbeat in multicast mode"));
        }
        let reply = self.request(Control::Heartbeat, Wait::Poll)?;
        self.last_hbeat = Some(Instant::now());
        Ok(reply)
    }

    /// True when a heartbeat period is set and has elapsed.
    #[must_use]
    pub fn hbeat_due(&self) -> bool {
        if self.config.hbeat_timeout.is_zero() || self.config.multicast {
            return false;
        }
        self.last_hbeat
            .is_none_or(|last| last.elapsed() >= self.config.hbeat_timeout)
    }

    /// Receive one record, blocking or polling per configuration.
    pub fn listen(&mut self, invoke_callback: bool) -> Result<UpdateRecord> {
        let wait = if self.config.blocking_listen {
            Wait::Block
        } else {
            Wait::Poll
        };
        self.receive(wait, invoke_callback)
    }

    /// Receive one record, waiting at most `timeout`.
    pub fn listen_timeout(
        &mut self,
        timeout: Duration,
        invoke_callback: bool,
    ) -> Result<UpdateRecord> {
        self.receive(Wait::Timeout(timeout), invoke_callback)
    }

    fn receive(&mut self, wait: Wait, invoke_callback: bool) -> Result<UpdateRecord> {
        let link = self.link.as_mut().ok_or(TransportError::NotConnected)?;

        let mut buf = [0u8; RECV_BYTES];
        let len = link.recv(&mut buf, wait)?;
        if len != TRNU_PUB_BYTES {
            return Err(TransportError::UnexpectedSize {
                got: len,
                expected: TRNU_PUB_BYTES,
            });
        }

        let record = UpdateRecord::from_bytes(&buf[..len])?;
        self.update = record;
        trace!(ping = record.ping_number, "update received");

        if invoke_callback {
            if let Some(callback) = &self.callback {
                callback(&self.update);
            }
        }
        Ok(record)
    }

    fn request(&mut self, control: Control, wait: Wait) -> Result<Reply> {
        let link = self.link.as_mut().ok_or(TransportError::NotConnected)?;
        link.send(control.as_bytes())?;
        self.absorbed.clear();
        self.await_reply(wait)
    }

    // Every attempt counts against the retry budget, including attempts that
    // find an update record or a stray datagram instead of the reply.
    fn await_reply(&mut self, wait: Wait) -> Result<Reply> {
        let retries = self.config.ack_retries.max(1);
        let mut buf = [0u8; RECV_BYTES];

        for attempt in 1..=retries {
            let link = self.link.as_mut().ok_or(TransportError::NotConnected)?;
            match link.peek(&mut buf, wait) {
                Ok(len) => {
                    let head = &buf[..len];
                    if let Some(reply) = Reply::parse(head) {
                        link.recv(&mut buf, Wait::Poll)?;
                        trace!(?reply, attempt, "reply received");
                        return Ok(reply);
                    }
                    if UpdateRecord::has_sync(head) {
                        match self.receive(Wait::Poll, false) {
                            Ok(record) => self.absorbed.push(record),
                            Err(err) => debug!(error = %err, "update during reply wait rejected"),
                        }
                        continue;
                    }
                    debug!(len, "discarding unexpected datagram");
                    link.recv(&mut buf, Wait::Poll)?;
                }
                Err(err) if is_no_data(&err) => {
                    if wait == Wait::Poll {
                        thread::sleep(self.config.ack_delay);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(retries, "no reply within retry budget");
        Err(TransportError::AckTimeout { retries })
    }
}

impl<C: Connector> fmt::Debug for UpdateClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateClient")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .field("callback", &self.callback.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    /// Scripted inbound datagrams; `None` is an empty receive slot.
    #[derive(Debug, Default)]
    pub(crate) struct Script {
        pub inbound: VecDeque<Option<Vec<u8>>>,
        pub sent: Vec<Vec<u8>>,
        pub opens: usize,
        /// Queue an ACK ahead of everything else for each request sent
        pub auto_ack: bool,
    }

    #[derive(Debug)]
    pub(crate) struct ScriptedLink(Arc<Mutex<Script>>);

    impl Link for ScriptedLink {
        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut script = self.0.lock();
            script.sent.push(buf.to_vec());
            if script.auto_ack && buf != Control::Disconnect.as_bytes() {
                script.inbound.push_front(Some(Reply::Ack.as_bytes().to_vec()));
            }
            Ok(buf.len())
        }

        fn recv(&mut self, buf: &mut [u8], _wait: Wait) -> io::Result<usize> {
            match self.0.lock().inbound.pop_front() {
                Some(Some(data)) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                _ => Err(io::ErrorKind::WouldBlock.into()),
            }
        }

        fn peek(&mut self, buf: &mut [u8], _wait: Wait) -> io::Result<usize> {
            let mut script = self.0.lock();
            match script.inbound.front() {
                Some(Some(data)) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                Some(None) => {
                    script.inbound.pop_front();
                    Err(io::ErrorKind::WouldBlock.into())
                }
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    #[derive(Debug, Clone, Default)]
    pub(crate) struct ScriptedConnector(pub Arc<Mutex<Script>>);

    impl Connector for ScriptedConnector {
        type Link = ScriptedLink;

        fn open(&mut self, _host: &str, _port: u16, _mode: LinkMode) -> Result<ScriptedLink> {
            self.0.lock().opens += 1;
            Ok(ScriptedLink(Arc::clone(&self.0)))
        }
    }

    pub(crate) fn record(ping: i32) -> Vec<u8> {
        UpdateRecord {
            ping_number: ping,
            ..UpdateRecord::default()
        }
        .to_bytes()
        .to_vec()
    }

    fn client(script: &ScriptedConnector) -> UpdateClient<ScriptedConnector> {
        let config = ClientConfig::default().with_ack_retries(ACK_RETRIES, Duration::from_millis(1));
        UpdateClient::with_connector(config, script.clone())
    }

    fn push(script: &ScriptedConnector, items: impl IntoIterator<Item = Option<Vec<u8>>>) {
        script.0.lock().inbound.extend(items);
    }

    #[test]
    fn test_connect_ack() {
        let script = ScriptedConnector::default();
        push(&script, [Some(b"ACK\0".to_vec())]);

        let mut client = client(&script);
        client.connect("localhost", 8000).unwrap();

        assert!(client.is_connected());
        assert_eq!(script.0.lock().sent, vec![b"CON\0".to_vec()]);
        assert!(script.0.lock().inbound.is_empty());
    }

    #[test]
    fn test_connect_nak_counts_as_reply() {
        let script = ScriptedConnector::default();
        push(&script, [Some(b"NAK\0".to_vec())]);

        let mut client = client(&script);
        assert!(client.connect("localhost", 8000).is_ok());
    }

    #[test]
    fn test_update_interleaved_with_ack() {
        let script = ScriptedConnector::default();
        push(&script, [Some(record(7)), Some(b"ACK\0".to_vec())]);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut client = client(&script);
        client.set_callback(Some(Arc::new(move |_: &UpdateRecord| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        client.connect("localhost", 8000).unwrap();

        // the update was consumed through the listen path without the callback
        assert_eq!(client.update().ping_number, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(script.0.lock().inbound.is_empty());
    }

    #[test]
    fn test_updates_during_hbeat_are_kept() {
        let script = ScriptedConnector::default();
        push(&script, [Some(b"ACK\0".to_vec())]);
        let mut client = client(&script);
        client.connect("localhost", 8000).unwrap();
        assert!(client.take_absorbed().is_empty());

        push(&script, [Some(record(41)), Some(record(42)), Some(b"ACK\0".to_vec())]);
        assert_eq!(client.hbeat().unwrap(), Reply::Ack);

        let pings: Vec<i32> = client.take_absorbed().iter().map(|r| r.ping_number).collect();
        assert_eq!(pings, vec![41, 42]);
        assert!(client.take_absorbed().is_empty());

        // a new request starts from an empty buffer
        push(&script, [Some(record(43)), Some(b"ACK\0".to_vec())]);
        client.reset_trn().unwrap();
        push(&script, [Some(b"ACK\0".to_vec())]);
        client.hbeat().unwrap();
        assert!(client.take_absorbed().is_empty());
        assert_eq!(client.update().ping_number, 43);
    }

    #[test]
    fn test_lossy_ack_uses_full_budget() {
        let script = ScriptedConnector::default();
        push(&script, (1..ACK_RETRIES).map(|_| None));
        push(&script, [Some(b"ACK\0".to_vec())]);

        let mut client = client(&script);
        assert!(client.connect("localhost", 8000).is_ok());
    }

    #[test]
    fn test_all_acks_dropped() {
        let script = ScriptedConnector::default();
        push(&script, (0..ACK_RETRIES).map(|_| None));
        push(&script, [Some(b"ACK\0".to_vec())]);

        let mut client = client(&script);
        let result = client.connect("localhost", 8000);

        assert!(matches!(
            result,
            Err(TransportError::AckTimeout { retries: ACK_RETRIES })
        ));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_stray_datagram_discarded() {
        let script = ScriptedConnector::default();
        push(&script, [Some(b"junk".to_vec()), Some(b"ACK\0".to_vec())]);

        let mut client = client(&script);
        assert_eq!(client.reset_trn().unwrap_err().to_string(), "not connected");
        client.connect("localhost", 8000).unwrap();
    }

    #[test]
    fn test_listen_invokes_callback() {
        let script = ScriptedConnector::default();
        push(&script, [Some(b"ACK\0".to_vec()), Some(record(3)), Some(record(4))]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut client = client(&script);
        client.set_callback(Some(Arc::new(move |rec: &UpdateRecord| {
            sink.lock().push(rec.ping_number);
        })));
        client.connect("localhost", 8000).unwrap();

        assert_eq!(client.listen(true).unwrap().ping_number, 3);
        assert_eq!(client.listen(false).unwrap().ping_number, 4);
        assert_eq!(*seen.lock(), vec![3]);
        assert!(client.listen(true).unwrap_err().is_no_data());
    }

    #[test]
    fn test_listen_rejects_wrong_size() {
        let script = ScriptedConnector::default();
        let mut oversized = record(5);
        oversized.push(0);
        push(
            &script,
            [Some(b"ACK\0".to_vec()), Some(oversized), Some(record(5)[..100].to_vec())],
        );

        let mut client = client(&script);
        client.connect("localhost", 8000).unwrap();

        assert!(matches!(
            client.listen(false),
            Err(TransportError::UnexpectedSize { got: 397, .. })
        ));
        assert!(matches!(
            client.listen(false),
            Err(TransportError::UnexpectedSize { got: 100, .. })
        ));
        assert_eq!(client.update().ping_number, 0);
    }

    #[test]
    fn test_disconnect_sends_dis() {
        let script = ScriptedConnector::default();
        push(&script, [Some(b"ACK\0".to_vec())]);

        let mut client = client(&script);
        client.connect("localhost", 8000).unwrap();
        client.disconnect().unwrap();

        assert!(!client.is_connected());
        assert_eq!(script.0.lock().sent.last().unwrap(), b"DIS\0");
        assert!(matches!(
            client.disconnect(),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_reconnect_replaces_link() {
        let script = ScriptedConnector::default();
        push(&script, [Some(b"ACK\0".to_vec()), Some(b"ACK\0".to_vec())]);

        let mut client = client(&script);
        client.connect("localhost", 8000).unwrap();
        client.connect("localhost", 8000).unwrap();
        assert_eq!(script.0.lock().opens, 2);
    }

    #[test]
    fn test_hbeat_due() {
        let script = ScriptedConnector::default();
        push(&script, [Some(b"ACK\0".to_vec()), Some(b"ACK\0".to_vec())]);

        let config = ClientConfig::default()
            .with_ack_retries(3, Duration::from_millis(1))
            .with_hbeat_timeout(Duration::from_millis(20));
        let mut client = UpdateClient::with_connector(config, script.clone());
        assert!(client.hbeat_due());

        client.connect("localhost", 8000).unwrap();
        assert!(!client.hbeat_due());
        thread::sleep(Duration::from_millis(30));
        assert!(client.hbeat_due());

        assert_eq!(client.hbeat().unwrap(), Reply::Ack);
        assert!(!client.hbeat_due());
        assert_eq!(script.0.lock().sent.last().unwrap(), b"HBT\0");
    }

    #[test]
    fn test_multicast_control_unsupported() {
        let script = ScriptedConnector::default();
        let config = ClientConfig::default().with_multicast(true);
        let mut client = UpdateClient::with_connector(config, script.clone());

        client.connect("239.255.0.16", 8000).unwrap();
        assert!(script.0.lock().sent.is_empty());
        assert!(matches!(
            client.reset_trn(),
            Err(TransportError::Unsupported(_))
        ));
        assert!(matches!(client.hbeat(), Err(TransportError::Unsupported(_))));
    }
}
