// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection lifecycle and the per-tick pump.
//!
//! # State Machine
//!
//! ```text
//!      +--------------+
//!      | Disconnected |<-----------------------------+
//!      +------+-------+                              |
//!             | connect()                            |
//!             v                                      |
//!      +--------------+  open failed / timeout /     |
//!      |  Connecting  |--disconnect()--------------->+
//!      +------+-------+                              |
//!             | transport opened                     |
//!             | (setup frames replayed)              |
//!             v                                      |
//!      +--------------+                              |
//!      |  Connected   |                              |
//!      +------+-------+                              |
//!             | disconnect() / remote drop           |
//!             v                                      |
//!      +--------------+                              |
//!      | Disconnecting|--transport released--------->+
//!      +--------------+
//! ```
//!
//! A [`Connection`] never blocks and never spawns work of its own. The host
//! calls [`Connection::update`] once per tick; every callback (readers,
//! service handlers, completions, listeners) runs inside that call.

use crossbeam::channel::{self, Receiver};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::config::ConnectionConfig;
use crate::dispatcher::{Dispatch, Dispatcher};
use crate::error::{BridgeResult, TransportError};
use crate::message::{RawMessage, TypeNames};
use crate::publisher::{Completion, Link, Outgoing, Publisher};
use crate::serializer::{Serializer, SetupFrame};
use crate::topic::{Direction, Topic, TopicInfo, TypeKey};
use crate::transport::{Endpoint, NetworkTransport, Transport, TransportEvent};
use crate::wire::ProtocolVersion;

/// Upper bound on transport events handled by one `update()`.
const MAX_EVENTS_PER_UPDATE: usize = 4096;

/// Connection state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

impl Status {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disconnecting,
            _ => Self::Disconnected,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

type ConnectedListener = Box<dyn FnOnce() + Send>;
type StatusListener = Box<dyn FnMut(Status, Status) + Send>;

/// One duplex link to a remote bridge.
pub struct Connection {
    transport: Box<dyn Transport>,
    config: ConnectionConfig,
    endpoint: Option<Endpoint>,
    link: Arc<Link>,
    outbox: Receiver<Outgoing>,
    dispatcher: Dispatcher,
    /// Wire registrations, replayed on every successful open.
    setup: Vec<SetupFrame>,
    /// Completions waiting for their `Sent` event.
    pending_sends: HashMap<u64, Completion>,
    next_send_id: u64,
    connected_listeners: Vec<ConnectedListener>,
    status_listeners: Vec<StatusListener>,
    connecting_since: Option<Instant>,
    last_error: Option<TransportError>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("status", &self.status())
            .field("endpoint", &self.endpoint)
            .field("setup", &self.setup.len())
            .field("pending_sends", &self.pending_sends.len())
            .finish()
    }
}

impl Connection {
    pub fn new<T>(transport: T, serializer: Serializer, config: ConnectionConfig) -> Self
    where
        T: Transport + 'static,
    {
        let (tx, rx) = channel::unbounded();
        Self {
            transport: Box::new(transport),
            config,
            endpoint: None,
            link: Arc::new(Link::new(serializer, tx)),
            outbox: rx,
            dispatcher: Dispatcher::new(),
            setup: Vec::new(),
            pending_sends: HashMap::new(),
            next_send_id: 1,
            connected_listeners: Vec::new(),
            status_listeners: Vec::new(),
            connecting_since: None,
            last_error: None,
        }
    }

    /// Connection over WebSocket (ROS1/ROS2) or TCP (Cyber).
    pub fn network(serializer: Serializer, config: ConnectionConfig) -> Self {
        let transport = NetworkTransport::new(config.clone());
        Self::new(transport, serializer, config)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn status(&self) -> Status {
        self.link.status()
    }

    /// Protocol version of the current (or last) connection attempt.
    pub fn version(&self) -> ProtocolVersion {
        self.link.version()
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn address(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|e| e.address.as_str())
    }

    pub fn port(&self) -> Option<u16> {
        self.endpoint.as_ref().map(|e| e.port)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn serializer(&self) -> &Serializer {
        &self.link.serializer
    }

    /// Why the last attempt or session ended, if it ended badly.
    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    pub fn subscriptions(&self) -> Vec<TopicInfo> {
        self.link
            .topics
            .lock()
            .list(Direction::Subscribe, self.version())
    }

    pub fn publishers(&self) -> Vec<TopicInfo> {
        self.link.topics.lock().list(Direction::Publish, self.version())
    }

    pub fn services(&self) -> Vec<TopicInfo> {
        self.link.topics.lock().list(Direction::Service, self.version())
    }

    pub fn reader_count(&self, topic: &str) -> usize {
        self.dispatcher.reader_count(topic)
    }

    pub fn pending_sends(&self) -> usize {
        self.pending_sends.len()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start connecting. No-op unless `Disconnected`.
    pub fn connect(&mut self, address: &str, port: u16, version: ProtocolVersion) {
        let status = self.status();
        if status != Status::Disconnected {
            tracing::debug!("connect ignored while {}", status);
            return;
        }

        let endpoint = Endpoint::new(address, port, version);
        tracing::info!("connecting to {}", endpoint);
        self.link.set_version(version);
        let session = self.link.begin_session();
        tracing::trace!("session {}", session);
        self.last_error = None;
        self.transition(Status::Connecting);
        self.connecting_since = Some(Instant::now());

        if let Err(e) = self.transport.open(&endpoint) {
            tracing::warn!("cannot open transport to {}: {}", endpoint, e);
            self.last_error = Some(e);
            self.release(false);
        }
        self.endpoint = Some(endpoint);
    }

    /// Close the connection. Idempotent; always ends `Disconnected`.
    pub fn disconnect(&mut self) {
        match self.status() {
            Status::Disconnected => {}
            Status::Connecting => {
                tracing::info!("connect aborted");
                self.release(false);
            }
            Status::Connected | Status::Disconnecting => {
                tracing::info!("disconnecting");
                self.release(true);
            }
        }
    }

    /// Release the transport and settle in `Disconnected`, failing every
    /// outstanding send.
    fn release(&mut self, via_disconnecting: bool) {
        if via_disconnecting {
            self.transition(Status::Disconnecting);
        }
        self.transport.close();
        self.connecting_since = None;
        self.transition(Status::Disconnected);
        self.abandon_sends();
    }

    fn abandon_sends(&mut self) {
        let pending: Vec<Completion> = self.pending_sends.drain().map(|(_, c)| c).collect();
        for completed in pending {
            guarded("send completion", completed);
        }
        while let Ok(entry) = self.outbox.try_recv() {
            match entry {
                Outgoing::Frame { completed, .. } => {
                    if let Some(completed) = completed {
                        guarded("send completion", completed);
                    }
                }
                Outgoing::Dropped { completed } => guarded("send completion", completed),
            }
        }
    }

    fn transition(&mut self, to: Status) {
        let from = self.status();
        if from == to {
            return;
        }
        self.link.set_status(to);
        tracing::debug!("status {} -> {}", from, to);
        for listener in &mut self.status_listeners {
            guarded("status listener", || listener(from, to));
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    /// [`update`](Self::update) with an explicit clock, for connect-timeout
    /// and statistics windows.
    pub fn update_at(&mut self, now: Instant) {
        self.flush_outbox();
        self.drain_events();
        self.check_connect_timeout(now);
        self.link.topics.lock().refresh(now);
    }

    fn flush_outbox(&mut self) {
        while let Ok(entry) = self.outbox.try_recv() {
            match entry {
                Outgoing::Dropped { completed } => guarded("send completion", completed),
                Outgoing::Frame {
                    frame,
                    topic,
                    session,
                    completed,
                } => {
                    let current = session == self.link.session();
                    if !current {
                        tracing::trace!("discarding frame of stale session {}", session);
                    }
                    if !current || self.status() != Status::Connected {
                        if let Some(completed) = completed {
                            guarded("send completion", completed);
                        }
                        continue;
                    }
                    if self.write(frame, completed) {
                        if let Some(topic) = topic {
                            self.link.topics.lock().record(&topic, Direction::Publish);
                        }
                    }
                }
            }
        }
    }

    /// Hand one frame to the transport. Returns `false` (and runs the
    /// completion) if the transport refused it.
    fn write(&mut self, frame: Vec<u8>, completed: Option<Completion>) -> bool {
        let id = self.next_send_id;
        self.next_send_id += 1;
        match self.transport.send(id, frame) {
            Ok(()) => {
                if let Some(completed) = completed {
                    self.pending_sends.insert(id, completed);
                }
                true
            }
            Err(e) => {
                tracing::warn!("send failed: {}", e);
                if let Some(completed) = completed {
                    guarded("send completion", completed);
                }
                false
            }
        }
    }

    fn drain_events(&mut self) {
        for _ in 0..MAX_EVENTS_PER_UPDATE {
            let Some(event) = self.transport.poll_event() else {
                break;
            };
            match event {
                TransportEvent::Opened => self.on_opened(),
                TransportEvent::Received(frame) => self.on_received(&frame),
                TransportEvent::Sent { id, ok } => {
                    if !ok {
                        tracing::debug!("send {} failed in transport", id);
                    }
                    if let Some(completed) = self.pending_sends.remove(&id) {
                        guarded("send completion", completed);
                    }
                }
                TransportEvent::Closed { reason } => self.on_closed(reason),
            }
        }
    }

    fn on_opened(&mut self) {
        if self.status() != Status::Connecting {
            return;
        }
        // Nothing of this session can be queued before it is Connected, so
        // the replay goes straight to the transport ahead of any publish.
        let version = self.version();
        let setup = std::mem::take(&mut self.setup);
        for entry in &setup {
            if let Some(frame) = self.encode_setup(version, entry) {
                self.write(frame, None);
            }
        }
        self.setup = setup;

        self.connecting_since = None;
        if let Some(endpoint) = &self.endpoint {
            tracing::info!("connected to {}", endpoint);
        }
        self.transition(Status::Connected);

        for listener in std::mem::take(&mut self.connected_listeners) {
            guarded("connected listener", listener);
        }
    }

    fn on_received(&mut self, frame: &[u8]) {
        if self.status() != Status::Connected {
            return;
        }
        let version = self.version();
        match self.dispatcher.dispatch(&self.link.serializer, version, frame) {
            Dispatch::Delivered { topic, .. } => {
                self.link.topics.lock().record(&topic, Direction::Subscribe);
            }
            Dispatch::Replied { service, frame } => {
                self.link.topics.lock().record(&service, Direction::Service);
                self.queue_control(frame);
            }
            Dispatch::Dropped { .. } | Dispatch::Ignored { .. } => {}
        }
    }

    fn on_closed(&mut self, reason: Option<TransportError>) {
        match self.status() {
            Status::Connecting => {
                match &reason {
                    Some(e) => tracing::warn!("connect failed: {}", e),
                    None => tracing::warn!("connect failed"),
                }
                self.last_error = reason;
                self.release(false);
            }
            Status::Connected => {
                match &reason {
                    Some(e) => tracing::warn!("connection lost: {}", e),
                    None => tracing::info!("connection closed by remote"),
                }
                self.last_error = reason;
                self.release(true);
            }
            Status::Disconnected | Status::Disconnecting => {}
        }
    }

    fn check_connect_timeout(&mut self, now: Instant) {
        let Some(since) = self.connecting_since else {
            return;
        };
        if self.status() != Status::Connecting {
            return;
        }
        if now.saturating_duration_since(since) >= self.config.connect_timeout() {
            let endpoint = self
                .endpoint
                .as_ref()
                .map(Endpoint::authority)
                .unwrap_or_default();
            tracing::warn!("connect to {} timed out", endpoint);
            self.last_error = Some(TransportError::ConnectTimeout { endpoint });
            self.release(false);
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    fn add_setup(&mut self, entry: SetupFrame) {
        self.announce(&entry);
        self.setup.push(entry);
    }

    /// Swap the stored registration of the same kind and name for `entry`,
    /// announcing it again if it changed.
    fn replace_setup(&mut self, entry: SetupFrame) {
        let slot = self.setup.iter().position(|e| {
            std::mem::discriminant(e) == std::mem::discriminant(&entry) && e.name() == entry.name()
        });
        match slot {
            Some(i) if self.setup[i] == entry => {}
            Some(i) => {
                self.announce(&entry);
                self.setup[i] = entry;
            }
            None => self.add_setup(entry),
        }
    }

    /// Queue `entry` for the wire if connected.
    fn announce(&mut self, entry: &SetupFrame) {
        if self.status() != Status::Connected {
            return;
        }
        let version = self.version();
        if let Some(frame) = self.encode_setup(version, entry) {
            self.queue_control(frame);
        }
    }

    fn encode_setup(&self, version: ProtocolVersion, entry: &SetupFrame) -> Option<Vec<u8>> {
        match self.link.serializer.setup_frame(version, entry) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("cannot encode setup for {}: {}", entry.name(), e);
                None
            }
        }
    }

    /// Subscribe to `topic`. All readers of a topic share one wire-level
    /// subscription and must use the same message type.
    pub fn add_reader<T, F>(&mut self, topic: &str, callback: F) -> BridgeResult<()>
    where
        T: 'static,
        F: FnMut(&T) + Send + 'static,
    {
        let types = self.link.serializer.types().names::<T>()?.clone();
        let first = self.link.topics.lock().register(
            Direction::Subscribe,
            Topic {
                name: topic.to_string(),
                types: types.clone(),
            },
            TypeKey::of::<T>(),
        )?;
        self.dispatcher.add_reader::<T, F>(topic, callback)?;
        if first {
            self.add_setup(SetupFrame::Subscribe {
                topic: topic.to_string(),
                types,
            });
        }
        Ok(())
    }

    /// Subscribe to `topic` without decoding; `type_name` is sent as is.
    pub fn add_raw_reader<F>(&mut self, topic: &str, type_name: &str, callback: F) -> BridgeResult<()>
    where
        F: FnMut(&RawMessage) + Send + 'static,
    {
        let types = TypeNames::exact(type_name);
        let first = self.link.topics.lock().register(
            Direction::Subscribe,
            Topic {
                name: topic.to_string(),
                types: types.clone(),
            },
            TypeKey::raw(),
        )?;
        self.dispatcher.add_raw_reader(topic, callback)?;
        if first {
            self.add_setup(SetupFrame::Subscribe {
                topic: topic.to_string(),
                types,
            });
        }
        Ok(())
    }

    /// Advertise `topic` and return a publish handle for it. Handles for the
    /// same topic share one advertisement.
    pub fn add_writer<T: 'static>(&mut self, topic: &str) -> BridgeResult<Publisher<T>> {
        let types = self.link.serializer.types().names::<T>()?.clone();
        let first = self.link.topics.lock().register(
            Direction::Publish,
            Topic {
                name: topic.to_string(),
                types: types.clone(),
            },
            TypeKey::of::<T>(),
        )?;
        if first {
            self.add_setup(SetupFrame::Advertise {
                topic: topic.to_string(),
                types: types.clone(),
            });
        }
        Ok(Publisher::new(Arc::clone(&self.link), topic, types))
    }

    /// Serve `service`. Registering the same name again replaces the
    /// handler, and re-advertises the service if its type changed.
    pub fn add_service<A, R, E, F>(&mut self, service: &str, handler: F) -> BridgeResult<()>
    where
        A: 'static,
        R: 'static,
        E: fmt::Display + 'static,
        F: FnMut(A) -> Result<R, E> + Send + 'static,
    {
        let types = self.link.serializer.types().names::<A>()?.clone();
        self.link.serializer.types().names::<R>()?;
        let first = self.link.topics.lock().replace(
            Direction::Service,
            Topic {
                name: service.to_string(),
                types: types.clone(),
            },
            TypeKey::of::<A>(),
        );
        if self.dispatcher.add_service(service, handler) {
            tracing::debug!("handler for {} replaced", service);
        }
        let entry = SetupFrame::AdvertiseService {
            service: service.to_string(),
            types,
        };
        if first {
            self.add_setup(entry);
        } else {
            self.replace_setup(entry);
        }
        Ok(())
    }

    /// Queue a pre-encoded frame. Dropped (with its completion still run
    /// on the next update) unless connected.
    pub fn send_async<F>(&mut self, frame: Vec<u8>, completed: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue_frame(frame, Some(Box::new(completed)));
    }

    pub fn send(&mut self, frame: Vec<u8>) {
        self.queue_frame(frame, None);
    }

    fn queue_frame(&mut self, frame: Vec<u8>, completed: Option<Completion>) {
        if self.status() == Status::Connected {
            self.link.enqueue(Outgoing::Frame {
                frame,
                topic: None,
                session: self.link.session(),
                completed,
            });
        } else {
            self.link.enqueue_dropped(completed);
        }
    }

    /// Send a frame of our own behind everything already queued.
    fn queue_control(&mut self, frame: Vec<u8>) {
        self.queue_frame(frame, None);
        self.flush_outbox();
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Run `listener` once the connection is established. If it already
    /// is, `listener` runs now, exactly once.
    pub fn on_connected<F>(&mut self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.status() == Status::Connected {
            guarded("connected listener", listener);
        } else {
            self.connected_listeners.push(Box::new(listener));
        }
    }

    /// Observe every status transition as `(from, to)`.
    pub fn on_status_change<F>(&mut self, listener: F)
    where
        F: FnMut(Status, Status) + Send + 'static,
    {
        self.status_listeners.push(Box::new(listener));
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.status() != Status::Disconnected {
            self.transport.close();
            self.link.set_status(Status::Disconnected);
        }
    }
}

fn guarded(what: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!("{} panicked", what);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::std_msgs::Int32;
    use crate::transport::{MemoryRemote, MemoryTransport, OpenMode};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    fn connection(mode: OpenMode) -> (Connection, MemoryRemote) {
        let (transport, remote) = MemoryTransport::pair(mode);
        let conn = Connection::new(transport, Serializer::default(), ConnectionConfig::default());
        (conn, remote)
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(Status::Disconnected.to_string(), "Disconnected");
        assert_eq!(Status::Connecting.to_string(), "Connecting");
        assert_eq!(Status::Connected.to_string(), "Connected");
        assert_eq!(Status::Disconnecting.to_string(), "Disconnecting");
        assert_eq!(Status::from_u8(Status::Connected as u8), Status::Connected);
    }

    #[test]
    fn test_connect_is_noop_while_connecting() {
        let (mut conn, remote) = connection(OpenMode::Manual);
        conn.connect("localhost", 9090, ProtocolVersion::Ros1);
        conn.connect("localhost", 9091, ProtocolVersion::Ros2);
        assert_eq!(remote.open_count(), 1);
        assert_eq!(conn.port(), Some(9090));
        assert_eq!(conn.status(), Status::Connecting);
    }

    #[test]
    fn test_connect_timeout() {
        let (mut conn, remote) = connection(OpenMode::Manual);
        conn.connect("localhost", 9090, ProtocolVersion::Ros1);
        let start = Instant::now();
        conn.update_at(start + Duration::from_secs(1));
        assert_eq!(conn.status(), Status::Connecting);

        conn.update_at(start + Duration::from_secs(6));
        assert_eq!(conn.status(), Status::Disconnected);
        assert!(matches!(
            conn.last_error(),
            Some(TransportError::ConnectTimeout { .. })
        ));
        assert_eq!(remote.close_count(), 1);
        // A late accept has nothing to complete.
        assert!(!remote.accept());
    }

    #[test]
    fn test_refused_open() {
        let (mut conn, _remote) = connection(OpenMode::Refuse);
        conn.connect("localhost", 9090, ProtocolVersion::Ros1);
        conn.update();
        assert_eq!(conn.status(), Status::Disconnected);
        assert!(matches!(
            conn.last_error(),
            Some(TransportError::ConnectFailed { .. })
        ));
    }

    #[test]
    fn test_setup_replayed_on_every_connect() {
        let (mut conn, remote) = connection(OpenMode::AutoAccept);
        conn.add_reader::<Int32, _>("/n", |_| {}).unwrap();
        let _w = conn.add_writer::<Int32>("/out").unwrap();

        conn.connect("localhost", 9090, ProtocolVersion::Ros1);
        conn.update();
        assert_eq!(remote.take_sent().len(), 2);

        conn.disconnect();
        conn.connect("localhost", 9090, ProtocolVersion::Cyber);
        conn.update();
        let sent = remote.take_sent();
        assert_eq!(sent.len(), 2);
        // Binary AddReader / AddWriter frames this time.
        assert_eq!(sent[0][4], 2);
        assert_eq!(sent[1][4], 3);
    }

    #[test]
    fn test_registration_while_connected_sends_now() {
        let (mut conn, remote) = connection(OpenMode::AutoAccept);
        conn.connect("localhost", 9090, ProtocolVersion::Ros2);
        conn.update();
        conn.add_reader::<Int32, _>("/n", |_| {}).unwrap();
        conn.add_reader::<Int32, _>("/n", |_| {}).unwrap();
        assert_eq!(
            remote.sent_json(),
            vec![json!({"op": "subscribe", "topic": "/n", "type": "std_msgs/msg/Int32"})]
        );
        assert_eq!(conn.reader_count("/n"), 2);
    }

    #[test]
    fn test_unregistered_type_fails_the_call() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Unknown {}

        let (mut conn, _remote) = connection(OpenMode::AutoAccept);
        assert!(conn.add_writer::<Unknown>("/u").is_err());
        assert!(conn.add_reader::<Unknown, _>("/u", |_| {}).is_err());
        assert!(conn.publishers().is_empty());
    }

    #[test]
    fn test_remote_drop_fails_pending_sends() {
        let (mut conn, remote) = connection(OpenMode::AutoAccept);
        let states = Arc::new(Mutex::new(Vec::new()));
        {
            let states = Arc::clone(&states);
            conn.on_status_change(move |_, to| states.lock().push(to));
        }
        conn.connect("localhost", 9090, ProtocolVersion::Ros1);
        conn.update();

        let done = Arc::new(Mutex::new(0));
        {
            let done = Arc::clone(&done);
            conn.send_async(b"{}".to_vec(), move || *done.lock() += 1);
        }
        remote.drop_connection();
        conn.update();

        assert_eq!(*done.lock(), 1);
        assert_eq!(conn.pending_sends(), 0);
        assert_eq!(
            *states.lock(),
            vec![
                Status::Connecting,
                Status::Connected,
                Status::Disconnecting,
                Status::Disconnected
            ]
        );
    }

    #[test]
    fn test_send_async_while_disconnected() {
        let (mut conn, remote) = connection(OpenMode::AutoAccept);
        let done = Arc::new(Mutex::new(0));
        {
            let done = Arc::clone(&done);
            conn.send_async(b"{}".to_vec(), move || *done.lock() += 1);
        }
        assert_eq!(*done.lock(), 0);
        conn.update();
        assert_eq!(*done.lock(), 1);
        assert_eq!(remote.sent_count(), 0);
    }

    #[test]
    fn test_service_reregistered_with_other_type() {
        use crate::message::std_srvs::{SetBool, SetBoolResponse, Trigger, TriggerResponse};

        let (mut conn, remote) = connection(OpenMode::AutoAccept);
        conn.add_service("/svc", |_: Trigger| {
            Ok::<_, String>(TriggerResponse {
                success: true,
                message: "trigger".into(),
            })
        })
        .unwrap();
        conn.connect("localhost", 9090, ProtocolVersion::Ros1);
        conn.update();
        remote.take_sent();

        conn.add_service("/svc", |req: SetBool| {
            Ok::<_, String>(SetBoolResponse {
                success: req.data,
                message: "set".into(),
            })
        })
        .unwrap();
        assert_eq!(
            remote.sent_json(),
            vec![json!({"op": "advertise_service", "service": "/svc", "type": "std_srvs/SetBool"})]
        );
        assert_eq!(conn.services()[0].type_name, "std_srvs/SetBool");
        remote.take_sent();

        remote.deliver_json(&json!({"op": "call_service", "service": "/svc", "id": "c1", "args": {"data": true}}));
        conn.update();
        assert_eq!(
            remote.sent_json(),
            vec![json!({
                "op": "service_response",
                "service": "/svc",
                "id": "c1",
                "values": {"success": true, "message": "set"},
                "result": true
            })]
        );
        remote.take_sent();

        // Only the latest advertisement is replayed.
        conn.disconnect();
        conn.connect("localhost", 9090, ProtocolVersion::Ros2);
        conn.update();
        assert_eq!(
            remote.sent_json(),
            vec![json!({"op": "advertise_service", "service": "/svc", "type": "std_srvs/srv/SetBool"})]
        );
    }

    #[test]
    fn test_own_frames_keep_queue_order() {
        use crate::message::std_srvs::Empty;

        let (mut conn, remote) = connection(OpenMode::AutoAccept);
        let pulse = conn.add_writer::<Int32>("/pulse").unwrap();
        {
            let pulse = pulse.clone();
            conn.add_service("/kick", move |_: Empty| {
                pulse.publish(&Int32 { data: 2 }).map_err(|e| e.to_string())?;
                Ok::<_, String>(Empty {})
            })
            .unwrap();
        }
        conn.connect("localhost", 9090, ProtocolVersion::Ros1);
        conn.update();
        remote.take_sent();

        // Queued publish goes out before a registration made after it.
        pulse.publish(&Int32 { data: 1 }).unwrap();
        conn.add_writer::<Int32>("/late").unwrap();
        // A publish from inside a handler precedes the handler's reply.
        remote.deliver_json(&json!({"op": "call_service", "service": "/kick", "id": 1, "args": {}}));
        conn.update();

        let ops: Vec<(String, String)> = remote
            .sent_json()
            .iter()
            .map(|v| {
                let name = v.get("topic").or_else(|| v.get("service")).cloned();
                (
                    v["op"].as_str().unwrap_or_default().to_string(),
                    name.and_then(|n| n.as_str().map(str::to_string)).unwrap_or_default(),
                )
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                ("publish".to_string(), "/pulse".to_string()),
                ("advertise".to_string(), "/late".to_string()),
                ("publish".to_string(), "/pulse".to_string()),
                ("service_response".to_string(), "/kick".to_string()),
            ]
        );
    }

    #[test]
    fn test_stale_session_frames_are_discarded() {
        let (mut conn, remote) = connection(OpenMode::AutoAccept);
        let writer = conn.add_writer::<Int32>("/n").unwrap();
        conn.connect("localhost", 9090, ProtocolVersion::Ros1);
        conn.update();
        remote.take_sent();

        let done = Arc::new(Mutex::new(0));
        {
            let done = Arc::clone(&done);
            writer
                .publish_with(&Int32 { data: 1 }, move || *done.lock() += 1)
                .unwrap();
        }
        // A publish encoded for one session, flushed after another began.
        conn.link.begin_session();
        conn.update();

        assert_eq!(remote.sent_count(), 0);
        assert_eq!(*done.lock(), 1);
        assert_eq!(writer.sent_count(), 0);
    }

    #[test]
    fn test_panicking_listener_is_contained() {
        let (mut conn, _remote) = connection(OpenMode::AutoAccept);
        conn.on_connected(|| panic!("listener bug"));
        conn.connect("localhost", 9090, ProtocolVersion::Ros1);
        conn.update();
        assert_eq!(conn.status(), Status::Connected);
    }
}
