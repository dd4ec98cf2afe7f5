// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Duplex byte channels to the remote bridge.
//!
//! # Architecture
//!
//! ```text
//!  Connection::update() (caller thread)
//!        |  send(id, frame) / close()          ^  poll_event()
//!        v                                     |
//!  +-----------------------------------------------------------+
//!  |                     NetworkTransport                      |
//!  |   IoCommand (tokio mpsc)        TransportEvent (crossbeam) |
//!  +-----------------------------------------------------------+
//!        |                                     ^
//!        v                                     |
//!  +-----------------------------------------------------------+
//!  |  I/O thread: current-thread tokio runtime, one session    |
//!  |   - WebSocket (rosbridge, ROS1/ROS2)                      |
//!  |   - TCP + length-prefix framing (Cyber bridge)            |
//!  +-----------------------------------------------------------+
//! ```
//!
//! All methods of [`Transport`] are non-blocking. Outcomes (open
//! completed, frame received, send done, connection closed) are reported
//! as [`TransportEvent`]s drained by the owner.

pub mod memory;
mod session;
mod tcp;
mod websocket;

use std::fmt;

use crate::config::ConnectionConfig;
use crate::error::TransportError;
use crate::wire::ProtocolVersion;

use session::IoSession;

pub use memory::{MemoryRemote, MemoryTransport, OpenMode};

/// Where and how to connect.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    pub version: ProtocolVersion,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16, version: ProtocolVersion) -> Self {
        Self {
            address: address.into(),
            port,
            version,
        }
    }

    /// `host:port`
    pub fn authority(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// rosbridge URL, `ws://host:port`.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.address, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.address, self.port, self.version)
    }
}

/// Outcome reported by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The open started by [`Transport::open`] completed.
    Opened,
    /// One complete inbound frame.
    Received(Vec<u8>),
    /// The local write of send `id` finished (`ok == false` if it failed).
    Sent { id: u64, ok: bool },
    /// The channel is gone: open failed, remote dropped, or I/O error.
    Closed { reason: Option<TransportError> },
}

/// A duplex, message-framed byte channel.
pub trait Transport: Send {
    /// Start opening a channel to `endpoint`. Completion is reported by
    /// an `Opened` or `Closed` event.
    fn open(&mut self, endpoint: &Endpoint) -> Result<(), TransportError>;

    /// Queue one frame for writing. Completion is reported by a `Sent`
    /// event carrying `id`.
    fn send(&mut self, id: u64, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Release the channel. No events are reported after this returns.
    fn close(&mut self);

    fn poll_event(&mut self) -> Option<TransportEvent>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        (**self).open(endpoint)
    }

    fn send(&mut self, id: u64, frame: Vec<u8>) -> Result<(), TransportError> {
        (**self).send(id, frame)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        (**self).poll_event()
    }
}

/// Socket transport: WebSocket for ROS1/ROS2, framed TCP for Cyber.
#[derive(Debug)]
pub struct NetworkTransport {
    config: ConnectionConfig,
    session: Option<IoSession>,
}

impl NetworkTransport {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }
}

impl Default for NetworkTransport {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

impl Transport for NetworkTransport {
    fn open(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        if let Some(stale) = self.session.take() {
            stale.close();
        }
        self.session = Some(IoSession::spawn(endpoint.clone(), &self.config)?);
        Ok(())
    }

    fn send(&mut self, id: u64, frame: Vec<u8>) -> Result<(), TransportError> {
        match &self.session {
            Some(session) => session.send(id, frame),
            None => Err(TransportError::NotOpen),
        }
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.session.as_mut()?.try_event()
    }
}
