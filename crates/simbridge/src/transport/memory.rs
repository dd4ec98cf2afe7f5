// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport.
//!
//! [`MemoryTransport::pair`] returns the transport half, handed to a
//! `Connection`, and a [`MemoryRemote`] that plays the bridge: it accepts
//! or refuses opens, delivers inbound frames, drops the connection and
//! inspects what was sent. Everything is synchronous and deterministic.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

use super::{Endpoint, Transport, TransportEvent};
use crate::error::TransportError;

/// How the simulated remote answers an open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenMode {
    /// Opens complete on the next poll.
    #[default]
    AutoAccept,
    /// Opens stay pending until [`MemoryRemote::accept`] or
    /// [`MemoryRemote::refuse`].
    Manual,
    /// Opens fail on the next poll.
    Refuse,
}

#[derive(Debug, Default)]
struct MemoryState {
    mode: OpenMode,
    open: bool,
    pending_open: bool,
    events: VecDeque<TransportEvent>,
    sent: Vec<Vec<u8>>,
    open_count: usize,
    close_count: usize,
    last_endpoint: Option<Endpoint>,
}

impl MemoryState {
    fn refused(&self) -> TransportEvent {
        let endpoint = self
            .last_endpoint
            .as_ref()
            .map(Endpoint::authority)
            .unwrap_or_default();
        TransportEvent::Closed {
            reason: Some(TransportError::ConnectFailed {
                endpoint,
                reason: "connection refused".into(),
            }),
        }
    }
}

/// Transport half of an in-memory pair.
#[derive(Debug)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

/// Remote half of an in-memory pair.
#[derive(Clone, Debug)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn pair(mode: OpenMode) -> (MemoryTransport, MemoryRemote) {
        let state = Arc::new(Mutex::new(MemoryState {
            mode,
            ..MemoryState::default()
        }));
        (
            MemoryTransport {
                state: Arc::clone(&state),
            },
            MemoryRemote { state },
        )
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.open_count += 1;
        state.last_endpoint = Some(endpoint.clone());
        state.events.clear();
        state.open = false;
        state.pending_open = false;
        match state.mode {
            OpenMode::AutoAccept => {
                state.open = true;
                state.events.push_back(TransportEvent::Opened);
            }
            OpenMode::Manual => state.pending_open = true,
            OpenMode::Refuse => {
                let event = state.refused();
                state.events.push_back(event);
            }
        }
        Ok(())
    }

    fn send(&mut self, id: u64, frame: Vec<u8>) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        state.sent.push(frame);
        state.events.push_back(TransportEvent::Sent { id, ok: true });
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.close_count += 1;
        state.open = false;
        state.pending_open = false;
        state.events.clear();
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.state.lock().events.pop_front()
    }
}

impl MemoryRemote {
    pub fn set_mode(&self, mode: OpenMode) {
        self.state.lock().mode = mode;
    }

    /// Complete a pending open. Returns `false` if none was pending.
    pub fn accept(&self) -> bool {
        let mut state = self.state.lock();
        if !state.pending_open {
            return false;
        }
        state.pending_open = false;
        state.open = true;
        state.events.push_back(TransportEvent::Opened);
        true
    }

    /// Fail a pending open. Returns `false` if none was pending.
    pub fn refuse(&self) -> bool {
        let mut state = self.state.lock();
        if !state.pending_open {
            return false;
        }
        state.pending_open = false;
        let event = state.refused();
        state.events.push_back(event);
        true
    }

    /// Deliver one inbound frame. Ignored unless open.
    pub fn deliver(&self, frame: impl Into<Vec<u8>>) -> bool {
        let mut state = self.state.lock();
        if !state.open {
            return false;
        }
        state.events.push_back(TransportEvent::Received(frame.into()));
        true
    }

    pub fn deliver_json(&self, value: &Value) -> bool {
        self.deliver(value.to_string().into_bytes())
    }

    /// Simulate the remote going away.
    pub fn drop_connection(&self) -> bool {
        let mut state = self.state.lock();
        if !state.open {
            return false;
        }
        state.open = false;
        state.events.push_back(TransportEvent::Closed {
            reason: Some(TransportError::ReceiveFailed(
                "connection reset by remote".into(),
            )),
        });
        true
    }

    /// Frames written so far, draining the log.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Frames written so far, parsed as JSON (non-JSON frames are skipped).
    pub fn sent_json(&self) -> Vec<Value> {
        self.state
            .lock()
            .sent
            .iter()
            .filter_map(|f| serde_json::from_slice(f).ok())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending_open
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }

    pub fn last_endpoint(&self) -> Option<Endpoint> {
        self.state.lock().last_endpoint.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ProtocolVersion;

    fn endpoint() -> Endpoint {
        Endpoint::new("localhost", 9090, ProtocolVersion::Ros1)
    }

    #[test]
    fn test_auto_accept_roundtrip() {
        let (mut t, remote) = MemoryTransport::pair(OpenMode::AutoAccept);
        t.open(&endpoint()).unwrap();
        assert_eq!(t.poll_event(), Some(TransportEvent::Opened));

        t.send(1, b"hello".to_vec()).unwrap();
        assert_eq!(t.poll_event(), Some(TransportEvent::Sent { id: 1, ok: true }));
        assert_eq!(remote.take_sent(), vec![b"hello".to_vec()]);

        assert!(remote.deliver(b"world".to_vec()));
        assert_eq!(
            t.poll_event(),
            Some(TransportEvent::Received(b"world".to_vec()))
        );
        assert_eq!(t.poll_event(), None);
    }

    #[test]
    fn test_manual_open() {
        let (mut t, remote) = MemoryTransport::pair(OpenMode::Manual);
        t.open(&endpoint()).unwrap();
        assert_eq!(t.poll_event(), None);
        assert_eq!(t.send(1, vec![]), Err(TransportError::NotOpen));
        assert!(remote.refuse());
        assert!(matches!(
            t.poll_event(),
            Some(TransportEvent::Closed { reason: Some(_) })
        ));
        assert!(!remote.accept());
    }

    #[test]
    fn test_close_discards_events() {
        let (mut t, remote) = MemoryTransport::pair(OpenMode::AutoAccept);
        t.open(&endpoint()).unwrap();
        remote.deliver(b"x".to_vec());
        t.close();
        assert_eq!(t.poll_event(), None);
        assert!(!remote.deliver(b"y".to_vec()));
        assert_eq!(remote.close_count(), 1);
        assert!(!remote.drop_connection());
    }
}
