// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-topic publish handles.
//!
//! A [`Publisher`] serializes on the calling thread and enqueues the frame
//! on the connection's outbound FIFO. The tick thread writes it on the next
//! `update()`. Handles stay valid across reconnects; while the connection
//! is not `Connected` publishing is a silent no-op. Every frame is stamped
//! with the session it was encoded for and never outlives it.

use crossbeam::channel::Sender;
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::connection::Status;
use crate::error::BridgeResult;
use crate::message::TypeNames;
use crate::serializer::Serializer;
use crate::topic::{Direction, TopicRegistry};
use crate::wire::ProtocolVersion;

/// Callback fired once on the tick thread when a send has been handled.
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

/// Entry of the outbound FIFO.
pub(crate) enum Outgoing {
    /// A frame to write while connected.
    Frame {
        frame: Vec<u8>,
        /// Published topic, for statistics.
        topic: Option<String>,
        /// Session the frame was encoded for.
        session: u64,
        completed: Option<Completion>,
    },
    /// A send that was skipped; only its completion remains.
    Dropped { completed: Completion },
}

impl fmt::Debug for Outgoing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame {
                frame,
                topic,
                session,
                ..
            } => f
                .debug_struct("Frame")
                .field("len", &frame.len())
                .field("topic", topic)
                .field("session", session)
                .finish(),
            Self::Dropped { .. } => f.write_str("Dropped"),
        }
    }
}

/// State shared between a connection and its publish handles.
pub(crate) struct Link {
    status: AtomicU8,
    version: AtomicU8,
    /// Bumped by every connect attempt.
    session: AtomicU64,
    outbox: Sender<Outgoing>,
    pub(crate) topics: Mutex<TopicRegistry>,
    pub(crate) serializer: Serializer,
}

impl Link {
    pub fn new(serializer: Serializer, outbox: Sender<Outgoing>) -> Self {
        Self {
            status: AtomicU8::new(Status::Disconnected as u8),
            version: AtomicU8::new(ProtocolVersion::default() as u8),
            session: AtomicU64::new(0),
            outbox,
            topics: Mutex::new(TopicRegistry::new()),
            serializer,
        }
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion::try_from(self.version.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn set_version(&self, version: ProtocolVersion) {
        self.version.store(version as u8, Ordering::Release);
    }

    pub fn session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    /// Start a new session. Must follow `set_version` so that a reader
    /// observing the new session also observes its version.
    pub fn begin_session(&self) -> u64 {
        self.session.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Enqueue an entry. The receiver lives as long as the connection, so a
    /// failed send only happens during teardown and is ignored.
    pub fn enqueue(&self, entry: Outgoing) {
        if self.outbox.send(entry).is_err() {
            tracing::trace!("outbound queue closed, entry discarded");
        }
    }

    /// Hand a completion to the tick thread without sending anything.
    pub fn enqueue_dropped(&self, completed: Option<Completion>) {
        if let Some(completed) = completed {
            self.enqueue(Outgoing::Dropped { completed });
        }
    }
}

/// Publish handle bound to one `(connection, topic, T)`.
pub struct Publisher<T> {
    link: Arc<Link>,
    topic: Arc<str>,
    types: TypeNames,
    _marker: PhantomData<fn(&T)>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
            topic: Arc::clone(&self.topic),
            types: self.types.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.topic)
            .field("type", &self.types.ros1)
            .finish()
    }
}

impl<T: 'static> Publisher<T> {
    pub(crate) fn new(link: Arc<Link>, topic: &str, types: TypeNames) -> Self {
        Self {
            link,
            topic: Arc::from(topic),
            types,
            _marker: PhantomData,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn type_names(&self) -> &TypeNames {
        &self.types
    }

    /// Number of messages written on this topic so far.
    pub fn sent_count(&self) -> u64 {
        self.link
            .topics
            .lock()
            .count(&self.topic, Direction::Publish)
            .unwrap_or(0)
    }

    pub fn publish(&self, msg: &T) -> BridgeResult<()> {
        self.send(msg, None)
    }

    /// Publish and run `completed` on the tick thread once the local write
    /// finished, or once the message was dropped because the connection was
    /// not connected.
    pub fn publish_with<F>(&self, msg: &T, completed: F) -> BridgeResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(msg, Some(Box::new(completed)))
    }

    fn send(&self, msg: &T, completed: Option<Completion>) -> BridgeResult<()> {
        // Session first: a frame stamped with a stale session is discarded
        // by the tick thread even if status and version read as current.
        let session = self.link.session();
        if self.link.status() != Status::Connected {
            tracing::trace!("not connected, dropping publish on {}", self.topic);
            self.link.enqueue_dropped(completed);
            return Ok(());
        }

        let version = self.link.version();
        let serializer = &self.link.serializer;
        let payload = serializer.encode_payload(version, msg)?;
        let frame = serializer.publish_frame(version, &self.topic, &self.types, payload)?;
        self.link.enqueue(Outgoing::Frame {
            frame,
            topic: Some(self.topic.to_string()),
            session,
            completed,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::std_msgs::Int32;
    use crossbeam::channel::{self, Receiver};

    fn link() -> (Arc<Link>, Receiver<Outgoing>) {
        let (tx, rx) = channel::unbounded();
        (Arc::new(Link::new(Serializer::default(), tx)), rx)
    }

    #[test]
    fn test_publisher_is_send_sync() {
        fn assert_send_sync<S: Send + Sync>() {}
        assert_send_sync::<Publisher<Int32>>();
    }

    #[test]
    fn test_publish_while_disconnected() {
        let (link, rx) = link();
        let publisher = Publisher::<Int32>::new(link, "/n", TypeNames::ros("std_msgs/Int32"));

        publisher.publish(&Int32 { data: 1 }).unwrap();
        assert!(rx.try_recv().is_err());

        publisher.publish_with(&Int32 { data: 2 }, || {}).unwrap();
        assert!(matches!(rx.try_recv(), Ok(Outgoing::Dropped { .. })));
    }

    #[test]
    fn test_publish_while_connected() {
        let (link, rx) = link();
        link.set_status(Status::Connected);
        link.set_version(ProtocolVersion::Cyber);
        let session = link.begin_session();
        let publisher = Publisher::<Int32>::new(link, "/n", TypeNames::ros("std_msgs/Int32"));

        publisher.clone().publish(&Int32 { data: 5 }).unwrap();
        match rx.try_recv().unwrap() {
            Outgoing::Frame {
                frame,
                topic,
                session: stamped,
                completed,
            } => {
                assert_eq!(frame[4], 4); // Publish op
                assert_eq!(topic.as_deref(), Some("/n"));
                assert_eq!(stamped, session);
                assert!(completed.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_session_advances() {
        let (link, _rx) = link();
        assert_eq!(link.session(), 0);
        assert_eq!(link.begin_session(), 1);
        assert_eq!(link.begin_session(), 2);
        assert_eq!(link.session(), 2);
    }
}
