// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound routing: publish frames to reader callbacks, service calls to
//! handlers.
//!
//! Nothing routed here can tear the connection down. Undecodable frames are
//! dropped, panicking callbacks are contained, and failing or missing
//! service handlers turn into error responses.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{BridgeError, BridgeResult};
use crate::message::RawMessage;
use crate::serializer::{Inbound, Serializer};
use crate::wire::ProtocolVersion;

/// Outcome of routing one inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Delivered to `callbacks` readers of `topic` (panicking ones included).
    Delivered { topic: String, callbacks: usize },
    /// A service was called; `frame` is the response to send back.
    Replied { service: String, frame: Vec<u8> },
    /// Frame discarded (undecodable, or nobody listening).
    Dropped { reason: String },
    /// Valid frame this client does not act on.
    Ignored { op: String },
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

trait ReaderSink: Send {
    /// `type_name` is the wire type tag carried by the frame, if any.
    fn deliver(
        &mut self,
        serializer: &Serializer,
        version: ProtocolVersion,
        topic: &str,
        type_name: Option<&str>,
        payload: RawMessage,
    ) -> Dispatch;

    fn len(&self) -> usize;

    fn type_label(&self) -> &'static str;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TypedReaders<T> {
    callbacks: Vec<Box<dyn FnMut(&T) + Send>>,
}

impl<T: 'static> ReaderSink for TypedReaders<T> {
    fn deliver(
        &mut self,
        serializer: &Serializer,
        version: ProtocolVersion,
        topic: &str,
        type_name: Option<&str>,
        payload: RawMessage,
    ) -> Dispatch {
        if let Some(found) = type_name {
            let expected = match serializer.types().wire_name::<T>(version) {
                Ok(expected) => expected,
                Err(e) => {
                    tracing::warn!("dropping message on {}: {}", topic, e);
                    return Dispatch::Dropped {
                        reason: e.to_string(),
                    };
                }
            };
            if found != expected {
                let e = BridgeError::mismatch(expected, found);
                tracing::warn!("dropping message on {}: {}", topic, e);
                return Dispatch::Dropped {
                    reason: e.to_string(),
                };
            }
        }

        let msg: T = match serializer.decode_payload(payload) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("dropping message on {}: {}", topic, e);
                return Dispatch::Dropped {
                    reason: e.to_string(),
                };
            }
        };
        for callback in &mut self.callbacks {
            invoke(topic, || callback(&msg));
        }
        Dispatch::Delivered {
            topic: topic.to_string(),
            callbacks: self.callbacks.len(),
        }
    }

    fn len(&self) -> usize {
        self.callbacks.len()
    }

    fn type_label(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct RawReaders {
    callbacks: Vec<Box<dyn FnMut(&RawMessage) + Send>>,
}

impl ReaderSink for RawReaders {
    fn deliver(
        &mut self,
        _serializer: &Serializer,
        _version: ProtocolVersion,
        topic: &str,
        _type_name: Option<&str>,
        payload: RawMessage,
    ) -> Dispatch {
        for callback in &mut self.callbacks {
            invoke(topic, || callback(&payload));
        }
        Dispatch::Delivered {
            topic: topic.to_string(),
            callbacks: self.callbacks.len(),
        }
    }

    fn len(&self) -> usize {
        self.callbacks.len()
    }

    fn type_label(&self) -> &'static str {
        "raw message"
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn invoke(topic: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!("reader callback for {} panicked", topic);
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

trait ServiceSink: Send {
    fn call(
        &mut self,
        serializer: &Serializer,
        version: ProtocolVersion,
        service: &str,
        args: RawMessage,
    ) -> BridgeResult<RawMessage>;
}

struct TypedService<A, R, E, F> {
    handler: F,
    _marker: PhantomData<fn(A) -> Result<R, E>>,
}

impl<A, R, E, F> ServiceSink for TypedService<A, R, E, F>
where
    A: 'static,
    R: 'static,
    E: fmt::Display,
    F: FnMut(A) -> Result<R, E> + Send,
{
    fn call(
        &mut self,
        serializer: &Serializer,
        version: ProtocolVersion,
        service: &str,
        args: RawMessage,
    ) -> BridgeResult<RawMessage> {
        let args: A = serializer.decode_payload(args)?;
        let handler = &mut self.handler;
        match catch_unwind(AssertUnwindSafe(|| handler(args))) {
            Ok(Ok(result)) => serializer.encode_payload(version, &result),
            Ok(Err(e)) => Err(BridgeError::ServiceFailed {
                service: service.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(BridgeError::ServiceFailed {
                service: service.to_string(),
                message: "handler panicked".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Reader and service tables of one connection.
#[derive(Default)]
pub struct Dispatcher {
    readers: HashMap<String, Box<dyn ReaderSink>>,
    services: HashMap<String, Box<dyn ServiceSink>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("readers", &self.readers.keys().collect::<Vec<_>>())
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a typed callback for `topic`. Every reader of a topic must use
    /// the same message type.
    pub fn add_reader<T, F>(&mut self, topic: &str, callback: F) -> BridgeResult<()>
    where
        T: 'static,
        F: FnMut(&T) + Send + 'static,
    {
        let sink = self
            .readers
            .entry(topic.to_string())
            .or_insert_with(|| Box::new(TypedReaders::<T> { callbacks: Vec::new() }));
        let label = sink.type_label();
        match sink.as_any_mut().downcast_mut::<TypedReaders<T>>() {
            Some(readers) => {
                readers.callbacks.push(Box::new(callback));
                Ok(())
            }
            None => Err(BridgeError::mismatch(label, std::any::type_name::<T>())),
        }
    }

    /// Add an undecoded callback for `topic`.
    pub fn add_raw_reader<F>(&mut self, topic: &str, callback: F) -> BridgeResult<()>
    where
        F: FnMut(&RawMessage) + Send + 'static,
    {
        let sink = self
            .readers
            .entry(topic.to_string())
            .or_insert_with(|| Box::new(RawReaders { callbacks: Vec::new() }));
        let label = sink.type_label();
        match sink.as_any_mut().downcast_mut::<RawReaders>() {
            Some(readers) => {
                readers.callbacks.push(Box::new(callback));
                Ok(())
            }
            None => Err(BridgeError::mismatch(label, "raw message")),
        }
    }

    /// Install the handler for `service`. Returns `true` if it replaced one.
    pub fn add_service<A, R, E, F>(&mut self, service: &str, handler: F) -> bool
    where
        A: 'static,
        R: 'static,
        E: fmt::Display + 'static,
        F: FnMut(A) -> Result<R, E> + Send + 'static,
    {
        let sink = TypedService {
            handler,
            _marker: PhantomData,
        };
        self.services
            .insert(service.to_string(), Box::new(sink))
            .is_some()
    }

    pub fn reader_count(&self, topic: &str) -> usize {
        self.readers.get(topic).map_or(0, |s| s.len())
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    /// Route one inbound frame.
    pub fn dispatch(
        &mut self,
        serializer: &Serializer,
        version: ProtocolVersion,
        frame: &[u8],
    ) -> Dispatch {
        let inbound = match serializer.parse_frame(version, frame) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!("dropping malformed frame ({} bytes): {}", frame.len(), e);
                return Dispatch::Dropped {
                    reason: e.to_string(),
                };
            }
        };

        match inbound {
            Inbound::Publish {
                topic,
                type_name,
                payload,
            } => match self.readers.get_mut(&topic) {
                Some(sink) => {
                    sink.deliver(serializer, version, &topic, type_name.as_deref(), payload)
                }
                None => {
                    tracing::debug!("no reader for {}, message dropped", topic);
                    Dispatch::Dropped {
                        reason: format!("no reader for {}", topic),
                    }
                }
            },
            Inbound::CallService { service, id, args } => {
                let outcome = match self.services.get_mut(&service) {
                    Some(handler) => handler.call(serializer, version, &service, args),
                    None => Err(BridgeError::ServiceNotFound(service.clone())),
                };
                if let Err(e) = &outcome {
                    tracing::warn!("service call {} failed: {}", service, e);
                }
                match serializer.service_response_frame(version, &service, id, outcome) {
                    Ok(frame) => Dispatch::Replied { service, frame },
                    Err(e) => {
                        tracing::warn!("cannot encode response for {}: {}", service, e);
                        Dispatch::Dropped {
                            reason: e.to_string(),
                        }
                    }
                }
            }
            Inbound::Ignored { op } => {
                tracing::trace!("ignoring {} frame", op);
                Dispatch::Ignored { op }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::std_msgs::{Bool, Int32};
    use crate::message::std_srvs::{SetBool, SetBoolResponse};
    use crate::wire::BinaryFrame;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    fn publish(topic: &str, msg: Value) -> Vec<u8> {
        json!({"op": "publish", "topic": topic, "msg": msg})
            .to_string()
            .into_bytes()
    }

    #[test]
    fn test_fan_out_to_all_readers() {
        let serializer = Serializer::default();
        let mut d = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..2 {
            let seen = Arc::clone(&seen);
            d.add_reader::<Int32, _>("/n", move |m| seen.lock().unwrap().push((tag, m.data)))
                .unwrap();
        }
        assert_eq!(d.reader_count("/n"), 2);

        let out = d.dispatch(&serializer, ProtocolVersion::Ros1, &publish("/n", json!({"data": 4})));
        assert_eq!(
            out,
            Dispatch::Delivered {
                topic: "/n".into(),
                callbacks: 2
            }
        );
        assert_eq!(*seen.lock().unwrap(), vec![(0, 4), (1, 4)]);
    }

    #[test]
    fn test_reader_type_mismatch() {
        let mut d = Dispatcher::new();
        d.add_reader::<Int32, _>("/n", |_| {}).unwrap();
        assert!(matches!(
            d.add_reader::<Bool, _>("/n", |_| {}),
            Err(BridgeError::TypeMismatch { .. })
        ));
        assert!(d.add_raw_reader("/n", |_| {}).is_err());
        assert_eq!(d.reader_count("/n"), 1);
    }

    #[test]
    fn test_unknown_topic_and_bad_payload_dropped() {
        let serializer = Serializer::default();
        let mut d = Dispatcher::new();
        d.add_reader::<Int32, _>("/n", |_| panic!("must not be called"))
            .unwrap();

        let out = d.dispatch(&serializer, ProtocolVersion::Ros1, &publish("/other", json!({})));
        assert!(matches!(out, Dispatch::Dropped { .. }));

        let out = d.dispatch(
            &serializer,
            ProtocolVersion::Ros1,
            &publish("/n", json!({"data": "x"})),
        );
        assert!(matches!(out, Dispatch::Dropped { .. }));

        let out = d.dispatch(&serializer, ProtocolVersion::Ros1, b"not json");
        assert!(matches!(out, Dispatch::Dropped { .. }));
    }

    #[test]
    fn test_type_tag_must_match_reader() {
        let serializer = Serializer::default();
        let mut d = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            d.add_reader::<Int32, _>("/n", move |m| seen.lock().unwrap().push(m.data))
                .unwrap();
        }

        let foreign = BinaryFrame::Publish {
            channel: "/n".into(),
            type_name: "std_msgs.Float32".into(),
            message: 1.5f32.to_le_bytes().to_vec(),
        }
        .encode();
        let out = d.dispatch(&serializer, ProtocolVersion::Cyber, &foreign);
        assert!(matches!(out, Dispatch::Dropped { .. }));

        let tagged = json!({"op": "publish", "topic": "/n", "type": "std_msgs/Float64", "msg": {"data": 3}});
        let out = d.dispatch(&serializer, ProtocolVersion::Ros1, tagged.to_string().as_bytes());
        assert!(matches!(out, Dispatch::Dropped { .. }));
        assert!(seen.lock().unwrap().is_empty());

        let own = BinaryFrame::Publish {
            channel: "/n".into(),
            type_name: "std_msgs.Int32".into(),
            message: 7i32.to_le_bytes().to_vec(),
        }
        .encode();
        d.dispatch(&serializer, ProtocolVersion::Cyber, &own);
        let tagged = json!({"op": "publish", "topic": "/n", "type": "std_msgs/msg/Int32", "msg": {"data": 8}});
        d.dispatch(&serializer, ProtocolVersion::Ros2, tagged.to_string().as_bytes());
        // Untagged rosbridge publishes are read as the reader's type.
        d.dispatch(&serializer, ProtocolVersion::Ros1, &publish("/n", json!({"data": 9})));
        assert_eq!(*seen.lock().unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn test_panicking_reader_is_contained() {
        let serializer = Serializer::default();
        let mut d = Dispatcher::new();
        let hits = Arc::new(Mutex::new(0));
        d.add_reader::<Int32, _>("/n", |_| panic!("boom")).unwrap();
        {
            let hits = Arc::clone(&hits);
            d.add_reader::<Int32, _>("/n", move |_| *hits.lock().unwrap() += 1)
                .unwrap();
        }
        d.dispatch(&serializer, ProtocolVersion::Ros1, &publish("/n", json!({"data": 1})));
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_raw_reader_binary() {
        let serializer = Serializer::default();
        let mut d = Dispatcher::new();
        let got = Arc::new(Mutex::new(None));
        {
            let got = Arc::clone(&got);
            d.add_raw_reader("/img", move |m| *got.lock().unwrap() = Some(m.clone()))
                .unwrap();
        }
        let frame = BinaryFrame::Publish {
            channel: "/img".into(),
            type_name: "apollo.drivers.CompressedImage".into(),
            message: vec![1, 2, 3],
        }
        .encode();
        d.dispatch(&serializer, ProtocolVersion::Cyber, &frame);
        assert_eq!(
            *got.lock().unwrap(),
            Some(RawMessage::Binary(vec![1, 2, 3]))
        );
    }

    #[test]
    fn test_service_call_and_replace() {
        let serializer = Serializer::default();
        let mut d = Dispatcher::new();
        assert!(!d.add_service("/toggle", |req: SetBool| {
            Ok::<_, String>(SetBoolResponse {
                success: req.data,
                message: "first".into(),
            })
        }));
        assert!(d.add_service("/toggle", |req: SetBool| {
            Ok::<_, String>(SetBoolResponse {
                success: !req.data,
                message: "second".into(),
            })
        }));

        let call = json!({"op": "call_service", "service": "/toggle", "id": 3, "args": {"data": true}});
        let out = d.dispatch(&serializer, ProtocolVersion::Ros1, call.to_string().as_bytes());
        let Dispatch::Replied { frame, .. } = out else {
            panic!("expected a reply");
        };
        assert!(d.has_service("/toggle"));
        assert!(!d.has_service("/other"));
        let v: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(v["id"], 3);
        assert_eq!(v["result"], true);
        assert_eq!(v["values"], json!({"success": false, "message": "second"}));
    }

    #[test]
    fn test_service_failures_become_responses() {
        let serializer = Serializer::default();
        let mut d = Dispatcher::new();
        d.add_service("/fail", |_: SetBool| Err::<SetBoolResponse, _>("nope"));
        d.add_service("/panic", |_: SetBool| -> Result<SetBoolResponse, String> {
            panic!("handler bug")
        });

        for (service, code) in [
            ("/fail", "SERVICE_FAILED"),
            ("/panic", "SERVICE_FAILED"),
            ("/missing", "SERVICE_NOT_FOUND"),
        ] {
            let call = json!({"op": "call_service", "service": service, "args": {"data": true}});
            let out = d.dispatch(&serializer, ProtocolVersion::Ros1, call.to_string().as_bytes());
            let Dispatch::Replied { frame, .. } = out else {
                panic!("expected a reply for {}", service);
            };
            let v: Value = serde_json::from_slice(&frame).unwrap();
            assert_eq!(v["result"], false);
            assert_eq!(v["values"]["error"], code);
        }
    }

    #[test]
    fn test_ignored_ops() {
        let serializer = Serializer::default();
        let mut d = Dispatcher::new();
        let out = d.dispatch(
            &serializer,
            ProtocolVersion::Ros2,
            br#"{"op":"set_level","level":"warning"}"#,
        );
        assert_eq!(
            out,
            Dispatch::Ignored {
                op: "set_level".into()
            }
        );
    }
}
