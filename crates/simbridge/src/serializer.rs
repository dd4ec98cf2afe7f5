// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed messages to and from wire frames.
//!
//! The [`Serializer`] is the only place where the protocol version selects
//! an encoding. Everything above it deals in Rust types, topic names and
//! [`RawMessage`] payloads.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::message::{RawMessage, TypeNames, TypeRegistry};
use crate::wire::text::TypedPayload;
use crate::wire::{BinaryFrame, Envelope, ProtocolVersion, WireReader, WireWriter};

/// Wire-level registration sent on connect (and immediately if connected).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetupFrame {
    Subscribe { topic: String, types: TypeNames },
    Advertise { topic: String, types: TypeNames },
    AdvertiseService { service: String, types: TypeNames },
}

impl SetupFrame {
    pub fn name(&self) -> &str {
        match self {
            Self::Subscribe { topic, .. } | Self::Advertise { topic, .. } => topic,
            Self::AdvertiseService { service, .. } => service,
        }
    }
}

/// Correlation id of an inbound service call, echoed in the response.
#[derive(Clone, Debug, PartialEq)]
pub enum CallId {
    /// rosbridge `id`, any JSON value (absent when the caller sent none).
    Text(Option<Value>),
    Binary(u32),
}

/// A parsed inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Publish {
        topic: String,
        type_name: Option<String>,
        payload: RawMessage,
    },
    CallService {
        service: String,
        id: CallId,
        args: RawMessage,
    },
    /// Valid frame with nothing for this client to do.
    Ignored { op: String },
}

/// Encoder/decoder bound to a type registry.
#[derive(Clone, Debug)]
pub struct Serializer {
    types: Arc<TypeRegistry>,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new(TypeRegistry::with_builtin())
    }
}

impl Serializer {
    pub fn new(types: TypeRegistry) -> Self {
        Self {
            types: Arc::new(types),
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    // -----------------------------------------------------------------------
    // Self-describing payloads
    // -----------------------------------------------------------------------

    /// Serialize `msg` into a typed payload carrying its wire type name.
    ///
    /// Text: `{"type": .., "msg": {..}}`.
    /// Binary: `[u32 LE size][u32 LE type len][type][payload]`, where `size`
    /// counts every byte after the size field.
    pub fn serialize<T: 'static>(&self, version: ProtocolVersion, msg: &T) -> BridgeResult<Vec<u8>> {
        let type_name = self.types.wire_name::<T>(version)?.to_string();
        match self.encode_payload(version, msg)? {
            RawMessage::Json(msg) => {
                let payload = TypedPayload { type_name, msg };
                serde_json::to_vec(&payload).map_err(|e| BridgeError::MalformedPayload(e.to_string()))
            }
            RawMessage::Binary(bytes) => {
                let size = 4 + type_name.len() + bytes.len();
                let mut w = WireWriter::with_capacity(4 + size);
                w.write_u32_le(size as u32);
                w.write_str(&type_name);
                w.write_bytes(&bytes);
                Ok(w.into_inner())
            }
        }
    }

    /// Inverse of [`serialize`](Self::serialize). The embedded type name
    /// must be `T`'s wire name for `version`.
    pub fn deserialize<T: 'static>(&self, version: ProtocolVersion, bytes: &[u8]) -> BridgeResult<T> {
        let expected = self.types.wire_name::<T>(version)?;
        if version.is_binary() {
            let mut r = WireReader::new(bytes);
            let size = r.read_u32_le()? as usize;
            if size != r.remaining() {
                return Err(BridgeError::MalformedPayload(format!(
                    "payload size {} does not match {} remaining bytes",
                    size,
                    r.remaining()
                )));
            }
            let found = r.read_string("type name")?;
            check_type(expected, &found)?;
            self.types.decode_binary(r.rest())
        } else {
            let payload: TypedPayload = serde_json::from_slice(bytes)
                .map_err(|e| BridgeError::MalformedPayload(e.to_string()))?;
            check_type(expected, &payload.type_name)?;
            self.types.decode_value(payload.msg)
        }
    }

    /// Encode `msg` into the untagged payload carried by publish frames.
    pub fn encode_payload<T: 'static>(
        &self,
        version: ProtocolVersion,
        msg: &T,
    ) -> BridgeResult<RawMessage> {
        if version.is_binary() {
            Ok(RawMessage::Binary(self.types.encode_binary(msg)?))
        } else {
            Ok(RawMessage::Json(self.types.encode_value(version, msg)?))
        }
    }

    pub fn decode_payload<T: 'static>(&self, payload: RawMessage) -> BridgeResult<T> {
        match payload {
            RawMessage::Json(value) => self.types.decode_value(value),
            RawMessage::Binary(bytes) => self.types.decode_binary(&bytes),
        }
    }

    // -----------------------------------------------------------------------
    // Frames
    // -----------------------------------------------------------------------

    /// Setup frame for `version`, or `None` when the protocol has no such op
    /// (Cyber has no service advertisement).
    pub fn setup_frame(
        &self,
        version: ProtocolVersion,
        setup: &SetupFrame,
    ) -> BridgeResult<Option<Vec<u8>>> {
        if version.is_binary() {
            let frame = match setup {
                SetupFrame::Subscribe { topic, types } => BinaryFrame::AddReader {
                    channel: topic.clone(),
                    type_name: types.name(version).to_string(),
                },
                SetupFrame::Advertise { topic, types } => BinaryFrame::AddWriter {
                    channel: topic.clone(),
                    type_name: types.name(version).to_string(),
                },
                SetupFrame::AdvertiseService { .. } => return Ok(None),
            };
            return Ok(Some(frame.encode()));
        }

        let envelope = match setup {
            SetupFrame::Subscribe { topic, types } => Envelope::Subscribe {
                topic: topic.clone(),
                type_name: types.name(version).to_string(),
            },
            SetupFrame::Advertise { topic, types } => Envelope::Advertise {
                topic: topic.clone(),
                type_name: types.name(version).to_string(),
            },
            SetupFrame::AdvertiseService { service, types } => Envelope::AdvertiseService {
                service: service.clone(),
                type_name: types.name(version).to_string(),
            },
        };
        Ok(Some(envelope.to_bytes()?))
    }

    pub fn publish_frame(
        &self,
        version: ProtocolVersion,
        topic: &str,
        types: &TypeNames,
        payload: RawMessage,
    ) -> BridgeResult<Vec<u8>> {
        match (version.is_binary(), payload) {
            (false, RawMessage::Json(msg)) => {
                let envelope = Envelope::Publish {
                    topic: topic.to_string(),
                    msg,
                    type_name: None,
                };
                Ok(envelope.to_bytes()?)
            }
            (true, RawMessage::Binary(message)) => Ok(BinaryFrame::Publish {
                channel: topic.to_string(),
                type_name: types.name(version).to_string(),
                message,
            }
            .encode()),
            (_, payload) => Err(payload_mismatch(version, &payload)),
        }
    }

    /// Response to an inbound service call. Failures are encoded as error
    /// responses: `result: false` with `{"error": <code>, "message": ..}`
    /// on the text wire, `ok = 0` with `"<code>: <message>"` on the binary
    /// wire.
    pub fn service_response_frame(
        &self,
        version: ProtocolVersion,
        service: &str,
        id: CallId,
        outcome: Result<RawMessage, BridgeError>,
    ) -> BridgeResult<Vec<u8>> {
        match id {
            CallId::Text(id) => {
                let (values, result) = match outcome {
                    Ok(RawMessage::Json(values)) => (values, true),
                    Ok(payload) => return Err(payload_mismatch(version, &payload)),
                    Err(e) => (json!({"error": e.code(), "message": e.to_string()}), false),
                };
                let envelope = Envelope::ServiceResponse {
                    service: service.to_string(),
                    id,
                    values,
                    result,
                };
                Ok(envelope.to_bytes()?)
            }
            CallId::Binary(id) => {
                let (values, ok) = match outcome {
                    Ok(RawMessage::Binary(values)) => (values, true),
                    Ok(payload) => return Err(payload_mismatch(version, &payload)),
                    Err(e) => (format!("{}: {}", e.code(), e).into_bytes(), false),
                };
                Ok(BinaryFrame::ServiceResponse {
                    service: service.to_string(),
                    id,
                    ok,
                    values,
                }
                .encode())
            }
        }
    }

    /// Parse one inbound frame (a WebSocket message, or a complete
    /// length-prefixed TCP frame).
    pub fn parse_frame(&self, version: ProtocolVersion, bytes: &[u8]) -> BridgeResult<Inbound> {
        if version.is_binary() {
            let inbound = match BinaryFrame::decode(bytes)? {
                BinaryFrame::Publish {
                    channel,
                    type_name,
                    message,
                } => Inbound::Publish {
                    topic: channel,
                    type_name: Some(type_name),
                    payload: RawMessage::Binary(message),
                },
                BinaryFrame::CallService { service, id, args } => Inbound::CallService {
                    service,
                    id: CallId::Binary(id),
                    args: RawMessage::Binary(args),
                },
                other => Inbound::Ignored {
                    op: format!("{:?}", other.op()),
                },
            };
            return Ok(inbound);
        }

        let inbound = match Envelope::from_bytes(bytes)? {
            Envelope::Publish {
                topic,
                msg,
                type_name,
            } => Inbound::Publish {
                topic,
                type_name,
                payload: RawMessage::Json(msg),
            },
            Envelope::CallService { service, id, args } => Inbound::CallService {
                service,
                id: CallId::Text(id),
                args: RawMessage::Json(args),
            },
            other => Inbound::Ignored {
                op: other.op().to_string(),
            },
        };
        Ok(inbound)
    }
}

fn check_type(expected: &str, found: &str) -> BridgeResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(BridgeError::mismatch(expected, found))
    }
}

fn payload_mismatch(version: ProtocolVersion, payload: &RawMessage) -> BridgeError {
    let found = match payload {
        RawMessage::Json(_) => "json payload",
        RawMessage::Binary(_) => "binary payload",
    };
    BridgeError::mismatch(format!("{} payload", version), found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::geometry_msgs::{Point, Pose, Quaternion};
    use crate::message::std_msgs;

    fn pose() -> Pose {
        Pose {
            position: Point {
                x: 1.0,
                y: 2.0,
                z: 3.0,
            },
            orientation: Quaternion::default(),
        }
    }

    #[test]
    fn test_text_typed_payload() {
        let s = Serializer::default();
        let bytes = s.serialize(ProtocolVersion::Ros1, &pose()).unwrap();
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["type"], "geometry_msgs/Pose");
        assert_eq!(v["msg"]["position"]["y"], 2.0);

        let back: Pose = s.deserialize(ProtocolVersion::Ros1, &bytes).unwrap();
        assert_eq!(back, pose());
    }

    #[test]
    fn test_binary_typed_payload_layout() {
        let s = Serializer::default();
        let bytes = s
            .serialize(ProtocolVersion::Cyber, &std_msgs::Int32 { data: 7 })
            .unwrap();
        let type_name = b"std_msgs.Int32";
        let size = 4 + type_name.len() + 4;
        assert_eq!(&bytes[..4], &(size as u32).to_le_bytes());
        assert_eq!(&bytes[4..8], &(type_name.len() as u32).to_le_bytes());
        assert_eq!(&bytes[8..8 + type_name.len()], type_name);
        assert_eq!(&bytes[8 + type_name.len()..], &7i32.to_le_bytes());

        let back: std_msgs::Int32 = s.deserialize(ProtocolVersion::Cyber, &bytes).unwrap();
        assert_eq!(back.data, 7);
    }

    #[test]
    fn test_deserialize_type_mismatch() {
        let s = Serializer::default();
        let bytes = s
            .serialize(ProtocolVersion::Ros2, &std_msgs::Bool { data: true })
            .unwrap();
        let err = s
            .deserialize::<std_msgs::Int32>(ProtocolVersion::Ros2, &bytes)
            .unwrap_err();
        assert!(matches!(err, BridgeError::TypeMismatch { .. }));

        let bytes = s
            .serialize(ProtocolVersion::Cyber, &std_msgs::Bool { data: true })
            .unwrap();
        let err = s
            .deserialize::<std_msgs::Int32>(ProtocolVersion::Cyber, &bytes)
            .unwrap_err();
        assert!(matches!(err, BridgeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_deserialize_truncated() {
        let s = Serializer::default();
        let mut bytes = s.serialize(ProtocolVersion::Cyber, &pose()).unwrap();
        bytes.truncate(bytes.len() - 1);
        let err = s.deserialize::<Pose>(ProtocolVersion::Cyber, &bytes).unwrap_err();
        assert_eq!(err.code(), "MALFORMED_PAYLOAD");

        let err = s
            .deserialize::<Pose>(ProtocolVersion::Ros1, b"{\"type\":")
            .unwrap_err();
        assert_eq!(err.code(), "MALFORMED_PAYLOAD");
    }

    #[test]
    fn test_setup_frames_follow_version() {
        let s = Serializer::default();
        let setup = SetupFrame::Subscribe {
            topic: "/clock".into(),
            types: TypeNames::ros("rosgraph_msgs/Clock"),
        };

        let text = s.setup_frame(ProtocolVersion::Ros2, &setup).unwrap().unwrap();
        let v: Value = serde_json::from_slice(&text).unwrap();
        assert_eq!(
            v,
            json!({"op": "subscribe", "topic": "/clock", "type": "rosgraph_msgs/msg/Clock"})
        );

        let bin = s.setup_frame(ProtocolVersion::Cyber, &setup).unwrap().unwrap();
        assert_eq!(
            BinaryFrame::decode(&bin).unwrap(),
            BinaryFrame::AddReader {
                channel: "/clock".into(),
                type_name: "rosgraph_msgs.Clock".into(),
            }
        );

        let service = SetupFrame::AdvertiseService {
            service: "/reset".into(),
            types: TypeNames::service("std_srvs/Empty"),
        };
        assert_eq!(s.setup_frame(ProtocolVersion::Cyber, &service).unwrap(), None);
    }

    #[test]
    fn test_error_response_text() {
        let s = Serializer::default();
        let frame = s
            .service_response_frame(
                ProtocolVersion::Ros1,
                "/missing",
                CallId::Text(Some(json!("call_7"))),
                Err(BridgeError::ServiceNotFound("/missing".into())),
            )
            .unwrap();
        let v: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(v["op"], "service_response");
        assert_eq!(v["id"], "call_7");
        assert_eq!(v["result"], false);
        assert_eq!(v["values"]["error"], "SERVICE_NOT_FOUND");
    }

    #[test]
    fn test_parse_binary_call() {
        let s = Serializer::default();
        let frame = BinaryFrame::CallService {
            service: "/reset".into(),
            id: 9,
            args: vec![],
        }
        .encode();
        assert_eq!(
            s.parse_frame(ProtocolVersion::Cyber, &frame).unwrap(),
            Inbound::CallService {
                service: "/reset".into(),
                id: CallId::Binary(9),
                args: RawMessage::Binary(vec![]),
            }
        );
    }

    #[test]
    fn test_parse_ignored_ops() {
        let s = Serializer::default();
        let inbound = s
            .parse_frame(ProtocolVersion::Ros1, br#"{"op":"status","level":"info","msg":"hi"}"#)
            .unwrap();
        assert_eq!(
            inbound,
            Inbound::Ignored {
                op: "status".into()
            }
        );
    }

    #[test]
    fn test_publish_payload_must_match_version() {
        let s = Serializer::default();
        let err = s
            .publish_frame(
                ProtocolVersion::Cyber,
                "/x",
                &TypeNames::exact("X"),
                RawMessage::Json(json!({})),
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::TypeMismatch { .. }));
    }
}
