// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! rosbridge JSON envelopes.
//!
//! Every WebSocket text message is one JSON object tagged by `op`:
//!
//! ```json
//! {"op":"publish","topic":"/pose","msg":{"position":{"x":1.0}}}
//! {"op":"call_service","service":"/reset","id":"call_1","args":{}}
//! {"op":"service_response","service":"/reset","id":"call_1","values":{},"result":true}
//! ```
//!
//! Ops this client never acts on (`set_level`, `status`, anything unknown)
//! still parse so the dispatcher can drop them quietly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::WireError;

/// One rosbridge operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Envelope {
    Publish {
        topic: String,
        msg: Value,
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
    },
    Subscribe {
        topic: String,
        #[serde(rename = "type")]
        type_name: String,
    },
    Unsubscribe {
        topic: String,
    },
    Advertise {
        topic: String,
        #[serde(rename = "type")]
        type_name: String,
    },
    Unadvertise {
        topic: String,
    },
    AdvertiseService {
        service: String,
        #[serde(rename = "type")]
        type_name: String,
    },
    CallService {
        service: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        #[serde(default)]
        args: Value,
    },
    ServiceResponse {
        service: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        #[serde(default)]
        values: Value,
        result: bool,
    },
    SetLevel {
        #[serde(default)]
        level: Option<String>,
    },
    Status {
        #[serde(default)]
        level: Option<String>,
        #[serde(default)]
        msg: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl Envelope {
    /// The `op` string as it appears on the wire.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Publish { .. } => "publish",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Advertise { .. } => "advertise",
            Self::Unadvertise { .. } => "unadvertise",
            Self::AdvertiseService { .. } => "advertise_service",
            Self::CallService { .. } => "call_service",
            Self::ServiceResponse { .. } => "service_response",
            Self::SetLevel { .. } => "set_level",
            Self::Status { .. } => "status",
            Self::Unknown => "unknown",
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Self-describing message: `{"type": <wire type>, "msg": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypedPayload {
    #[serde(rename = "type")]
    pub type_name: String,
    pub msg: Value,
}

/// Rewrite ROS1 time objects (`{secs, nsecs}`) into the ROS2 spelling
/// (`{sec, nanosec}`), recursively.
pub fn to_ros2_time_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if is_time_object(map, "secs", "nsecs") {
                rename_key(map, "secs", "sec");
                rename_key(map, "nsecs", "nanosec");
                return;
            }
            for child in map.values_mut() {
                to_ros2_time_fields(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(to_ros2_time_fields),
        _ => {}
    }
}

fn is_time_object(map: &Map<String, Value>, secs: &str, nsecs: &str) -> bool {
    map.len() == 2
        && map.get(secs).is_some_and(Value::is_number)
        && map.get(nsecs).is_some_and(Value::is_number)
}

fn rename_key(map: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(v) = map.remove(from) {
        map.insert(to.to_string(), v);
    }
}
