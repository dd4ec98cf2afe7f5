// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message types and the type registry.
//!
//! A message type is any `serde` type registered in a [`TypeRegistry`]
//! together with its wire type names. Types that also implement
//! [`BinaryEncode`]/[`BinaryDecode`] can be carried over the Cyber bridge.
//!
//! ```ignore
//! use simbridge::message::{TypeNames, TypeRegistry};
//!
//! let mut registry = TypeRegistry::with_builtin();
//! registry.register::<MyMsg>(TypeNames::ros("my_pkg/MyMsg"));
//! ```

pub mod geometry_msgs;
pub mod registry;
pub mod rosgraph_msgs;
pub mod sensor_msgs;
pub mod std_msgs;
pub mod std_srvs;

use base64::{engine::general_purpose, Engine as _};
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::wire::{BinaryDecode, BinaryEncode, ProtocolVersion, WireError, WireReader, WireWriter};

pub use registry::TypeRegistry;

/// Implement [`BinaryEncode`]/[`BinaryDecode`] for a struct by walking its
/// fields in the listed order.
///
/// ```ignore
/// simbridge::binary_struct!(Point { x, y, z });
/// ```
#[macro_export]
macro_rules! binary_struct {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::wire::BinaryEncode for $ty {
            #[allow(unused_variables)]
            fn encode(&self, w: &mut $crate::wire::WireWriter) {
                $( $crate::wire::BinaryEncode::encode(&self.$field, w); )*
            }
        }

        impl $crate::wire::BinaryDecode for $ty {
            #[allow(unused_variables)]
            fn decode(
                r: &mut $crate::wire::WireReader<'_>,
            ) -> Result<Self, $crate::wire::WireError> {
                Ok(Self {
                    $( $field: $crate::wire::BinaryDecode::decode(r)?, )*
                })
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Wire type names
// ---------------------------------------------------------------------------

/// Wire type name of one message type, per protocol version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeNames {
    pub ros1: String,
    pub ros2: String,
    pub cyber: String,
}

impl TypeNames {
    /// Names for a ROS message `pkg/Type`: ROS2 becomes `pkg/msg/Type`,
    /// Cyber becomes `pkg.Type`.
    pub fn ros(name: &str) -> Self {
        Self::with_infix(name, "msg")
    }

    /// Names for a ROS service `pkg/Type`: ROS2 becomes `pkg/srv/Type`.
    pub fn service(name: &str) -> Self {
        Self::with_infix(name, "srv")
    }

    /// The same name on every protocol.
    pub fn exact(name: &str) -> Self {
        Self {
            ros1: name.to_string(),
            ros2: name.to_string(),
            cyber: name.to_string(),
        }
    }

    /// Override the Cyber name (e.g. `apollo.localization.LocalizationEstimate`).
    pub fn cyber(mut self, name: &str) -> Self {
        self.cyber = name.to_string();
        self
    }

    pub fn name(&self, version: ProtocolVersion) -> &str {
        match version {
            ProtocolVersion::Ros1 => &self.ros1,
            ProtocolVersion::Ros2 => &self.ros2,
            ProtocolVersion::Cyber => &self.cyber,
        }
    }

    fn with_infix(name: &str, infix: &str) -> Self {
        let ros2 = match name.split_once('/') {
            Some((pkg, ty)) if !ty.contains('/') => format!("{}/{}/{}", pkg, infix, ty),
            _ => name.to_string(),
        };
        Self {
            ros1: name.to_string(),
            ros2,
            cyber: name.replace('/', "."),
        }
    }
}

// ---------------------------------------------------------------------------
// Untyped payloads
// ---------------------------------------------------------------------------

/// An undecoded inbound message, as handed to raw readers.
#[derive(Clone, Debug, PartialEq)]
pub enum RawMessage {
    /// The `msg` value of a rosbridge publish.
    Json(Value),
    /// The message bytes of a Cyber publish.
    Binary(Vec<u8>),
}

impl RawMessage {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Json(_) => None,
            Self::Binary(b) => Some(b),
        }
    }
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => write!(f, "{}", v),
            Self::Binary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared field types
// ---------------------------------------------------------------------------

/// ROS time stamp.
///
/// Serialized with the ROS1 field names; the serializer rewrites them to
/// `sec`/`nanosec` for ROS2 and decoding accepts either spelling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time {
    #[serde(alias = "sec")]
    pub secs: u32,
    #[serde(alias = "nanosec")]
    pub nsecs: u32,
}

impl Time {
    pub fn new(secs: u32, nsecs: u32) -> Self {
        Self { secs, nsecs }
    }

    pub fn from_secs_f64(t: f64) -> Self {
        let secs = t.max(0.0).floor();
        let nsecs = ((t.max(0.0) - secs) * 1e9).round().min(999_999_999.0);
        Self {
            secs: secs as u32,
            nsecs: nsecs as u32,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.secs) + f64::from(self.nsecs) * 1e-9
    }
}

binary_struct!(Time { secs, nsecs });

/// `uint8[]` field: a base64 string on the JSON wire, raw bytes on the
/// binary wire. Decoding also accepts a JSON list of integers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ByteArray(pub Vec<u8>);

impl From<Vec<u8>> for ByteArray {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl AsRef<[u8]> for ByteArray {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ByteArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for ByteArray {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ByteArrayVisitor;

        impl<'de> Visitor<'de> for ByteArrayVisitor {
            type Value = ByteArray;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a base64 string or a list of bytes")
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<ByteArray, E> {
                general_purpose::STANDARD
                    .decode(s)
                    .map(ByteArray)
                    .map_err(|e| E::custom(format!("invalid base64: {}", e)))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ByteArray, A::Error> {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element::<u8>()? {
                    out.push(b);
                }
                Ok(ByteArray(out))
            }
        }

        deserializer.deserialize_any(ByteArrayVisitor)
    }
}

impl BinaryEncode for ByteArray {
    fn encode(&self, w: &mut WireWriter) {
        w.write_blob(&self.0);
    }
}

impl BinaryDecode for ByteArray {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self(r.read_blob()?.to_vec()))
    }
}
