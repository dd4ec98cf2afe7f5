// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Explicit table of message types known to a connection.
//!
//! Each entry maps a Rust type to its wire type names and to a pair of
//! monomorphized codec functions. Nothing is discovered at runtime: types
//! are registered at startup, and using an unregistered type fails the
//! single call with [`BridgeError::UnsupportedType`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use super::{geometry_msgs, rosgraph_msgs, sensor_msgs, std_msgs, std_srvs, TypeNames};
use crate::error::{BridgeError, BridgeResult};
use crate::wire::{binary, text, BinaryDecode, BinaryEncode, ProtocolVersion};

type ToJsonFn = fn(&dyn Any) -> BridgeResult<Value>;
type FromJsonFn = fn(Value) -> BridgeResult<Box<dyn Any + Send>>;
type ToBinaryFn = fn(&dyn Any) -> BridgeResult<Vec<u8>>;
type FromBinaryFn = fn(&[u8]) -> BridgeResult<Box<dyn Any + Send>>;

#[derive(Clone, Copy)]
struct BinaryCodec {
    encode: ToBinaryFn,
    decode: FromBinaryFn,
}

#[derive(Clone)]
struct TypeEntry {
    rust_name: &'static str,
    names: TypeNames,
    to_json: ToJsonFn,
    from_json: FromJsonFn,
    binary: Option<BinaryCodec>,
}

/// Registered message types, keyed by Rust type.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    entries: HashMap<TypeId, TypeEntry>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the bundled `std_msgs`, `geometry_msgs`,
    /// `rosgraph_msgs`, `sensor_msgs` and `std_srvs` types.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register_with_binary::<std_msgs::Bool>(TypeNames::ros("std_msgs/Bool"))
            .register_with_binary::<std_msgs::Int32>(TypeNames::ros("std_msgs/Int32"))
            .register_with_binary::<std_msgs::Float64>(TypeNames::ros("std_msgs/Float64"))
            .register_with_binary::<std_msgs::String>(TypeNames::ros("std_msgs/String"))
            .register_with_binary::<std_msgs::Header>(TypeNames::ros("std_msgs/Header"))
            .register_with_binary::<geometry_msgs::Point>(TypeNames::ros("geometry_msgs/Point"))
            .register_with_binary::<geometry_msgs::Quaternion>(TypeNames::ros(
                "geometry_msgs/Quaternion",
            ))
            .register_with_binary::<geometry_msgs::Pose>(TypeNames::ros("geometry_msgs/Pose"))
            .register_with_binary::<geometry_msgs::PoseStamped>(TypeNames::ros(
                "geometry_msgs/PoseStamped",
            ))
            .register_with_binary::<rosgraph_msgs::Clock>(TypeNames::ros("rosgraph_msgs/Clock"))
            .register_with_binary::<sensor_msgs::CompressedImage>(TypeNames::ros(
                "sensor_msgs/CompressedImage",
            ))
            .register_with_binary::<std_srvs::Empty>(TypeNames::service("std_srvs/Empty"))
            .register_with_binary::<std_srvs::SetBool>(TypeNames::service("std_srvs/SetBool"))
            .register_with_binary::<std_srvs::SetBoolResponse>(TypeNames::service(
                "std_srvs/SetBool",
            ))
            .register_with_binary::<std_srvs::Trigger>(TypeNames::service("std_srvs/Trigger"))
            .register_with_binary::<std_srvs::TriggerResponse>(TypeNames::service(
                "std_srvs/Trigger",
            ));
        registry
    }

    /// Register a type for the JSON protocols (ROS1/ROS2).
    ///
    /// Re-registering a type replaces its names.
    pub fn register<T>(&mut self, names: TypeNames) -> &mut Self
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        self.insert::<T>(names, None)
    }

    /// Register a type for every protocol, including Cyber.
    pub fn register_with_binary<T>(&mut self, names: TypeNames) -> &mut Self
    where
        T: Serialize + DeserializeOwned + BinaryEncode + BinaryDecode + Send + 'static,
    {
        let codec = BinaryCodec {
            encode: encode_binary_erased::<T>,
            decode: decode_binary_erased::<T>,
        };
        self.insert::<T>(names, Some(codec))
    }

    fn insert<T>(&mut self, names: TypeNames, binary: Option<BinaryCodec>) -> &mut Self
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        tracing::trace!("registering {} as {}", type_name::<T>(), names.ros1);
        self.entries.insert(
            TypeId::of::<T>(),
            TypeEntry {
                rust_name: type_name::<T>(),
                names,
                to_json: encode_json_erased::<T>,
                from_json: decode_json_erased::<T>,
                binary,
            },
        );
        self
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `T` can be carried with `version`'s encoding.
    pub fn supports<T: 'static>(&self, version: ProtocolVersion) -> bool {
        match self.entries.get(&TypeId::of::<T>()) {
            Some(entry) => !version.is_binary() || entry.binary.is_some(),
            None => false,
        }
    }

    pub fn names<T: 'static>(&self) -> BridgeResult<&TypeNames> {
        self.entry::<T>().map(|e| &e.names)
    }

    /// Wire type name of `T` under `version`.
    pub fn wire_name<T: 'static>(&self, version: ProtocolVersion) -> BridgeResult<&str> {
        self.entry::<T>().map(|e| e.names.name(version))
    }

    /// Rust type registered under `wire_name` for `version`, if any.
    pub fn rust_name_for(&self, version: ProtocolVersion, wire_name: &str) -> Option<&'static str> {
        self.entries
            .values()
            .find(|e| e.names.name(version) == wire_name)
            .map(|e| e.rust_name)
    }

    /// Encode `msg` as a JSON value, with ROS2 field spellings when asked.
    pub fn encode_value<T: 'static>(&self, version: ProtocolVersion, msg: &T) -> BridgeResult<Value> {
        let entry = self.entry::<T>()?;
        let mut value = (entry.to_json)(msg)?;
        if version == ProtocolVersion::Ros2 {
            text::to_ros2_time_fields(&mut value);
        }
        Ok(value)
    }

    /// Decode a JSON value into `T`. `null` is read as an empty object so
    /// that argument-less service calls decode into empty request types.
    pub fn decode_value<T: 'static>(&self, value: Value) -> BridgeResult<T> {
        let entry = self.entry::<T>()?;
        let value = if value.is_null() {
            Value::Object(Map::new())
        } else {
            value
        };
        downcast((entry.from_json)(value)?)
    }

    pub fn encode_binary<T: 'static>(&self, msg: &T) -> BridgeResult<Vec<u8>> {
        let codec = self.binary_codec::<T>()?;
        (codec.encode)(msg)
    }

    pub fn decode_binary<T: 'static>(&self, bytes: &[u8]) -> BridgeResult<T> {
        let codec = self.binary_codec::<T>()?;
        downcast((codec.decode)(bytes)?)
    }

    fn entry<T: 'static>(&self) -> BridgeResult<&TypeEntry> {
        self.entries
            .get(&TypeId::of::<T>())
            .ok_or_else(|| BridgeError::unsupported(type_name::<T>()))
    }

    fn binary_codec<T: 'static>(&self) -> BridgeResult<BinaryCodec> {
        let entry = self.entry::<T>()?;
        entry
            .binary
            .ok_or_else(|| BridgeError::unsupported(format!("{} (no binary codec)", entry.rust_name)))
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.entries.values().map(|e| e.names.ros1.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

// ---------------------------------------------------------------------------
// Monomorphized codec functions
// ---------------------------------------------------------------------------

fn downcast<T: 'static>(boxed: Box<dyn Any + Send>) -> BridgeResult<T> {
    boxed
        .downcast::<T>()
        .map(|b| *b)
        .map_err(|_| BridgeError::mismatch(type_name::<T>(), "registered codec output"))
}

fn encode_json_erased<T: Serialize + 'static>(msg: &dyn Any) -> BridgeResult<Value> {
    let msg = msg
        .downcast_ref::<T>()
        .ok_or_else(|| BridgeError::mismatch(type_name::<T>(), "encoder input"))?;
    serde_json::to_value(msg).map_err(|e| BridgeError::MalformedPayload(e.to_string()))
}

fn decode_json_erased<T: DeserializeOwned + Send + 'static>(
    value: Value,
) -> BridgeResult<Box<dyn Any + Send>> {
    let msg: T = serde_json::from_value(value).map_err(|e| {
        BridgeError::MalformedPayload(format!("{}: {}", type_name::<T>(), e))
    })?;
    Ok(Box::new(msg))
}

fn encode_binary_erased<T: BinaryEncode + 'static>(msg: &dyn Any) -> BridgeResult<Vec<u8>> {
    let msg = msg
        .downcast_ref::<T>()
        .ok_or_else(|| BridgeError::mismatch(type_name::<T>(), "encoder input"))?;
    Ok(binary::to_bytes(msg))
}

fn decode_binary_erased<T: BinaryDecode + Send + 'static>(
    bytes: &[u8],
) -> BridgeResult<Box<dyn Any + Send>> {
    let msg: T = binary::from_bytes(bytes)?;
    Ok(Box::new(msg))
}
