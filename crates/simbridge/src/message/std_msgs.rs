// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `std_msgs` message types.

use serde::{Deserialize, Serialize};

use super::Time;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bool {
    pub data: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Int32 {
    pub data: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Float64 {
    pub data: f64,
}

/// `std_msgs/String`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct String {
    pub data: std::string::String,
}

impl From<&str> for String {
    fn from(s: &str) -> Self {
        Self { data: s.to_owned() }
    }
}

/// Stamp and coordinate frame.
///
/// The ROS1 `seq` field is not carried; rosbridge fills it in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Time,
    #[serde(default)]
    pub frame_id: std::string::String,
}

crate::binary_struct!(Bool { data });
crate::binary_struct!(Int32 { data });
crate::binary_struct!(Float64 { data });
crate::binary_struct!(String { data });
crate::binary_struct!(Header { stamp, frame_id });
