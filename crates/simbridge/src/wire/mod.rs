// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire encodings for the bridge protocols.
//!
//! Two encodings are supported, selected by [`ProtocolVersion`]:
//!
//! - **Text** (`Ros1`, `Ros2`): rosbridge JSON envelopes, one per WebSocket
//!   message. See [`text`].
//! - **Binary** (`Cyber`): little-endian length-prefixed frames over TCP.
//!   See [`binary`] and [`frame_codec`].
//!
//! ```text
//! +----------------+---------+---------------------------------+
//! | Length (4B LE) | Op (1B) | Fields (4B LE len + bytes) ...  |
//! +----------------+---------+---------------------------------+
//! ```

pub mod binary;
pub mod cursor;
pub mod frame_codec;
pub mod text;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use binary::{BinaryDecode, BinaryEncode, BinaryFrame, BinaryOp};
pub use cursor::{WireReader, WireWriter};
pub use frame_codec::{FrameCodec, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE};
pub use text::Envelope;

/// Encoding/decoding failures at the byte level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected end of buffer at offset {offset} (need {needed} bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("frame length mismatch: header says {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unknown binary op {0}")]
    UnknownOp(u8),

    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("invalid data: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for WireError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Byte encoding used by a protocol version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Encoding {
    Text,
    Binary,
}

/// Remote protocol flavour, stored on the connection and never auto-detected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ProtocolVersion {
    /// rosbridge v2 protocol in front of ROS1.
    #[default]
    Ros1 = 1,
    /// rosbridge in front of ROS2.
    Ros2 = 2,
    /// Apollo Cyber RT bridge (binary).
    Cyber = 3,
}

impl ProtocolVersion {
    pub fn encoding(self) -> Encoding {
        match self {
            Self::Ros1 | Self::Ros2 => Encoding::Text,
            Self::Cyber => Encoding::Binary,
        }
    }

    pub fn is_binary(self) -> bool {
        self.encoding() == Encoding::Binary
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ros1 => "ros1",
            Self::Ros2 => "ros2",
            Self::Cyber => "cyber",
        };
        write!(f, "{}", s)
    }
}

/// Rejected protocol version number.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("unknown protocol version {0} (expected 1, 2 or 3)")]
pub struct InvalidVersion(pub u8);

impl TryFrom<u8> for ProtocolVersion {
    type Error = InvalidVersion;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::Ros1),
            2 => Ok(Self::Ros2),
            3 => Ok(Self::Cyber),
            other => Err(InvalidVersion(other)),
        }
    }
}

impl std::str::FromStr for ProtocolVersion {
    type Err = String;

    /// Accepts the number or the name: `1`/`ros1`, `2`/`ros2`, `3`/`cyber`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "ros1" | "ros" => Ok(Self::Ros1),
            "2" | "ros2" => Ok(Self::Ros2),
            "3" | "cyber" | "apollo" => Ok(Self::Cyber),
            _ => Err(format!("unknown protocol version: {}", s)),
        }
    }
}

impl From<ProtocolVersion> for u8 {
    fn from(v: ProtocolVersion) -> Self {
        v as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_u8() {
        assert_eq!(ProtocolVersion::try_from(1), Ok(ProtocolVersion::Ros1));
        assert_eq!(ProtocolVersion::try_from(3), Ok(ProtocolVersion::Cyber));
        assert_eq!(ProtocolVersion::try_from(7), Err(InvalidVersion(7)));
    }

    #[test]
    fn test_version_encoding() {
        assert_eq!(ProtocolVersion::Ros2.encoding(), Encoding::Text);
        assert!(ProtocolVersion::Cyber.is_binary());
        assert_eq!(ProtocolVersion::Ros1.to_string(), "ros1");
    }

    #[test]
    fn test_version_from_str() {
        assert_eq!("2".parse(), Ok(ProtocolVersion::Ros2));
        assert_eq!("Cyber".parse(), Ok(ProtocolVersion::Cyber));
        assert!("ros3".parse::<ProtocolVersion>().is_err());
    }
}
