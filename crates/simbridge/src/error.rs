// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the bridge layer.
//!
//! Nothing here is meant to reach the host application as an unhandled
//! failure: transport errors resolve into [`Status`](crate::Status) changes,
//! payload errors drop a single frame, and service errors become error
//! responses on the wire. Only per-call failures (an unregistered type, a
//! mismatched reader) are returned to the caller.

use thiserror::Error;

/// Result alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced by the bridge layer.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("unsupported message type: {type_name}")]
    UnsupportedType { type_name: String },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("service '{service}' failed: {message}")]
    ServiceFailed { service: String, message: String },

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl BridgeError {
    pub(crate) fn unsupported(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Short machine-readable code, used in service error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::UnsupportedType { .. } => "UNSUPPORTED_TYPE",
            Self::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::ServiceNotFound(_) => "SERVICE_NOT_FOUND",
            Self::ServiceFailed { .. } => "SERVICE_FAILED",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<crate::wire::WireError> for BridgeError {
    fn from(e: crate::wire::WireError) -> Self {
        Self::MalformedPayload(e.to_string())
    }
}

/// Socket-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {reason}")]
    ConnectFailed { endpoint: String, reason: String },

    #[error("connect to {endpoint} timed out")]
    ConnectTimeout { endpoint: String },

    #[error("transport is not open")]
    NotOpen,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("I/O thread error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::unsupported("Foo");
        assert_eq!(err.to_string(), "unsupported message type: Foo");

        let err = BridgeError::mismatch("std_msgs/Bool", "std_msgs/Int32");
        assert!(err.to_string().contains("expected std_msgs/Bool"));

        let err = BridgeError::from(TransportError::NotOpen);
        assert!(err.to_string().contains("not open"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            BridgeError::ServiceNotFound("/x".into()).code(),
            "SERVICE_NOT_FOUND"
        );
        assert_eq!(
            BridgeError::MalformedPayload("bad".into()).code(),
            "MALFORMED_PAYLOAD"
        );
    }
}
