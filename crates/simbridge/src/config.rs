// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge configuration.
//!
//! Supports both programmatic and file-based configuration:
//!
//! ```toml
//! [connector]
//! address = "localhost"
//! port = 9090
//! version = 1
//!
//! [reconnect]
//! enabled = true
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! multiplier = 2.0
//! max_attempts = 0      # 0 = unlimited
//!
//! [connection]
//! connect_timeout_ms = 5000
//! max_frame_size = 16777216
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::wire::{ProtocolVersion, DEFAULT_MAX_FRAME_SIZE};

/// Environment variable overriding the bridge host address.
pub const HOST_ENV_VAR: &str = "ROS_BRIDGE_HOST";

/// Default rosbridge port.
pub const DEFAULT_PORT: u16 = 9090;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub connector: ConnectorSettings,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Desired remote endpoint. This is what a host persists for a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorSettings {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub version: ProtocolVersion,
}

/// When and how often a connector redials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Consecutive failed attempts before giving up (0 = unlimited).
    #[serde(default)]
    pub max_attempts: u32,
}

/// Per-connection tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Largest accepted binary frame body.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_address() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: DEFAULT_PORT,
            version: ProtocolVersion::default(),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: 0,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to a TOML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connector.validate()?;
        self.reconnect.validate()?;
        self.connection.validate()
    }

    /// Apply `ROS_BRIDGE_HOST` if set.
    pub fn apply_env_overrides(&mut self) {
        self.connector
            .apply_host_override(std::env::var(HOST_ENV_VAR).ok());
    }
}

impl ConnectorSettings {
    pub fn new(address: impl Into<String>, port: u16, version: ProtocolVersion) -> Self {
        Self {
            address: address.into(),
            port,
            version,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::Invalid("Connector address is empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("Connector port must be non-zero".into()));
        }
        Ok(())
    }

    /// Replace the address with `host` when it is present and non-empty.
    pub fn apply_host_override(&mut self, host: Option<String>) {
        if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
            tracing::info!("bridge address overridden by {}: {}", HOST_ENV_VAR, host);
            self.address = host;
        }
    }
}

impl ReconnectPolicy {
    /// Never redial.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "Reconnect multiplier must be >= 1.0 (got {})",
                self.multiplier
            )));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "Reconnect max_delay_ms ({}) is below initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (0-based):
    /// `min(initial * multiplier^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `failed` consecutive failures.
    pub fn allows(&self, failed: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || failed < self.max_attempts)
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_ms must be non-zero".into(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::Invalid("max_frame_size must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.connector.address, "localhost");
        assert_eq!(config.connector.port, 9090);
        assert_eq!(config.connector.version, ProtocolVersion::Ros1);
        assert_eq!(config.connection.connect_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [connector]
            address = "10.0.0.5"
            version = 3

            [reconnect]
            max_attempts = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.connector.address, "10.0.0.5");
        assert_eq!(config.connector.port, 9090);
        assert_eq!(config.connector.version, ProtocolVersion::Cyber);
        assert_eq!(config.reconnect.max_attempts, 4);
        assert_eq!(config.reconnect.initial_delay_ms, 1000);
    }

    #[test]
    fn test_bad_version_rejected() {
        let err = toml::from_str::<BridgeConfig>("[connector]\nversion = 9\n").unwrap_err();
        assert!(err.to_string().contains("unknown protocol version"));
    }

    #[test]
    fn test_validation() {
        let mut config = BridgeConfig::default();
        config.connector.port = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.reconnect.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.reconnect.max_delay_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff() {
        let policy = ReconnectPolicy {
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            multiplier: 2.0,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_attempt_limit() {
        let policy = ReconnectPolicy {
            max_attempts: 2,
            ..ReconnectPolicy::default()
        };
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
        assert!(ReconnectPolicy::default().allows(1_000));
        assert!(!ReconnectPolicy::disabled().allows(0));
    }

    #[test]
    fn test_host_override() {
        let mut settings = ConnectorSettings::default();
        settings.apply_host_override(None);
        assert_eq!(settings.address, "localhost");
        settings.apply_host_override(Some("  ".into()));
        assert_eq!(settings.address, "localhost");
        settings.apply_host_override(Some("192.168.1.20".into()));
        assert_eq!(settings.address, "192.168.1.20");
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");

        let mut config = BridgeConfig::default();
        config.connector = ConnectorSettings::new("sim-host", 9091, ProtocolVersion::Ros2);
        config.to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("version = 2"));

        let loaded = BridgeConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[connection]\nconnect_timeout_ms = 0\n").unwrap();
        assert!(matches!(
            BridgeConfig::from_file(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
