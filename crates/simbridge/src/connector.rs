// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Supervision of one connection over time.
//!
//! A [`Connector`] holds the desired endpoint and a [`ReconnectPolicy`].
//! It is driven by the host through [`Connector::update`] and never
//! schedules work of its own:
//!
//! - desired settings differing from the live endpoint cause a disconnect
//!   and an immediate redial with the new values;
//! - a failed attempt or a dropped session schedules a redial after
//!   `min(initial_delay * multiplier^n, max_delay)`, where `n` counts
//!   consecutive failures since the last successful connect;
//! - after `max_attempts` consecutive failed redials (0 = unlimited) the
//!   connector gives up until `connect()` is called again.

use std::time::Instant;

use crate::config::{BridgeConfig, ConnectorSettings, ReconnectPolicy};
use crate::connection::{Connection, Status};
use crate::serializer::Serializer;
use crate::wire::ProtocolVersion;

#[derive(Debug)]
pub struct Connector {
    settings: ConnectorSettings,
    policy: ReconnectPolicy,
    connection: Connection,
    /// The host asked to be connected.
    wanted: bool,
    /// Consecutive failed redials.
    failures: u32,
    next_attempt: Option<Instant>,
}

impl Connector {
    pub fn new(settings: ConnectorSettings, policy: ReconnectPolicy, connection: Connection) -> Self {
        Self {
            settings,
            policy,
            connection,
            wanted: false,
            failures: 0,
            next_attempt: None,
        }
    }

    /// Network-backed connector built from a configuration.
    pub fn from_config(config: &BridgeConfig, serializer: Serializer) -> Self {
        let connection = Connection::network(serializer, config.connection.clone());
        Self::new(config.connector.clone(), config.reconnect.clone(), connection)
    }

    pub fn settings(&self) -> &ConnectorSettings {
        &self.settings
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Registration and publishing go through the connection.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn status(&self) -> Status {
        self.connection.status()
    }

    pub fn status_label(&self) -> &'static str {
        self.connection.status().label()
    }

    pub fn is_enabled(&self) -> bool {
        self.wanted
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// When the next redial is due, if one is scheduled.
    pub fn next_attempt(&self) -> Option<Instant> {
        self.next_attempt
    }

    pub fn set_settings(&mut self, settings: ConnectorSettings) {
        self.settings = settings;
    }

    pub fn set_address(&mut self, address: impl Into<String>) {
        self.settings.address = address.into();
    }

    pub fn set_port(&mut self, port: u16) {
        self.settings.port = port;
    }

    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.settings.version = version;
    }

    pub fn set_policy(&mut self, policy: ReconnectPolicy) {
        self.policy = policy;
    }

    /// Connect now and keep the connection up according to the policy.
    pub fn connect(&mut self) {
        self.wanted = true;
        self.failures = 0;
        self.next_attempt = None;
        self.dial();
    }

    /// Disconnect and stop redialing.
    pub fn disconnect(&mut self) {
        self.wanted = false;
        self.next_attempt = None;
        self.connection.disconnect();
    }

    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    /// [`update`](Self::update) with an explicit clock.
    pub fn update_at(&mut self, now: Instant) {
        self.connection.update_at(now);
        if !self.wanted {
            return;
        }

        if self.settings_changed() {
            tracing::info!(
                "connector settings changed to {}:{} ({}), reconnecting",
                self.settings.address,
                self.settings.port,
                self.settings.version
            );
            self.connection.disconnect();
            self.failures = 0;
            self.next_attempt = None;
            self.dial();
            return;
        }

        match self.connection.status() {
            Status::Connected => {
                self.failures = 0;
                self.next_attempt = None;
            }
            Status::Disconnected => self.schedule_or_dial(now),
            Status::Connecting | Status::Disconnecting => {}
        }
    }

    fn schedule_or_dial(&mut self, now: Instant) {
        let due = match self.next_attempt {
            Some(due) => due,
            None => {
                if !self.policy.allows(self.failures) {
                    tracing::warn!(
                        "giving up on {}:{} after {} attempts",
                        self.settings.address,
                        self.settings.port,
                        self.failures
                    );
                    self.wanted = false;
                    return;
                }
                let delay = self.policy.delay_for(self.failures);
                tracing::debug!("redial in {:?}", delay);
                let due = now + delay;
                self.next_attempt = Some(due);
                due
            }
        };

        if now >= due {
            self.next_attempt = None;
            self.failures += 1;
            self.dial();
        }
    }

    fn settings_changed(&self) -> bool {
        match self.connection.endpoint() {
            Some(ep) if self.connection.status() != Status::Disconnected => {
                ep.address != self.settings.address
                    || ep.port != self.settings.port
                    || ep.version != self.settings.version
            }
            _ => false,
        }
    }

    fn dial(&mut self) {
        let ConnectorSettings {
            address,
            port,
            version,
        } = self.settings.clone();
        self.connection.connect(&address, port, version);
    }
}
