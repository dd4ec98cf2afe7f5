// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulator messaging bridge
//!
//! Client side of a duplex publish/subscribe/service link between a
//! simulator and external robotics middleware.
//!
//! # Features
//!
//! - **rosbridge**: JSON envelopes over WebSocket, ROS1 and ROS2 flavours
//! - **Cyber bridge**: little-endian length-prefixed binary frames over TCP
//! - **Typed topics**: readers and publishers bound to registered Rust types
//! - **Services**: request/response handlers with error responses
//! - **Supervision**: reconnect with exponential backoff
//!
//! # Quick Start
//!
//! ```ignore
//! use simbridge::message::geometry_msgs::Pose;
//! use simbridge::{BridgeConfig, Connector, Serializer};
//!
//! let config = BridgeConfig::default();
//! let mut connector = Connector::from_config(&config, Serializer::default());
//!
//! let pose_writer = connector.connection_mut().add_writer::<Pose>("/pose")?;
//! connector
//!     .connection_mut()
//!     .add_reader::<Pose, _>("/goal", |goal| println!("goal: {:?}", goal))?;
//! connector.connect();
//!
//! loop {
//!     connector.update(); // once per simulation tick
//!     pose_writer.publish(&Pose::default())?;
//! }
//! ```
//!
//! # Threading
//!
//! Sockets run on a background I/O thread per connection attempt. Every
//! callback runs on the thread calling `update()`. [`Publisher`] handles
//! are `Send + Sync` and may publish from any thread.
//!
//! # Configuration File
//!
//! ```toml
//! [connector]
//! address = "localhost"
//! port = 9090
//! version = 1        # 1 = ROS1, 2 = ROS2, 3 = Cyber
//!
//! [reconnect]
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! ```

pub mod config;
pub mod connection;
pub mod connector;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod publisher;
pub mod serializer;
pub mod topic;
pub mod transport;
pub mod wire;

pub use config::{
    BridgeConfig, ConfigError, ConnectionConfig, ConnectorSettings, ReconnectPolicy,
};
pub use connection::{Connection, Status};
pub use connector::Connector;
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{BridgeError, BridgeResult, TransportError};
pub use message::{RawMessage, Time, TypeNames, TypeRegistry};
pub use publisher::{Completion, Publisher};
pub use serializer::{CallId, Inbound, Serializer, SetupFrame};
pub use topic::{Direction, Topic, TopicInfo};
pub use transport::{
    Endpoint, MemoryRemote, MemoryTransport, NetworkTransport, OpenMode, Transport, TransportEvent,
};
pub use wire::ProtocolVersion;
