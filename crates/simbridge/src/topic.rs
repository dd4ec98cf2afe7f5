// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Active topics of one connection, with traffic statistics.

use std::any::TypeId;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{BridgeError, BridgeResult};
use crate::message::TypeNames;
use crate::wire::ProtocolVersion;

/// Minimum window between two frequency estimates.
pub const STATS_WINDOW: Duration = Duration::from_secs(1);

/// Which side of a topic this connection is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Subscribe,
    Publish,
    Service,
}

/// A named, typed channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Topic {
    pub name: String,
    pub types: TypeNames,
}

/// Diagnostics snapshot of one topic.
#[derive(Clone, Debug, PartialEq)]
pub struct TopicInfo {
    pub name: String,
    pub type_name: String,
    pub count: u64,
    /// Messages per second over the last completed window.
    pub frequency: f32,
}

/// Rust-side identity of a registration's message type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TypeKey {
    /// `None` for raw (undecoded) registrations.
    pub id: Option<TypeId>,
    pub name: &'static str,
}

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: Some(TypeId::of::<T>()),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn raw() -> Self {
        Self {
            id: None,
            name: "raw message",
        }
    }
}

#[derive(Debug)]
struct TopicState {
    topic: Topic,
    key: TypeKey,
    count: u64,
    window_start: Instant,
    window_count: u64,
    frequency: f32,
}

/// Registrations keyed by `(name, direction)`.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: HashMap<(String, Direction), TopicState>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a registration. Returns `true` when `(name, direction)` was
    /// not registered before. A second registration must carry the same
    /// Rust type.
    pub(crate) fn register(
        &mut self,
        direction: Direction,
        topic: Topic,
        key: TypeKey,
    ) -> BridgeResult<bool> {
        match self.topics.entry((topic.name.clone(), direction)) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.key != key {
                    return Err(BridgeError::mismatch(existing.key.name, key.name));
                }
                Ok(false)
            }
            Entry::Vacant(slot) => {
                slot.insert(TopicState {
                    topic,
                    key,
                    count: 0,
                    window_start: Instant::now(),
                    window_count: 0,
                    frequency: 0.0,
                });
                Ok(true)
            }
        }
    }

    /// Record a registration that supersedes any earlier one for
    /// `(name, direction)`, whatever its type. Traffic counters survive.
    /// Returns `true` when the entry is new.
    pub(crate) fn replace(&mut self, direction: Direction, topic: Topic, key: TypeKey) -> bool {
        match self.topics.entry((topic.name.clone(), direction)) {
            Entry::Occupied(mut existing) => {
                let state = existing.get_mut();
                state.topic = topic;
                state.key = key;
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(TopicState {
                    topic,
                    key,
                    count: 0,
                    window_start: Instant::now(),
                    window_count: 0,
                    frequency: 0.0,
                });
                true
            }
        }
    }

    /// Count one message on a registered topic. Unknown topics are ignored.
    pub fn record(&mut self, name: &str, direction: Direction) {
        if let Some(state) = self.topics.get_mut(&(name.to_string(), direction)) {
            state.count += 1;
        }
    }

    /// Close every window that is at least [`STATS_WINDOW`] old and update
    /// its frequency estimate.
    pub fn refresh(&mut self, now: Instant) {
        for state in self.topics.values_mut() {
            let elapsed = now.saturating_duration_since(state.window_start);
            if elapsed < STATS_WINDOW {
                continue;
            }
            let delta = state.count - state.window_count;
            state.frequency = (delta as f64 / elapsed.as_secs_f64()) as f32;
            state.window_start = now;
            state.window_count = state.count;
        }
    }

    pub fn topic(&self, name: &str, direction: Direction) -> Option<&Topic> {
        self.topics
            .get(&(name.to_string(), direction))
            .map(|s| &s.topic)
    }

    pub fn count(&self, name: &str, direction: Direction) -> Option<u64> {
        self.topics
            .get(&(name.to_string(), direction))
            .map(|s| s.count)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Snapshot of one direction, sorted by name, with type names for
    /// `version`.
    pub fn list(&self, direction: Direction, version: ProtocolVersion) -> Vec<TopicInfo> {
        let mut out: Vec<TopicInfo> = self
            .topics
            .iter()
            .filter(|((_, d), _)| *d == direction)
            .map(|(_, s)| TopicInfo {
                name: s.topic.name.clone(),
                type_name: s.topic.types.name(version).to_string(),
                count: s.count,
                frequency: s.frequency,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}
