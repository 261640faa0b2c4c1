// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The ordered discovery event log and its per-event ack tracking.
//!
//! The log is the cluster's single source of truth: the coordinator mutates
//! it, serializes it to the events znode, and every member replays it in
//! event-id order. Ack sets and in-memory payload copies are coordinator-local
//! bookkeeping and are deliberately excluded from serialization; a coordinator
//! taking over rebuilds them against the live topology.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Payload of a single discovery event.
///
/// Serializes with `{"type": "node:joined", ...fields}` format. Payload blobs
/// (`joining_data`, `message`) exist only in the emitting coordinator's
/// memory; other members fetch them from their dedicated znodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "node:joined")]
    Join {
        node_id: NodeId,
        internal_id: u64,
        #[serde(skip)]
        joining_data: Option<Value>,
    },

    #[serde(rename = "node:failed")]
    Fail { internal_id: u64 },

    #[serde(rename = "custom")]
    Custom {
        sender: NodeId,
        /// Child name of the originating submission under the custom-events
        /// directory; members fetch the payload from it.
        source_path: String,
        #[serde(skip)]
        message: Option<Value>,
    },
}

/// One entry of the discovery event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    pub id: u64,
    pub topology_version: u64,
    pub kind: EventKind,
    /// Internal ids that still have to confirm delivery before the event's
    /// external payload may be deleted. Coordinator-local.
    #[serde(skip)]
    pending_acks: BTreeSet<u64>,
}

impl DiscoveryEvent {
    /// Reset the ack set to the given internal ids.
    pub fn reset_acks(&mut self, internal_ids: impl IntoIterator<Item = u64>) {
        self.pending_acks = internal_ids.into_iter().collect();
    }

    /// Apply an ack from `internal_id` reporting `last_processed` progress.
    ///
    /// The member is removed from the ack set iff it has processed this event.
    /// Returns true iff the set just became empty.
    pub fn ack(&mut self, internal_id: u64, last_processed: u64) -> bool {
        if last_processed < self.id {
            return false;
        }
        self.pending_acks.remove(&internal_id) && self.pending_acks.is_empty()
    }

    /// Drop a failed member from the ack set; it will never ack.
    ///
    /// Returns true iff the set just became empty.
    pub fn drop_failed(&mut self, internal_id: u64) -> bool {
        self.pending_acks.remove(&internal_id) && self.pending_acks.is_empty()
    }

    pub fn acks_done(&self) -> bool {
        self.pending_acks.is_empty()
    }

    pub fn pending_acks(&self) -> &BTreeSet<u64> {
        &self.pending_acks
    }
}

/// The ordered event log plus the cluster-wide counters it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    /// Bumped on join and on fail; never on custom.
    pub topology_version: u64,
    /// Next event id to assign; bumped on every event.
    pub next_event_id: u64,
    /// High-water mark of custom submission sequences already consumed.
    pub processed_custom_seq: u64,
    /// Epoch millis fixed at the first coordinator election.
    pub grid_start_time: u64,
    pub events: BTreeMap<u64, DiscoveryEvent>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            topology_version: 0,
            next_event_id: 1,
            processed_custom_seq: 0,
            grid_start_time: 0,
            events: BTreeMap::new(),
        }
    }

    fn push(&mut self, topology_version: u64, kind: EventKind) -> &mut DiscoveryEvent {
        let id = self.next_event_id;
        self.next_event_id += 1;
        let event = DiscoveryEvent {
            id,
            topology_version,
            kind,
            pending_acks: BTreeSet::new(),
        };
        self.events.insert(id, event);
        // Entry was just inserted.
        match self.events.get_mut(&id) {
            Some(e) => e,
            None => unreachable!("event {id} vanished after insert"),
        }
    }

    /// Emit a join: bumps the topology version, which becomes the joiner's
    /// topology order.
    pub fn emit_join(
        &mut self,
        node_id: NodeId,
        internal_id: u64,
        joining_data: Option<Value>,
    ) -> &mut DiscoveryEvent {
        self.topology_version += 1;
        let tv = self.topology_version;
        self.push(tv, EventKind::Join { node_id, internal_id, joining_data })
    }

    /// Emit a fail: bumps the topology version.
    pub fn emit_fail(&mut self, internal_id: u64) -> &mut DiscoveryEvent {
        self.topology_version += 1;
        let tv = self.topology_version;
        self.push(tv, EventKind::Fail { internal_id })
    }

    /// Emit a custom event: the topology version is left untouched.
    pub fn emit_custom(
        &mut self,
        sender: NodeId,
        source_path: String,
        message: Option<Value>,
    ) -> &mut DiscoveryEvent {
        let tv = self.topology_version;
        self.push(tv, EventKind::Custom { sender, source_path, message })
    }

    pub fn get(&self, id: u64) -> Option<&DiscoveryEvent> {
        self.events.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut DiscoveryEvent> {
        self.events.get_mut(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<DiscoveryEvent> {
        self.events.remove(&id)
    }

    /// Events with id strictly greater than `id`, ascending.
    pub fn events_after(&self, id: u64) -> impl Iterator<Item = &DiscoveryEvent> {
        self.events.range(id + 1..).map(|(_, e)| e)
    }

    /// Ids of all retained events, ascending.
    pub fn event_ids(&self) -> Vec<u64> {
        self.events.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
