// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node identity and the per-member record kept in the cluster view

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable, cluster-wide node identity.
///
/// Assigned once when a discovery instance starts and carried through every
/// znode name and event the node produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Generate a fresh random identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for NodeId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// A joined cluster member.
///
/// Both integers are assigned by the coordinator protocol: `internal_id` is
/// the ZooKeeper sequence of the member's alive node (election order),
/// `order` is the topology version at which the member joined (stable while
/// alive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: NodeId,
    pub internal_id: u64,
    pub order: u64,
}

impl ClusterNode {
    pub fn new(id: NodeId, internal_id: u64, order: u64) -> Self {
        Self { id, internal_id, order }
    }
}

impl std::fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} internal={} order={}", self.id, self.internal_id, self.order)
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
