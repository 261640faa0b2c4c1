// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ZooKeeper path layout and znode name codecs.
//!
//! Everything lives under `<base>/<cluster_name>`:
//!
//! ```text
//! /evts                                    data: serialized event log
//! /evts/<event_id>/joinData                join payload for the joining node
//! /evts/<event_id>/joined                  topology snapshot + common data
//! /joinData/<uuid>|<seq>                   ephemeral-sequential pre-join blob
//! /aliveNodes/<uuid>|<joinSeq>|<aliveSeq>  ephemeral-sequential membership token
//! /customEvts/<uuid>|<seq>                 persistent-sequential submission
//! ```
//!
//! Sequential-create prefixes end at the trailing `|` so ZooKeeper appends its
//! ten-digit counter; the decoders below must round-trip every name losslessly.

use crate::node::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("malformed znode name: {0}")]
    BadName(String),
    #[error("bad sequence number in: {0}")]
    BadSeq(String),
    #[error("bad node id in: {0}")]
    BadNodeId(String),
}

/// Absolute path builder rooted at `<base>/<cluster_name>`.
#[derive(Debug, Clone)]
pub struct ZkPaths {
    root: String,
}

impl ZkPaths {
    pub fn new(base_path: &str, cluster_name: &str) -> Self {
        let base = base_path.trim_end_matches('/');
        Self { root: format!("{base}/{cluster_name}") }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// The znode whose data holds the serialized event log.
    pub fn evts(&self) -> String {
        format!("{}/evts", self.root)
    }

    pub fn evt(&self, event_id: u64) -> String {
        format!("{}/evts/{event_id}", self.root)
    }

    pub fn evt_join_data(&self, event_id: u64) -> String {
        format!("{}/evts/{event_id}/joinData", self.root)
    }

    pub fn evt_joined(&self, event_id: u64) -> String {
        format!("{}/evts/{event_id}/joined", self.root)
    }

    pub fn join_data_dir(&self) -> String {
        format!("{}/joinData", self.root)
    }

    /// Sequential-create prefix for a pre-join blob.
    pub fn join_data_prefix(&self, id: NodeId) -> String {
        format!("{}/joinData/{id}|", self.root)
    }

    /// Reconstruct a pre-join blob path from its assigned sequence.
    ///
    /// The sequence is padded back to ZooKeeper's ten-digit suffix width.
    pub fn join_data_node(&self, id: NodeId, join_seq: u64) -> String {
        format!("{}/joinData/{id}|{join_seq:010}", self.root)
    }

    pub fn alive_dir(&self) -> String {
        format!("{}/aliveNodes", self.root)
    }

    /// Sequential-create prefix for a membership token; the assigned sequence
    /// becomes the member's internal id.
    pub fn alive_node_prefix(&self, id: NodeId, join_seq: u64) -> String {
        format!("{}/aliveNodes/{id}|{join_seq}|", self.root)
    }

    pub fn alive_node(&self, name: &str) -> String {
        format!("{}/aliveNodes/{name}", self.root)
    }

    pub fn custom_dir(&self) -> String {
        format!("{}/customEvts", self.root)
    }

    /// Sequential-create prefix for a custom-event submission.
    pub fn custom_prefix(&self, id: NodeId) -> String {
        format!("{}/customEvts/{id}|", self.root)
    }

    pub fn custom_node(&self, name: &str) -> String {
        format!("{}/customEvts/{name}", self.root)
    }

    /// Every persistent directory the cluster needs, ancestors first.
    ///
    /// The alive-nodes directory comes last: its existence marks a completed
    /// bootstrap, so it must only appear once everything else does.
    pub fn bootstrap_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        let mut prefix = String::new();
        for segment in self.root.split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);
            paths.push(prefix.clone());
        }
        paths.push(self.evts());
        paths.push(self.join_data_dir());
        paths.push(self.custom_dir());
        paths.push(self.alive_dir());
        paths
    }
}

/// Decoded `<uuid>|<joinSeq>|<aliveSeq>` membership token name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliveName {
    pub node_id: NodeId,
    pub join_seq: u64,
    pub internal_id: u64,
    /// The raw child name, kept for path reconstruction.
    pub name: String,
}

impl AliveName {
    pub fn parse(name: &str) -> Result<Self, PathError> {
        let mut parts = name.split('|');
        let (Some(id), Some(join_seq), Some(alive_seq), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(PathError::BadName(name.to_string()));
        };
        Ok(Self {
            node_id: parse_node_id(id, name)?,
            join_seq: parse_seq(join_seq, name)?,
            internal_id: parse_seq(alive_seq, name)?,
            name: name.to_string(),
        })
    }
}

/// Decoded `<uuid>|<seq>` submission (or pre-join blob) name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionName {
    pub node_id: NodeId,
    pub seq: u64,
    pub name: String,
}

impl SubmissionName {
    pub fn parse(name: &str) -> Result<Self, PathError> {
        let mut parts = name.split('|');
        let (Some(id), Some(seq), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(PathError::BadName(name.to_string()));
        };
        Ok(Self {
            node_id: parse_node_id(id, name)?,
            seq: parse_seq(seq, name)?,
            name: name.to_string(),
        })
    }
}

/// Extract the sequence ZooKeeper appended to a sequential create.
pub fn parse_created_seq(created_path: &str) -> Result<u64, PathError> {
    let Some((_, seq)) = created_path.rsplit_once('|') else {
        return Err(PathError::BadName(created_path.to_string()));
    };
    parse_seq(seq, created_path)
}

fn parse_seq(digits: &str, name: &str) -> Result<u64, PathError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PathError::BadSeq(name.to_string()));
    }
    digits.parse().map_err(|_| PathError::BadSeq(name.to_string()))
}

fn parse_node_id(id: &str, name: &str) -> Result<NodeId, PathError> {
    id.parse().map_err(|_| PathError::BadNodeId(name.to_string()))
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
