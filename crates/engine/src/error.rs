// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use aviary_core::{CodecError, PathError};
use aviary_zk::ZkError;
use thiserror::Error;

/// Errors surfaced by the discovery engine.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("zookeeper error: {0}")]
    Zk(#[from] ZkError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("malformed znode name: {0}")]
    Path(#[from] PathError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The ZooKeeper session is gone. Terminal: the host must start a fresh
    /// discovery instance to rejoin.
    #[error("local node segmented from the cluster")]
    Segmented,

    #[error("discovery instance stopped")]
    Stopped,

    /// Invariant violation; treated as fatal.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DiscoveryError {
    /// True for session-loss conditions that end in segmentation rather than
    /// a programming-error abort.
    pub(crate) fn is_segmentation(&self) -> bool {
        matches!(self, Self::Segmented) || matches!(self, Self::Zk(e) if e.is_terminal())
    }
}
