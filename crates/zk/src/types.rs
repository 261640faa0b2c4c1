// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level types shared by the facade and its implementations

use thiserror::Error;

/// Disposition of a created znode, mirroring the ZooKeeper create modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    PersistentSequential,
    Ephemeral,
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_sequential(&self) -> bool {
        matches!(self, Self::PersistentSequential | Self::EphemeralSequential)
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral | Self::EphemeralSequential)
    }
}

/// The slice of the znode stat the engine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Data version, bumped on every set.
    pub version: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    DataChanged,
    ChildrenChanged,
    Created,
    Deleted,
}

/// A fired one-shot watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub path: String,
    pub kind: WatchKind,
}

/// Messages delivered on a session's event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Watch(WatchedEvent),
    /// The session is gone. Delivered at most once; no watch fires after it.
    ConnectionLost,
}

#[derive(Debug, Error)]
pub enum ZkError {
    #[error("no node: {0}")]
    NoNode(String),
    #[error("node already exists: {0}")]
    NodeExists(String),
    #[error("bad version for: {0}")]
    BadVersion(String),
    #[error("node has children: {0}")]
    NotEmpty(String),
    /// Transient: the operation may be retried on the same session.
    #[error("connection lost")]
    ConnectionLoss,
    /// Terminal: the session is dead and every ephemeral it owned is gone.
    #[error("session expired")]
    SessionExpired,
    /// Terminal: the client latched failed after session expiry.
    #[error("zookeeper client failed")]
    ClientFailed,
    #[error("{0}")]
    Protocol(String),
}

impl ZkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionLoss)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::ClientFailed)
    }
}
