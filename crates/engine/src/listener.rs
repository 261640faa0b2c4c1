// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovery notifications delivered to the host process

use aviary_core::ClusterNode;
use serde_json::Value;
use std::sync::Arc;

/// Kinds of discovery notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    NodeJoined,
    NodeFailed,
    Custom,
    /// The local ZooKeeper session is gone; no notification follows this one.
    Segmented,
}

/// A single discovery notification.
///
/// Every member observes the same notices in the same order, each carrying
/// the topology version it happened at and the membership snapshot after it.
#[derive(Debug, Clone)]
pub struct DiscoveryNotice {
    pub kind: NoticeKind,
    pub topology_version: u64,
    /// The node the notice is about: the joiner, the failed member, the
    /// custom-message sender, or the local node for segmentation.
    pub node: Arc<ClusterNode>,
    /// Members after the event, ordered by topology order.
    pub snapshot: Vec<Arc<ClusterNode>>,
    /// Present only for [`NoticeKind::Custom`].
    pub message: Option<Value>,
}

/// Sink for discovery notifications.
///
/// Invoked on the dispatch lane: implementations must not block for long and
/// must not call back into the discovery instance.
pub trait DiscoveryListener: Send + Sync + 'static {
    fn on_event(&self, notice: DiscoveryNotice);
}

/// Listener that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl DiscoveryListener for NoopListener {
    fn on_event(&self, _notice: DiscoveryNotice) {}
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{DiscoveryListener, DiscoveryNotice, NoticeKind};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Listener that records every notification for assertions.
    #[derive(Clone, Default)]
    pub struct RecordingListener {
        notices: Arc<Mutex<Vec<DiscoveryNotice>>>,
    }

    impl RecordingListener {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn notices(&self) -> Vec<DiscoveryNotice> {
            self.notices.lock().clone()
        }

        pub fn len(&self) -> usize {
            self.notices.lock().len()
        }

        pub fn is_empty(&self) -> bool {
            self.notices.lock().is_empty()
        }

        /// Notices of one kind, in delivery order.
        pub fn of_kind(&self, kind: NoticeKind) -> Vec<DiscoveryNotice> {
            self.notices.lock().iter().filter(|n| n.kind == kind).cloned().collect()
        }
    }

    impl DiscoveryListener for RecordingListener {
        fn on_event(&self, notice: DiscoveryNotice) {
            self.notices.lock().push(notice);
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::RecordingListener;
