// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Join-time data exchange between a joiner and the cluster

use aviary_core::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Data exchanged at join time, keyed by the subject node.
///
/// `joining` travels joiner -> cluster; `common` travels cluster -> joiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBag {
    pub node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joining: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common: Option<Value>,
}

impl DataBag {
    pub fn new(node_id: NodeId) -> Self {
        Self { node_id, joining: None, common: None }
    }
}

/// Host collaborator supplying and consuming join-time payloads.
pub trait DataExchange: Send + Sync + 'static {
    /// Fill `bag` with this node's joining and common payloads.
    fn collect(&self, bag: &mut DataBag);

    /// Consume a foreign node's bag.
    fn on_exchange(&self, bag: DataBag);
}

/// Exchange that carries no data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExchange;

impl DataExchange for NoopExchange {
    fn collect(&self, _bag: &mut DataBag) {}

    fn on_exchange(&self, _bag: DataBag) {}
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{DataBag, DataExchange};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::sync::Arc;

    /// Exchange with configurable payloads that records what it receives.
    #[derive(Clone, Default)]
    pub struct RecordingExchange {
        joining: Option<Value>,
        common: Option<Value>,
        received: Arc<Mutex<Vec<DataBag>>>,
    }

    impl RecordingExchange {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_joining(mut self, value: Value) -> Self {
            self.joining = Some(value);
            self
        }

        pub fn with_common(mut self, value: Value) -> Self {
            self.common = Some(value);
            self
        }

        /// Bags handed to `on_exchange`, in arrival order.
        pub fn received(&self) -> Vec<DataBag> {
            self.received.lock().clone()
        }
    }

    impl DataExchange for RecordingExchange {
        fn collect(&self, bag: &mut DataBag) {
            bag.joining = self.joining.clone();
            bag.common = self.common.clone();
        }

        fn on_exchange(&self, bag: DataBag) {
            self.received.lock().push(bag);
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::RecordingExchange;
