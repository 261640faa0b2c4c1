//! Test helpers for behavioral specifications.
//!
//! Provides a small harness for assembling clusters of discovery instances
//! over one in-memory ZooKeeper ensemble.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use aviary_engine::{
    Discovery, DiscoveryConfig, DiscoveryDeps, RecordingExchange, RecordingListener,
};
use aviary_zk::MemoryZk;
use std::sync::Arc;
use std::time::Duration;

// Spec polling timeouts
pub const SPEC_POLL_INTERVAL_MS: u64 = 5;
pub const SPEC_WAIT_MAX_MS: u64 = 2_000;

pub use aviary_engine::NoticeKind;

/// One discovery instance plus its recording collaborators.
pub struct TestNode {
    pub discovery: Discovery,
    pub listener: RecordingListener,
    pub exchange: RecordingExchange,
    pub session_id: u64,
}

impl TestNode {
    pub fn id(&self) -> aviary_core::NodeId {
        self.discovery.local_id()
    }
}

/// A cluster of test nodes over one in-memory ensemble.
pub struct TestCluster {
    pub zk: MemoryZk,
}

impl TestCluster {
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        Self { zk: MemoryZk::new() }
    }

    /// Config used by every spec node: cluster `test` under `/aviary`, ack
    /// threshold 1 so progress records land after every event.
    pub fn config() -> DiscoveryConfig {
        let mut config = DiscoveryConfig::new("memory:2181", "test");
        config.ack_threshold = 1;
        config
    }

    pub async fn start_node(&self) -> TestNode {
        self.start_node_with(RecordingExchange::new()).await
    }

    pub async fn start_node_with(&self, exchange: RecordingExchange) -> TestNode {
        let (session, events) = self.zk.connect();
        let session_id = session.id();
        let listener = RecordingListener::new();
        let deps =
            DiscoveryDeps::new(Arc::new(listener.clone()), Arc::new(exchange.clone()));
        let discovery = Discovery::start(session, events, Self::config(), deps)
            .await
            .expect("discovery start");
        TestNode { discovery, listener, exchange, session_id }
    }

    /// Start a node and wait for its local join to complete.
    pub async fn join_node(&self) -> TestNode {
        let node = self.start_node().await;
        node.discovery.join().await.expect("join");
        node
    }

    /// Kill a node's ZooKeeper session.
    pub fn expire(&self, node: &TestNode) {
        self.zk.expire_session(node.session_id);
    }
}

/// Poll until `cond` holds, panicking after the spec timeout.
pub async fn wait_for(label: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(SPEC_WAIT_MAX_MS);
    loop {
        if cond() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for: {label}");
        }
        tokio::time::sleep(Duration::from_millis(SPEC_POLL_INTERVAL_MS)).await;
    }
}

/// Give in-flight dispatch a moment; used before asserting that something
/// did NOT happen.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
