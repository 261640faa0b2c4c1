//! First-member cold start specs

use crate::prelude::*;
use aviary_core::FakeClock;
use aviary_engine::{DiscoveryDeps, RecordingExchange, RecordingListener};
use std::sync::Arc;

#[tokio::test]
async fn first_member_cold_start() {
    let cluster = TestCluster::new();
    let a = cluster.start_node().await;
    a.discovery.join().await.unwrap();

    assert!(a.discovery.is_coordinator());
    assert!(a.discovery.grid_start_time() > 0);
    assert_eq!(a.discovery.topology_version(), 1);

    let joined = a.listener.of_kind(NoticeKind::NodeJoined);
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].topology_version, 1);
    assert_eq!(joined[0].node.id, a.id());
    assert_eq!(joined[0].node.order, 1);
    assert_eq!(joined[0].snapshot.len(), 1);

    let local = a.discovery.local_node().unwrap();
    assert_eq!(local.order, 1);
    assert!(a.discovery.remote_nodes().is_empty());
}

#[tokio::test]
async fn grid_start_time_comes_from_the_clock() {
    let cluster = TestCluster::new();
    let (session, events) = cluster.zk.connect();
    let listener = RecordingListener::new();
    let deps = DiscoveryDeps::new(
        Arc::new(listener.clone()),
        Arc::new(RecordingExchange::new()),
    )
    .with_clock(Arc::new(FakeClock::at(777_000)));

    let discovery =
        aviary_engine::Discovery::start(session, events, TestCluster::config(), deps)
            .await
            .unwrap();
    discovery.join().await.unwrap();

    assert_eq!(discovery.grid_start_time(), 777_000);
}

#[tokio::test]
async fn bootstrap_lays_out_the_full_tree() {
    let cluster = TestCluster::new();
    let _a = cluster.join_node().await;

    for path in [
        "/aviary",
        "/aviary/test",
        "/aviary/test/evts",
        "/aviary/test/joinData",
        "/aviary/test/customEvts",
        "/aviary/test/aliveNodes",
    ] {
        assert!(cluster.zk.node_exists(path), "missing {path}");
    }
    // One membership token: ours.
    assert_eq!(cluster.zk.children("/aviary/test/aliveNodes").len(), 1);
    // The consumed pre-join blob was cleaned up.
    assert!(cluster.zk.children("/aviary/test/joinData").is_empty());
}
