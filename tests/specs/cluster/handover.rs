//! Coordinator handover equivalence specs

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn handover_preserves_log_state_without_duplicate_notices() {
    let cluster = TestCluster::new();
    let a = cluster.join_node().await;
    let b = cluster.join_node().await;
    let c = cluster.join_node().await;
    wait_for("everyone at topology 3", || {
        [&a, &b, &c].iter().all(|n| n.discovery.topology_version() == 3)
    })
    .await;

    b.discovery.send_custom_message(json!("pre-handover")).await.unwrap();
    wait_for("custom delivered everywhere", || {
        [&a, &b, &c].iter().all(|n| n.listener.of_kind(NoticeKind::Custom).len() == 1)
    })
    .await;

    cluster.expire(&a);
    wait_for("B takes over", || b.discovery.is_coordinator()).await;
    wait_for("fail observed", || {
        b.discovery.topology_version() == 4 && c.discovery.topology_version() == 4
    })
    .await;
    settle().await;

    // Taking over replays the same log prefix; nothing is delivered twice.
    for node in [&b, &c] {
        assert_eq!(node.listener.of_kind(NoticeKind::Custom).len(), 1);
        assert_eq!(node.listener.of_kind(NoticeKind::NodeFailed).len(), 1);
    }
    // Survivors agree on the view.
    assert_eq!(b.discovery.remote_nodes().len(), 1);
    assert_eq!(b.discovery.remote_nodes()[0].id, c.id());
    assert_eq!(c.discovery.remote_nodes()[0].id, b.id());

    // Cluster-lifetime counters survive the handover.
    assert_eq!(b.discovery.grid_start_time(), c.discovery.grid_start_time());
    assert!(b.discovery.grid_start_time() > 0);

    // The new coordinator keeps serving: D joins at the next version.
    let d = cluster.join_node().await;
    assert_eq!(d.discovery.topology_version(), 5);
    wait_for("C observes D", || c.discovery.topology_version() == 5).await;
}

#[tokio::test]
async fn new_coordinator_trims_events_acked_during_its_takeover() {
    let cluster = TestCluster::new();
    let a = cluster.join_node().await;
    let b = cluster.join_node().await;
    wait_for("cluster formed", || a.discovery.topology_version() == 2).await;

    cluster.expire(&a);
    wait_for("B takes over", || b.discovery.is_coordinator()).await;
    wait_for("fail observed", || b.discovery.topology_version() == 3).await;

    // A's pending acks died with it; nothing external may linger.
    wait_for("event payloads all reclaimed", || {
        cluster.zk.children("/aviary/test/evts").is_empty()
            && cluster.zk.children("/aviary/test/customEvts").is_empty()
    })
    .await;
}
