//! Session-loss segmentation specs

use crate::prelude::*;
use aviary_core::NodeId;
use aviary_engine::DiscoveryError;
use aviary_zk::{CreateMode, ZkSession};

#[tokio::test]
async fn connection_loss_after_join_segments_exactly_once() {
    let cluster = TestCluster::new();
    let a = cluster.join_node().await;
    let b = cluster.join_node().await;
    wait_for("cluster formed", || a.discovery.topology_version() == 2).await;

    cluster.expire(&b);

    wait_for("B segments", || b.listener.of_kind(NoticeKind::Segmented).len() == 1).await;
    let segmented = b.listener.of_kind(NoticeKind::Segmented);
    assert_eq!(segmented[0].topology_version, 2);
    assert_eq!(segmented[0].node.id, b.id());

    // The survivor records the failure; the segmented node hears nothing
    // further.
    wait_for("A emits the fail", || a.discovery.topology_version() == 3).await;
    settle().await;
    assert_eq!(b.listener.len(), 2); // its own join, then the segmentation
}

#[tokio::test]
async fn connection_loss_before_join_fails_the_join_future() {
    let cluster = TestCluster::new();

    // Lay out the tree and park a fake minimum member that will never
    // coordinate, so the real node stays stuck waiting to be admitted.
    let (squatter, _squatter_events) = cluster.zk.connect();
    for path in [
        "/aviary",
        "/aviary/test",
        "/aviary/test/evts",
        "/aviary/test/joinData",
        "/aviary/test/customEvts",
        "/aviary/test/aliveNodes",
    ] {
        squatter.create(path, Vec::new(), CreateMode::Persistent).await.unwrap();
    }
    let squatter_id = NodeId::random();
    squatter
        .create(
            &format!("/aviary/test/aliveNodes/{squatter_id}|0|"),
            br#"{"last_processed_event_id":0}"#.to_vec(),
            CreateMode::EphemeralSequential,
        )
        .await
        .unwrap();

    let b = cluster.start_node().await;
    settle().await;
    cluster.expire(&b);

    let err = b.discovery.join().await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Segmented));
    assert!(b.listener.of_kind(NoticeKind::Segmented).is_empty());
    assert!(b.listener.of_kind(NoticeKind::NodeJoined).is_empty());
}
