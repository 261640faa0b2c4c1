//! Dead-joiner specs

use crate::prelude::*;
use aviary_core::NodeId;
use aviary_zk::{CreateMode, ZkSession};

const EMPTY_RECORD: &[u8] = br#"{"last_processed_event_id":0}"#;

#[tokio::test]
async fn joiner_whose_join_data_vanished_is_skipped() {
    let cluster = TestCluster::new();
    let a = cluster.join_node().await;

    // A membership token with no pre-join blob behind it: the joiner died
    // after registering but before its data could be read.
    let (ghost, _ghost_events) = cluster.zk.connect();
    let ghost_id = NodeId::random();
    ghost
        .create(
            &format!("/aviary/test/aliveNodes/{ghost_id}|7|"),
            EMPTY_RECORD.to_vec(),
            CreateMode::EphemeralSequential,
        )
        .await
        .unwrap();

    // A real member joining afterwards is processed normally; the ghost never
    // produces a join.
    let b = cluster.join_node().await;
    assert_eq!(b.discovery.topology_version(), 2);
    settle().await;

    assert_eq!(a.discovery.topology_version(), 2);
    assert!(a
        .listener
        .of_kind(NoticeKind::NodeJoined)
        .iter()
        .all(|n| n.node.id != ghost_id));
    assert!(a.discovery.node(&ghost_id).is_none());

    // Once the ghost's session lapses nothing more happens: it was never a
    // member, so no fail event is due.
    cluster.zk.expire_session(ghost.id());
    settle().await;
    assert_eq!(a.discovery.topology_version(), 2);
    assert!(a.listener.of_kind(NoticeKind::NodeFailed).is_empty());
}

#[tokio::test]
async fn member_failing_after_its_join_gets_a_fail_event() {
    let cluster = TestCluster::new();
    let a = cluster.join_node().await;
    let b = cluster.join_node().await;
    wait_for("B admitted", || a.discovery.topology_version() == 2).await;

    cluster.expire(&b);

    wait_for("fail follows the join", || a.discovery.topology_version() == 3).await;
    let failed = a.listener.of_kind(NoticeKind::NodeFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].node.id, b.id());
    assert_eq!(failed[0].topology_version, 3);
}
