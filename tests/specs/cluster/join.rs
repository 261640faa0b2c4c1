//! Second-member join specs

use crate::prelude::*;
use aviary_engine::RecordingExchange;
use serde_json::json;

#[tokio::test]
async fn second_member_joins_existing_coordinator() {
    let cluster = TestCluster::new();
    let a = cluster.join_node().await;
    let b = cluster.join_node().await;

    assert_eq!(b.discovery.topology_version(), 2);
    wait_for("A observes B's join", || a.discovery.topology_version() == 2).await;

    // B's local join notice carries the two-member snapshot, ordered by
    // topology order.
    let b_joined = b.listener.of_kind(NoticeKind::NodeJoined);
    assert_eq!(b_joined.len(), 1);
    assert_eq!(b_joined[0].topology_version, 2);
    assert_eq!(b_joined[0].node.id, b.id());
    let ids: Vec<_> = b_joined[0].snapshot.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![a.id(), b.id()]);

    // A saw its own join, then B's.
    wait_for("A's listener sees both joins", || {
        a.listener.of_kind(NoticeKind::NodeJoined).len() == 2
    })
    .await;
    let a_joined = a.listener.of_kind(NoticeKind::NodeJoined);
    assert_eq!(a_joined[1].node.id, b.id());
    assert_eq!(a_joined[1].topology_version, 2);
    assert_eq!(a_joined[1].snapshot.len(), 2);

    assert!(a.discovery.is_coordinator());
    assert!(!b.discovery.is_coordinator());
    assert_eq!(a.discovery.remote_nodes().len(), 1);
    assert_eq!(b.discovery.remote_nodes()[0].id, a.id());
    assert!(b.discovery.known_node(&a.id()).await.unwrap());
    assert!(b.discovery.ping_node(&a.id()));
    assert_eq!(b.discovery.grid_start_time(), a.discovery.grid_start_time());
}

#[tokio::test]
async fn join_data_is_exchanged_both_ways() {
    let cluster = TestCluster::new();
    let a = cluster
        .start_node_with(RecordingExchange::new().with_common(json!({"caches": ["c1"]})))
        .await;
    a.discovery.join().await.unwrap();

    let b = cluster
        .start_node_with(RecordingExchange::new().with_joining(json!({"addr": "10.0.0.2"})))
        .await;
    b.discovery.join().await.unwrap();

    // The cluster consumed B's joining payload.
    wait_for("A received B's joining data", || {
        a.exchange.received().iter().any(|bag| bag.joining == Some(json!({"addr": "10.0.0.2"})))
    })
    .await;
    let received = a.exchange.received();
    let from_b = received.iter().find(|bag| bag.joining.is_some()).unwrap();
    assert_eq!(from_b.node_id, b.id());

    // B consumed the cluster's common payload.
    let common = b
        .exchange
        .received()
        .into_iter()
        .find(|bag| bag.common.is_some())
        .expect("common data bag");
    assert_eq!(common.common, Some(json!({"caches": ["c1"]})));
    assert_eq!(common.node_id, b.id());
}

#[tokio::test]
async fn fully_acked_join_payloads_are_cleaned_up() {
    let cluster = TestCluster::new();
    let _a = cluster.join_node().await;
    let _b = cluster.join_node().await;

    // Ack threshold is 1: B reports right after its join replay, the
    // coordinator trims the event and deletes its payload znodes.
    wait_for("join payloads removed", || {
        cluster.zk.children("/aviary/test/evts").is_empty()
    })
    .await;
    assert!(cluster.zk.children("/aviary/test/joinData").is_empty());
}
