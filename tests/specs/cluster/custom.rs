//! Custom-event broadcast specs

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn custom_broadcast_reaches_every_member() {
    let cluster = TestCluster::new();
    let a = cluster.join_node().await;
    let b = cluster.join_node().await;
    let c = cluster.join_node().await;
    wait_for("everyone at topology 3", || {
        [&a, &b, &c].iter().all(|n| n.discovery.topology_version() == 3)
    })
    .await;

    let message = json!({"op": "rebalance", "round": 1});
    b.discovery.send_custom_message(message.clone()).await.unwrap();

    for node in [&a, &b, &c] {
        wait_for("custom notice delivered", || {
            node.listener.of_kind(NoticeKind::Custom).len() == 1
        })
        .await;
        let notice = &node.listener.of_kind(NoticeKind::Custom)[0];
        assert_eq!(notice.message, Some(message.clone()));
        assert_eq!(notice.node.id, b.id());
        // Custom events leave the topology version alone.
        assert_eq!(notice.topology_version, 3);
        assert_eq!(notice.snapshot.len(), 3);
    }
    assert_eq!(a.discovery.topology_version(), 3);

    // Once all three acks land, the submission znode disappears.
    wait_for("submission cleaned up", || {
        cluster.zk.children("/aviary/test/customEvts").is_empty()
    })
    .await;
}

#[tokio::test]
async fn custom_messages_are_delivered_in_submission_order() {
    let cluster = TestCluster::new();
    let a = cluster.join_node().await;
    let b = cluster.join_node().await;
    wait_for("cluster formed", || a.discovery.topology_version() == 2).await;

    for i in 0..3 {
        b.discovery.send_custom_message(json!(i)).await.unwrap();
    }

    for node in [&a, &b] {
        wait_for("all three delivered", || {
            node.listener.of_kind(NoticeKind::Custom).len() == 3
        })
        .await;
        let payloads: Vec<_> = node
            .listener
            .of_kind(NoticeKind::Custom)
            .iter()
            .map(|n| n.message.clone().unwrap())
            .collect();
        assert_eq!(payloads, vec![json!(0), json!(1), json!(2)]);
    }
}
