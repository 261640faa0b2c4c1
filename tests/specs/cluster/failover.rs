//! Coordinator failure and election specs

use crate::prelude::*;

#[tokio::test]
async fn coordinator_failure_promotes_the_successor() {
    let cluster = TestCluster::new();
    let a = cluster.join_node().await;
    let b = cluster.join_node().await;
    let c = cluster.join_node().await;
    wait_for("everyone at topology 3", || {
        [&a, &b, &c].iter().all(|n| n.discovery.topology_version() == 3)
    })
    .await;
    assert!(a.discovery.is_coordinator());

    cluster.expire(&a);

    wait_for("B takes over", || b.discovery.is_coordinator()).await;
    wait_for("fail observed everywhere", || {
        b.discovery.topology_version() == 4 && c.discovery.topology_version() == 4
    })
    .await;
    assert!(!c.discovery.is_coordinator());

    for node in [&b, &c] {
        let failed = node.listener.of_kind(NoticeKind::NodeFailed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].node.id, a.id());
        assert_eq!(failed[0].topology_version, 4);
        let ids: Vec<_> = failed[0].snapshot.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![b.id(), c.id()]);
    }
    assert_eq!(b.discovery.remote_nodes().len(), 1);
}

#[tokio::test]
async fn two_simultaneous_predecessor_failures_resolve_by_re_reading() {
    let cluster = TestCluster::new();
    let a = cluster.join_node().await;
    let b = cluster.join_node().await;
    let c = cluster.join_node().await;
    wait_for("everyone at topology 3", || {
        [&a, &b, &c].iter().all(|n| n.discovery.topology_version() == 3)
    })
    .await;

    // C watches B; both of C's predecessors die at once. The election must
    // re-read the children rather than promote blindly.
    cluster.expire(&a);
    cluster.expire(&b);

    wait_for("C coordinates alone", || c.discovery.is_coordinator()).await;
    wait_for("both fails observed", || c.discovery.topology_version() == 5).await;

    let failed = c.listener.of_kind(NoticeKind::NodeFailed);
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().any(|n| n.node.id == a.id()));
    assert!(failed.iter().any(|n| n.node.id == b.id()));
    assert_eq!(failed.last().unwrap().snapshot.len(), 1);
    assert!(c.discovery.remote_nodes().is_empty());
    assert_eq!(c.discovery.local_node().unwrap().order, 3);
}

#[tokio::test]
async fn middle_member_failure_keeps_the_coordinator() {
    let cluster = TestCluster::new();
    let a = cluster.join_node().await;
    let b = cluster.join_node().await;
    let c = cluster.join_node().await;
    wait_for("everyone at topology 3", || {
        [&a, &b, &c].iter().all(|n| n.discovery.topology_version() == 3)
    })
    .await;

    cluster.expire(&b);

    wait_for("fail observed", || {
        a.discovery.topology_version() == 4 && c.discovery.topology_version() == 4
    })
    .await;
    assert!(a.discovery.is_coordinator());
    assert!(!c.discovery.is_coordinator());
    assert_eq!(a.listener.of_kind(NoticeKind::NodeFailed)[0].node.id, b.id());
}
