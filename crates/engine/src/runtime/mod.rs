// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The serialized dispatch lane and the state it owns.
//!
//! Every ZooKeeper watch fire and the connection-loss signal arrive as
//! messages on one channel, drained by a single task. All state mutation
//! (view, log, ack tracking, listener notification) happens on that task;
//! the state sits behind a mutex only so the public query surface can read
//! it concurrently.

pub(crate) mod coordinator;
pub(crate) mod election;
pub(crate) mod replay;

use crate::error::DiscoveryError;
use crate::instance::DiscoveryDeps;
use crate::listener::{DiscoveryNotice, NoticeKind};
use aviary_core::{ClusterNode, ClusterView, DiscoveryEvent, EventKind, EventLog, NodeId, ZkPaths};
use aviary_zk::{SessionEvent, WatchKind, WatchedEvent, ZkClient};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Per-member replay progress, stored as the alive node's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AliveRecord {
    pub last_processed_event_id: u64,
}

/// Payload of the `joined` znode handed to a joiner: the post-join membership
/// plus the cluster's common data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct JoinedData {
    pub snapshot: Vec<ClusterNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common: Option<Value>,
}

/// Election role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Role {
    /// Watching the member with the next-lower internal id.
    Follower { predecessor: Option<String> },
    Coordinator,
}

/// Identity assigned to the local node during join setup.
#[derive(Debug, Clone)]
pub(crate) struct LocalNode {
    pub id: NodeId,
    pub join_seq: u64,
    pub internal_id: u64,
    /// Full path of the local alive node.
    pub alive_path: String,
}

pub(crate) struct DiscoveryState {
    pub view: ClusterView,
    pub log: EventLog,
    pub role: Role,
    pub local: LocalNode,
    pub joined: bool,
    pub stopped: bool,
    pub last_processed_event_id: u64,
    pub events_since_ack: u32,
    /// Outcome of the local join, taken once by `Discovery::join`.
    pub join_result: Option<Result<(), DiscoveryError>>,
}

impl DiscoveryState {
    pub fn new(local: LocalNode) -> Self {
        Self {
            view: ClusterView::new(),
            log: EventLog::new(),
            role: Role::Follower { predecessor: None },
            local,
            joined: false,
            stopped: false,
            last_processed_event_id: 0,
            events_since_ack: 0,
            join_result: None,
        }
    }

    pub fn is_coordinator(&self) -> bool {
        self.role == Role::Coordinator
    }
}

/// Znode deletions owed once an event is fully acked. Produced while the
/// state lock is held, executed after it is released.
#[derive(Debug)]
pub(crate) enum Cleanup {
    Join { event_id: u64 },
    Custom { source_path: String },
    Nothing,
}

impl Cleanup {
    pub fn for_event(event: &DiscoveryEvent) -> Self {
        match &event.kind {
            EventKind::Join { .. } => Self::Join { event_id: event.id },
            EventKind::Custom { source_path, .. } => {
                Self::Custom { source_path: source_path.clone() }
            }
            EventKind::Fail { .. } => Self::Nothing,
        }
    }
}

/// Remove fully-acked events from the log, collecting their cleanups.
pub(crate) fn remove_completed(log: &mut EventLog, ids: &[u64]) -> Vec<Cleanup> {
    ids.iter().filter_map(|id| log.remove(*id)).map(|ev| Cleanup::for_event(&ev)).collect()
}

/// State and collaborators shared by the dispatch lane and the public handle.
#[derive(Clone)]
pub(crate) struct Shared {
    pub zk: ZkClient,
    pub paths: ZkPaths,
    pub state: Arc<Mutex<DiscoveryState>>,
    pub deps: Arc<DiscoveryDeps>,
    pub join_wake: Arc<Notify>,
    pub ack_threshold: u32,
}

impl Shared {
    pub(crate) fn notify(
        &self,
        kind: NoticeKind,
        topology_version: u64,
        node: Arc<ClusterNode>,
        snapshot: Vec<Arc<ClusterNode>>,
        message: Option<Value>,
    ) {
        self.deps.listener.on_event(DiscoveryNotice {
            kind,
            topology_version,
            node,
            snapshot,
            message,
        });
    }

    pub(crate) async fn run_cleanups(&self, cleanups: Vec<Cleanup>) -> Result<(), DiscoveryError> {
        for cleanup in cleanups {
            match cleanup {
                Cleanup::Join { event_id } => {
                    self.zk.delete_if_exists(&self.paths.evt_join_data(event_id)).await?;
                    self.zk.delete_if_exists(&self.paths.evt_joined(event_id)).await?;
                    self.zk.delete_if_exists(&self.paths.evt(event_id)).await?;
                }
                Cleanup::Custom { source_path } => {
                    self.zk.delete_if_exists(&self.paths.custom_node(&source_path)).await?;
                }
                Cleanup::Nothing => {}
            }
        }
        Ok(())
    }
}

/// The dispatch lane: drains session events until shutdown or session loss.
pub(crate) struct Dispatcher {
    pub shared: Shared,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub shutdown: CancellationToken,
}

impl Dispatcher {
    pub(crate) async fn run(mut self) {
        if let Err(e) = self.bootstrap().await {
            self.handle_error(e);
            return;
        }
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.mark_stopped();
                    break;
                }
                event = self.events.recv() => match event {
                    None | Some(SessionEvent::ConnectionLost) => {
                        self.segment();
                        break;
                    }
                    Some(SessionEvent::Watch(watch)) => {
                        if let Err(e) = self.handle_watch(watch).await {
                            self.handle_error(e);
                            break;
                        }
                    }
                },
            }
        }
    }

    /// Initial pass after join setup: elect, then (as a follower) catch up on
    /// the shared log and arm its data watch.
    async fn bootstrap(&self) -> Result<(), DiscoveryError> {
        self.run_election().await?;
        let is_coordinator = self.shared.state.lock().is_coordinator();
        if !is_coordinator {
            self.refresh_and_replay().await?;
        }
        Ok(())
    }

    async fn handle_watch(&self, watch: WatchedEvent) -> Result<(), DiscoveryError> {
        let (role, stopped) = {
            let st = self.shared.state.lock();
            (st.role.clone(), st.stopped)
        };
        if stopped {
            return Ok(());
        }
        let paths = &self.shared.paths;
        match role {
            Role::Coordinator => {
                if watch.path == paths.alive_dir() {
                    self.topology_pass().await
                } else if watch.path == paths.custom_dir() {
                    self.custom_pass().await
                } else if watch.path.starts_with(&format!("{}/", paths.alive_dir())) {
                    // Ack watch on a member's alive node. Deletions are
                    // covered by the children watch on the parent.
                    if watch.kind == WatchKind::DataChanged {
                        self.read_ack(&watch.path).await
                    } else {
                        Ok(())
                    }
                } else {
                    debug!(path = %watch.path, "ignoring stale watch event");
                    Ok(())
                }
            }
            Role::Follower { predecessor } => {
                if watch.path == paths.evts() {
                    self.refresh_and_replay().await
                } else if predecessor.as_deref() == Some(watch.path.as_str()) {
                    self.predecessor_event(&watch).await
                } else {
                    debug!(path = %watch.path, "ignoring stale watch event");
                    Ok(())
                }
            }
        }
    }

    /// The one-shot watch on the predecessor fired. A deletion re-runs the
    /// election; anything else just consumed the watch, so re-arm it (and
    /// re-elect if the node turns out to be gone).
    async fn predecessor_event(&self, watch: &WatchedEvent) -> Result<(), DiscoveryError> {
        if watch.kind == WatchKind::Deleted {
            return self.run_election().await;
        }
        match self.shared.zk.exists(&watch.path, true).await? {
            Some(_) => Ok(()),
            None => self.run_election().await,
        }
    }

    fn handle_error(&self, err: DiscoveryError) {
        if err.is_segmentation() {
            self.segment();
        } else {
            self.fatal(err);
        }
    }

    /// Session loss: notify exactly once, then go quiet.
    fn segment(&self) {
        self.shared.zk.fail();
        let notice = {
            let mut guard = self.shared.state.lock();
            let st = &mut *guard;
            if st.stopped {
                return;
            }
            st.stopped = true;
            if st.joined {
                st.view
                    .get(&st.local.id)
                    .map(|node| (st.log.topology_version, node, st.view.snapshot()))
            } else {
                st.join_result = Some(Err(DiscoveryError::Segmented));
                None
            }
        };
        match notice {
            Some((topology_version, node, snapshot)) => {
                warn!(topology_version, "segmented from the cluster");
                self.shared.notify(NoticeKind::Segmented, topology_version, node, snapshot, None);
            }
            None => warn!("segmented before completing the join"),
        }
        self.shared.join_wake.notify_waiters();
    }

    /// Invariant violation: log, fail a pending join, stop delivering.
    fn fatal(&self, err: DiscoveryError) {
        error!(error = %err, "fatal discovery error, stopping");
        {
            let mut st = self.shared.state.lock();
            st.stopped = true;
            if !st.joined && st.join_result.is_none() {
                st.join_result = Some(Err(err));
            }
        }
        self.shared.join_wake.notify_waiters();
    }

    fn mark_stopped(&self) {
        self.shared.state.lock().stopped = true;
        self.shared.join_wake.notify_waiters();
    }
}
