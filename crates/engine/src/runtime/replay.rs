// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The replay engine: every member walks the shared log in event-id order,
//! updates its view, notifies the host listener, and reports progress.
//!
//! Followers run this whenever the events znode changes; the coordinator runs
//! it inline after every write, against its in-memory log.

use super::{AliveRecord, Cleanup, Dispatcher, JoinedData};
use crate::error::DiscoveryError;
use crate::exchange::DataBag;
use crate::listener::NoticeKind;
use aviary_core::{ClusterNode, DiscoveryEvent, EventKind, EventLog, NodeId};
use aviary_zk::ZkError;
use serde_json::Value;
use tracing::{info, warn};

impl Dispatcher {
    /// Re-read the shared log (re-arming its data watch) and replay.
    /// Follower-side entry point.
    pub(crate) async fn refresh_and_replay(&self) -> Result<(), DiscoveryError> {
        let (data, _) = self.shared.zk.get_data(&self.shared.paths.evts(), true).await?;
        if !data.is_empty() {
            let log = EventLog::decode(&data)?;
            self.shared.state.lock().log = log;
        }
        self.replay().await
    }

    /// Deliver every event past the local high-water mark, in id order.
    pub(crate) async fn replay(&self) -> Result<(), DiscoveryError> {
        loop {
            let next = {
                let st = self.shared.state.lock();
                let event = st.log.events_after(st.last_processed_event_id).next().cloned();
                event
            };
            let Some(event) = next else { break };
            self.deliver(event).await?;
        }
        Ok(())
    }

    async fn deliver(&self, event: DiscoveryEvent) -> Result<(), DiscoveryError> {
        let (joined, local_id) = {
            let st = self.shared.state.lock();
            (st.joined, st.local.id)
        };

        if !joined {
            // Before our own join event, nothing concerns us.
            if let EventKind::Join { node_id, internal_id, .. } = &event.kind {
                if *node_id == local_id {
                    self.complete_local_join(&event, *internal_id).await?;
                }
            }
        } else {
            match event.kind.clone() {
                EventKind::Join { node_id, internal_id, joining_data } => {
                    if node_id == local_id {
                        warn!(event = event.id, "ignoring duplicate local join event");
                    } else {
                        self.deliver_join(&event, node_id, internal_id, joining_data).await?;
                    }
                }
                EventKind::Fail { internal_id } => self.deliver_fail(&event, internal_id),
                EventKind::Custom { sender, source_path, message } => {
                    self.deliver_custom(&event, sender, &source_path, message).await?;
                }
            }
        }

        self.finish_event(&event).await
    }

    /// Our own Join event: adopt the snapshot, finish the join handshake.
    async fn complete_local_join(
        &self,
        event: &DiscoveryEvent,
        internal_id: u64,
    ) -> Result<(), DiscoveryError> {
        let joined_path = self.shared.paths.evt_joined(event.id);
        let (raw, _) = self.shared.zk.get_data(&joined_path, false).await?;
        let data: JoinedData = serde_json::from_slice(&raw)?;

        let (local_id, node, snapshot) = {
            let mut guard = self.shared.state.lock();
            let st = &mut *guard;
            if internal_id != st.local.internal_id {
                return Err(DiscoveryError::Protocol(format!(
                    "local join event carries internal id {internal_id}, expected {}",
                    st.local.internal_id
                )));
            }
            for member in &data.snapshot {
                st.view.add(member.clone());
            }
            st.joined = true;
            st.join_result = Some(Ok(()));
            let node = st.view.get(&st.local.id).ok_or_else(|| {
                DiscoveryError::Protocol("join snapshot is missing the local node".to_string())
            })?;
            (st.local.id, node, st.view.snapshot())
        };

        if let Some(common) = data.common {
            let mut bag = DataBag::new(local_id);
            bag.common = Some(common);
            self.shared.deps.exchange.on_exchange(bag);
        }

        self.shared.notify(NoticeKind::NodeJoined, event.topology_version, node, snapshot, None);
        self.shared.join_wake.notify_waiters();

        // Consumed; best-effort.
        let _ = self.shared.zk.delete_if_exists(&joined_path).await;
        info!(topology_version = event.topology_version, "joined the cluster");
        Ok(())
    }

    /// Someone else joined. With no in-memory payload (we did not emit the
    /// event), fetch the joining blob and feed the exchange first.
    async fn deliver_join(
        &self,
        event: &DiscoveryEvent,
        node_id: NodeId,
        internal_id: u64,
        joining_data: Option<Value>,
    ) -> Result<(), DiscoveryError> {
        if joining_data.is_none() {
            let blob_path = self.shared.paths.evt_join_data(event.id);
            match self.shared.zk.get_data(&blob_path, false).await {
                Ok((raw, _)) if !raw.is_empty() => {
                    match self.shared.deps.codec.decode(&raw) {
                        Ok(value) => {
                            let mut bag = DataBag::new(node_id);
                            bag.joining = Some(value);
                            self.shared.deps.exchange.on_exchange(bag);
                        }
                        Err(e) => {
                            warn!(node = %node_id, error = %e, "undecodable joining payload")
                        }
                    }
                }
                Ok(_) => {}
                Err(ZkError::NoNode(_)) => {
                    warn!(node = %node_id, event = event.id, "join data already cleaned up")
                }
                Err(e) => return Err(e.into()),
            }
        }

        let (node, snapshot) = {
            let mut st = self.shared.state.lock();
            let node = st.view.add(ClusterNode::new(node_id, internal_id, event.topology_version));
            (node, st.view.snapshot())
        };
        self.shared.notify(NoticeKind::NodeJoined, event.topology_version, node, snapshot, None);
        Ok(())
    }

    fn deliver_fail(&self, event: &DiscoveryEvent, internal_id: u64) {
        let (removed, snapshot) = {
            let mut st = self.shared.state.lock();
            (st.view.remove_by_internal_id(internal_id), st.view.snapshot())
        };
        match removed {
            Some(node) => {
                self.shared.notify(NoticeKind::NodeFailed, event.topology_version, node, snapshot, None);
            }
            None => warn!(internal_id, event = event.id, "fail event for unknown member"),
        }
    }

    /// A custom broadcast. The emitting coordinator carries the payload in
    /// memory; everyone else fetches it from the submission znode.
    async fn deliver_custom(
        &self,
        event: &DiscoveryEvent,
        sender: NodeId,
        source_path: &str,
        message: Option<Value>,
    ) -> Result<(), DiscoveryError> {
        let message = match message {
            Some(m) => Some(m),
            None => {
                let path = self.shared.paths.custom_node(source_path);
                match self.shared.zk.get_data(&path, false).await {
                    Ok((raw, _)) => match self.shared.deps.codec.decode(&raw) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            warn!(event = event.id, error = %e, "undecodable custom payload");
                            None
                        }
                    },
                    Err(ZkError::NoNode(_)) => {
                        warn!(event = event.id, path = %path, "custom payload already cleaned up");
                        None
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };
        let Some(message) = message else { return Ok(()) };

        let (node, snapshot) = {
            let st = self.shared.state.lock();
            (st.view.get(&sender), st.view.snapshot())
        };
        match node {
            Some(node) => {
                self.shared.notify(
                    NoticeKind::Custom,
                    event.topology_version,
                    node,
                    snapshot,
                    Some(message),
                );
            }
            None => warn!(sender = %sender, event = event.id, "custom event from a departed member"),
        }
        Ok(())
    }

    /// Advance the high-water mark, trim coordinator-side completed events,
    /// and report follower progress every `ack_threshold` events.
    async fn finish_event(&self, event: &DiscoveryEvent) -> Result<(), DiscoveryError> {
        let (cleanups, ack_write) = {
            let mut guard = self.shared.state.lock();
            let st = &mut *guard;
            st.last_processed_event_id = event.id;
            st.events_since_ack += 1;

            let mut cleanups: Vec<Cleanup> = Vec::new();
            if st.is_coordinator() {
                let complete = st.log.get(event.id).is_some_and(|e| e.acks_done());
                if complete {
                    if let Some(removed) = st.log.remove(event.id) {
                        cleanups.push(Cleanup::for_event(&removed));
                    }
                }
            }

            let ack_write = if !st.is_coordinator()
                && st.joined
                && st.events_since_ack >= self.shared.ack_threshold
            {
                st.events_since_ack = 0;
                let record = AliveRecord { last_processed_event_id: st.last_processed_event_id };
                Some((st.local.alive_path.clone(), record))
            } else {
                None
            };
            (cleanups, ack_write)
        };

        self.shared.run_cleanups(cleanups).await?;
        if let Some((path, record)) = ack_write {
            let bytes = serde_json::to_vec(&record)?;
            self.shared.zk.set_data(&path, bytes, None).await?;
        }
        Ok(())
    }
}
