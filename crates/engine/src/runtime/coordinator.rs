// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator duties: takeover, topology and custom event generation, and
//! ack processing.
//!
//! Only the coordinator writes the events znode and its payload children, and
//! only the coordinator deletes consumed custom submissions. Ack progress is
//! observed through data watches on every other member's alive node; the
//! serialized log is deliberately not rewritten on ack, so trimmed entries
//! linger in ZooKeeper until the next topology or custom write.

use super::election::parse_alive_names;
use super::{remove_completed, AliveRecord, Dispatcher, JoinedData, Role};
use crate::error::DiscoveryError;
use crate::exchange::DataBag;
use crate::listener::NoticeKind;
use aviary_core::{AliveName, ClusterNode, EventLog, SubmissionName};
use aviary_zk::{CreateMode, ZkError};
use std::collections::BTreeSet;
use tracing::{info, warn};

impl Dispatcher {
    pub(crate) async fn become_coordinator(&self) -> Result<(), DiscoveryError> {
        let already = {
            let mut st = self.shared.state.lock();
            let already = st.is_coordinator();
            st.role = Role::Coordinator;
            already
        };
        if already {
            return Ok(());
        }
        info!("became coordinator");

        // Inherit the shared log and catch up locally before touching it.
        let (data, _) = self.shared.zk.get_data(&self.shared.paths.evts(), false).await?;
        let first_member = data.is_empty();
        if !first_member {
            let log = EventLog::decode(&data)?;
            self.shared.state.lock().log = log;
            self.replay().await?;
        } else if !self.shared.state.lock().joined {
            self.bootstrap_first_member().await?;
        }

        // Arm the children watches we now own.
        let children = self.shared.zk.get_children(&self.shared.paths.alive_dir(), true).await?;
        let mut alive = parse_alive_names(&children);
        alive.sort_by_key(|a| a.internal_id);
        let custom = self.shared.zk.get_children(&self.shared.paths.custom_dir(), true).await?;

        // Rebuild every pending ack set against the live topology. Only nodes
        // that are both alive and members owe acks; joiners that never
        // arrived are dropped.
        let cleanups = {
            let mut guard = self.shared.state.lock();
            let st = &mut *guard;
            let alive_ids: BTreeSet<u64> = alive.iter().map(|a| a.internal_id).collect();
            let local_internal = st.local.internal_id;
            let ackers: Vec<u64> = st
                .view
                .internal_ids()
                .into_iter()
                .filter(|id| alive_ids.contains(id) && *id != local_internal)
                .collect();
            let mut done = Vec::new();
            for id in st.log.event_ids() {
                if let Some(event) = st.log.get_mut(id) {
                    event.reset_acks(ackers.iter().copied());
                    if event.acks_done() {
                        done.push(id);
                    }
                }
            }
            remove_completed(&mut st.log, &done)
        };
        self.shared.run_cleanups(cleanups).await?;

        // Observe each member's replay progress (arming the ack watches).
        let local_internal = self.shared.state.lock().local.internal_id;
        for member in alive.iter().filter(|a| a.internal_id != local_internal) {
            self.read_ack_for(member.internal_id, &self.shared.paths.alive_node(&member.name))
                .await?;
        }

        // Process whatever churn accumulated while nobody coordinated.
        self.apply_topology(alive).await?;
        self.apply_custom(custom).await
    }

    /// Cold start: this node opens a brand-new cluster.
    async fn bootstrap_first_member(&self) -> Result<(), DiscoveryError> {
        let (event_id, topology_version, node, snapshot, blob_path) = {
            let mut guard = self.shared.state.lock();
            let st = &mut *guard;
            st.log.grid_start_time = self.shared.deps.clock.epoch_ms();
            let (id, internal_id, join_seq) =
                (st.local.id, st.local.internal_id, st.local.join_seq);
            let event = st.log.emit_join(id, internal_id, None);
            let (event_id, topology_version) = (event.id, event.topology_version);
            let node = st.view.add(ClusterNode::new(id, internal_id, topology_version));
            st.joined = true;
            st.last_processed_event_id = event_id;
            st.join_result = Some(Ok(()));
            let blob_path = self.shared.paths.join_data_node(id, join_seq);
            (event_id, topology_version, node, st.view.snapshot(), blob_path)
        };

        self.persist_log().await?;
        self.shared.notify(NoticeKind::NodeJoined, topology_version, node, snapshot, None);
        self.shared.join_wake.notify_waiters();

        // Sole member: nothing to ack, the synthetic join completes at once.
        self.shared.state.lock().log.remove(event_id);
        // The pre-join blob never had a reader.
        self.shared.zk.delete_if_exists(&blob_path).await?;

        info!(topology_version, "started a new cluster as first member");
        Ok(())
    }

    /// Re-read the alive children (re-arming the watch) and diff them
    /// against the view.
    pub(crate) async fn topology_pass(&self) -> Result<(), DiscoveryError> {
        let children = self.shared.zk.get_children(&self.shared.paths.alive_dir(), true).await?;
        let mut alive = parse_alive_names(&children);
        alive.sort_by_key(|a| a.internal_id);
        self.apply_topology(alive).await
    }

    async fn apply_topology(&self, alive: Vec<AliveName>) -> Result<(), DiscoveryError> {
        let alive_ids: BTreeSet<u64> = alive.iter().map(|a| a.internal_id).collect();
        let (added, removed) = {
            let st = self.shared.state.lock();
            let added: Vec<AliveName> = alive
                .iter()
                .filter(|a| !st.view.contains_internal_id(a.internal_id))
                .cloned()
                .collect();
            let mut removed: Vec<u64> = st
                .view
                .internal_ids()
                .into_iter()
                .filter(|id| !alive_ids.contains(id))
                .collect();
            removed.sort_unstable();
            (added, removed)
        };

        let mut dirty = false;
        for joiner in &added {
            dirty |= self.emit_join_for(joiner).await?;
        }
        for internal_id in removed {
            self.emit_fail_for(internal_id, &alive_ids).await?;
            dirty = true;
        }
        if dirty {
            self.persist_log().await?;
            self.replay().await?;
        }
        Ok(())
    }

    /// Emit a Join for a new alive node. Returns false when the joiner turned
    /// out to be dead on arrival.
    async fn emit_join_for(&self, joiner: &AliveName) -> Result<bool, DiscoveryError> {
        let paths = &self.shared.paths;
        let blob_path = paths.join_data_node(joiner.node_id, joiner.join_seq);
        let raw = match self.shared.zk.get_data(&blob_path, false).await {
            Ok((raw, _)) => raw,
            Err(ZkError::NoNode(_)) => {
                info!(node = %joiner.node_id, "joiner left before its join data was read, skipping");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        let joining = if raw.is_empty() {
            None
        } else {
            match self.shared.deps.codec.decode(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(
                        node = %joiner.node_id, error = %e,
                        "undecodable joining payload, treating joiner as dead on arrival",
                    );
                    return Ok(false);
                }
            }
        };

        // Hand the joiner's payload to the local exchange and collect the
        // cluster's common data for it.
        if let Some(value) = &joining {
            let mut bag = DataBag::new(joiner.node_id);
            bag.joining = Some(value.clone());
            self.shared.deps.exchange.on_exchange(bag);
        }
        let common = {
            let mut bag = DataBag::new(joiner.node_id);
            self.shared.deps.exchange.collect(&mut bag);
            bag.common
        };

        let (event_id, topology_version, joined_blob) = {
            let mut guard = self.shared.state.lock();
            let st = &mut *guard;
            let local_internal = st.local.internal_id;
            // Post-join topology owes the ack, minus the emitting coordinator.
            let mut ackers: Vec<u64> = st.view.internal_ids();
            ackers.push(joiner.internal_id);
            // Snapshot handed to the joiner: the view plus the joiner itself.
            let mut snapshot: Vec<ClusterNode> =
                st.view.snapshot().iter().map(|n| (**n).clone()).collect();
            let event = st.log.emit_join(joiner.node_id, joiner.internal_id, joining);
            let (event_id, topology_version) = (event.id, event.topology_version);
            event.reset_acks(ackers.into_iter().filter(|id| *id != local_internal));
            snapshot.push(ClusterNode::new(joiner.node_id, joiner.internal_id, topology_version));
            let joined_blob = serde_json::to_vec(&JoinedData { snapshot, common })?;
            (event_id, topology_version, joined_blob)
        };

        // Persist what the joiner and the other members will fetch.
        self.shared.zk.create_all_if_needed(&[paths.evt(event_id)]).await?;
        self.shared.zk.create(&paths.evt_join_data(event_id), raw, CreateMode::Persistent).await?;
        self.shared.zk.create(&paths.evt_joined(event_id), joined_blob, CreateMode::Persistent).await?;
        // The pre-join blob is consumed now.
        self.shared.zk.delete_if_exists(&blob_path).await?;

        // Observe the new member's replay progress.
        let local_internal = self.shared.state.lock().local.internal_id;
        if joiner.internal_id != local_internal {
            self.read_ack_for(joiner.internal_id, &paths.alive_node(&joiner.name)).await?;
        }

        info!(node = %joiner.node_id, topology_version, event = event_id, "member joined");
        Ok(true)
    }

    async fn emit_fail_for(
        &self,
        internal_id: u64,
        alive_ids: &BTreeSet<u64>,
    ) -> Result<(), DiscoveryError> {
        let cleanups = {
            let mut guard = self.shared.state.lock();
            let st = &mut *guard;
            // The failed member will never ack; drop it from every pending
            // set before the fail event lands.
            let mut done = Vec::new();
            for id in st.log.event_ids() {
                if let Some(event) = st.log.get_mut(id) {
                    if event.drop_failed(internal_id) {
                        done.push(id);
                    }
                }
            }
            let cleanups = remove_completed(&mut st.log, &done);

            // Post-fail topology minus the coordinator. The view may still
            // hold members whose fail lands later in this same batch, so
            // intersect with the live alive set.
            let local_internal = st.local.internal_id;
            let ackers: Vec<u64> = st
                .view
                .internal_ids()
                .into_iter()
                .filter(|id| {
                    alive_ids.contains(id) && *id != internal_id && *id != local_internal
                })
                .collect();
            let event = st.log.emit_fail(internal_id);
            let (event_id, topology_version) = (event.id, event.topology_version);
            event.reset_acks(ackers);
            info!(internal_id, topology_version, event = event_id, "member failed");
            cleanups
        };
        self.shared.run_cleanups(cleanups).await
    }

    /// Re-read the custom children (re-arming the watch) and consume new
    /// submissions.
    pub(crate) async fn custom_pass(&self) -> Result<(), DiscoveryError> {
        let children = self.shared.zk.get_children(&self.shared.paths.custom_dir(), true).await?;
        self.apply_custom(children).await
    }

    async fn apply_custom(&self, children: Vec<String>) -> Result<(), DiscoveryError> {
        let mut submissions: Vec<SubmissionName> = children
            .iter()
            .filter_map(|name| match SubmissionName::parse(name) {
                Ok(sub) => Some(sub),
                Err(e) => {
                    warn!(name = %name, error = %e, "ignoring malformed custom submission");
                    None
                }
            })
            .collect();
        submissions.sort_by_key(|s| s.seq);

        let high_water = self.shared.state.lock().log.processed_custom_seq;
        let mut dirty = false;
        for sub in submissions.into_iter().filter(|s| s.seq > high_water) {
            let path = self.shared.paths.custom_node(&sub.name);

            let known = self.shared.state.lock().view.get(&sub.node_id).is_some();
            if !known {
                warn!(sender = %sub.node_id, "custom event from unknown member, deleting");
                self.shared.zk.delete_if_exists(&path).await?;
                self.shared.state.lock().log.processed_custom_seq = sub.seq;
                continue;
            }

            let raw = match self.shared.zk.get_data(&path, false).await {
                Ok((raw, _)) => raw,
                Err(ZkError::NoNode(_)) => {
                    self.shared.state.lock().log.processed_custom_seq = sub.seq;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let message = match self.shared.deps.codec.decode(&raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!(sender = %sub.node_id, error = %e, "undecodable custom payload, deleting");
                    self.shared.zk.delete_if_exists(&path).await?;
                    self.shared.state.lock().log.processed_custom_seq = sub.seq;
                    continue;
                }
            };

            {
                let mut guard = self.shared.state.lock();
                let st = &mut *guard;
                let local_internal = st.local.internal_id;
                let ackers: Vec<u64> = st
                    .view
                    .internal_ids()
                    .into_iter()
                    .filter(|id| *id != local_internal)
                    .collect();
                let event = st.log.emit_custom(sub.node_id, sub.name.clone(), Some(message));
                event.reset_acks(ackers);
                st.log.processed_custom_seq = sub.seq;
            }
            dirty = true;
        }

        if dirty {
            self.persist_log().await?;
            self.replay().await?;
        }
        Ok(())
    }

    /// Serialize the whole log to the events znode (unconditional version).
    pub(crate) async fn persist_log(&self) -> Result<(), DiscoveryError> {
        let bytes = self.shared.state.lock().log.encode()?;
        self.shared.zk.set_data(&self.shared.paths.evts(), bytes, None).await?;
        Ok(())
    }

    /// An ack watch fired: re-read the member's record.
    pub(crate) async fn read_ack(&self, path: &str) -> Result<(), DiscoveryError> {
        let name = path.rsplit('/').next().unwrap_or_default();
        let internal_id = AliveName::parse(name)?.internal_id;
        self.read_ack_for(internal_id, path).await
    }

    /// Read a member's alive record (re-arming the data watch) and apply its
    /// progress to every pending event.
    pub(crate) async fn read_ack_for(
        &self,
        internal_id: u64,
        path: &str,
    ) -> Result<(), DiscoveryError> {
        let raw = match self.shared.zk.get_data(path, true).await {
            Ok((raw, _)) => raw,
            // The member is gone; the fail path settles its acks.
            Err(ZkError::NoNode(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let record: AliveRecord = serde_json::from_slice(&raw)?;

        let cleanups = {
            let mut guard = self.shared.state.lock();
            let st = &mut *guard;
            let mut done = Vec::new();
            for id in st.log.event_ids() {
                if let Some(event) = st.log.get_mut(id) {
                    if event.ack(internal_id, record.last_processed_event_id) {
                        done.push(id);
                    }
                }
            }
            remove_completed(&mut st.log, &done)
        };
        self.shared.run_cleanups(cleanups).await
    }
}
