// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The public discovery handle: join protocol, queries, custom messages.

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::exchange::{DataBag, DataExchange};
use crate::listener::DiscoveryListener;
use crate::runtime::{AliveRecord, Dispatcher, DiscoveryState, LocalNode, Shared};
use aviary_core::{parse_created_seq, AliveName, Clock, ClusterNode, Codec, NodeId};
use aviary_zk::{CreateMode, SessionEvent, ZkClient, ZkSession};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Host collaborators injected into a discovery instance.
pub struct DiscoveryDeps {
    pub listener: Arc<dyn DiscoveryListener>,
    pub exchange: Arc<dyn DataExchange>,
    pub codec: Arc<dyn Codec>,
    pub clock: Arc<dyn Clock>,
}

impl DiscoveryDeps {
    /// Deps with the default codec (JSON) and clock (system).
    pub fn new(listener: Arc<dyn DiscoveryListener>, exchange: Arc<dyn DataExchange>) -> Self {
        Self {
            listener,
            exchange,
            codec: Arc::new(aviary_core::JsonCodec),
            clock: Arc::new(aviary_core::SystemClock),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// One running discovery instance.
///
/// Terminal by design: after segmentation the host drops the handle and
/// starts a fresh instance on a new session.
pub struct Discovery {
    shared: Shared,
    shutdown: CancellationToken,
}

impl Discovery {
    /// Join protocol setup: publish the joining payload and the alive node,
    /// then hand control to the dispatch lane.
    ///
    /// The returned handle is live immediately; await [`Discovery::join`] to
    /// block until the cluster has admitted this node.
    pub async fn start(
        session: Arc<dyn ZkSession>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        config: DiscoveryConfig,
        deps: DiscoveryDeps,
    ) -> Result<Self, DiscoveryError> {
        config.validate()?;
        let paths = config.paths();
        let zk = ZkClient::new(session);
        let local_id = NodeId::random();
        info!(
            node = %local_id,
            cluster = %config.cluster_name,
            connect = %config.connect_string,
            session_timeout_ms = config.session_timeout.as_millis() as u64,
            "starting discovery",
        );

        let mut bag = DataBag::new(local_id);
        deps.exchange.collect(&mut bag);
        let joining_blob = match &bag.joining {
            Some(value) => deps.codec.encode(value)?,
            None => Vec::new(),
        };

        // The alive directory is created last during bootstrap, so its
        // presence implies the whole layout exists.
        if zk.exists(&paths.alive_dir(), false).await?.is_none() {
            zk.create_all_if_needed(&paths.bootstrap_paths()).await?;
        }

        let created = zk
            .create(&paths.join_data_prefix(local_id), joining_blob, CreateMode::EphemeralSequential)
            .await?;
        let join_seq = parse_created_seq(&created)?;

        let record = serde_json::to_vec(&AliveRecord { last_processed_event_id: 0 })?;
        let alive_path = zk
            .create(
                &paths.alive_node_prefix(local_id, join_seq),
                record,
                CreateMode::EphemeralSequential,
            )
            .await?;
        let internal_id = parse_created_seq(&alive_path)?;
        info!(node = %local_id, join_seq, internal_id, "registered alive node");

        let local = LocalNode { id: local_id, join_seq, internal_id, alive_path };
        let shared = Shared {
            zk,
            paths,
            state: Arc::new(Mutex::new(DiscoveryState::new(local))),
            deps: Arc::new(deps),
            join_wake: Arc::new(Notify::new()),
            ack_threshold: config.ack_threshold.max(1),
        };
        let shutdown = CancellationToken::new();
        let dispatcher =
            Dispatcher { shared: shared.clone(), events, shutdown: shutdown.clone() };
        tokio::spawn(dispatcher.run());

        Ok(Self { shared, shutdown })
    }

    /// Block until the local join completes (or fails terminally), warning
    /// every ten seconds while still waiting.
    pub async fn join(&self) -> Result<(), DiscoveryError> {
        const WARN_INTERVAL: Duration = Duration::from_secs(10);
        loop {
            {
                let mut st = self.shared.state.lock();
                if let Some(result) = st.join_result.take() {
                    return result;
                }
                if st.joined {
                    return Ok(());
                }
                if st.stopped {
                    return Err(DiscoveryError::Stopped);
                }
            }
            tokio::select! {
                _ = self.shared.join_wake.notified() => {}
                _ = tokio::time::sleep(WARN_INTERVAL) => {
                    warn!("still waiting for the local join event");
                }
            }
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.shared.state.lock().local.id
    }

    /// The local member record; `None` until joined.
    pub fn local_node(&self) -> Option<Arc<ClusterNode>> {
        let st = self.shared.state.lock();
        st.view.get(&st.local.id)
    }

    /// Every member other than the local node, ordered by topology order.
    pub fn remote_nodes(&self) -> Vec<Arc<ClusterNode>> {
        let st = self.shared.state.lock();
        st.view.remote_nodes(&st.local.id)
    }

    pub fn node(&self, id: &NodeId) -> Option<Arc<ClusterNode>> {
        self.shared.state.lock().view.get(id)
    }

    /// Live membership check against the alive directory.
    pub async fn known_node(&self, id: &NodeId) -> Result<bool, DiscoveryError> {
        let children =
            self.shared.zk.get_children(&self.shared.paths.alive_dir(), false).await?;
        Ok(children
            .iter()
            .filter_map(|name| AliveName::parse(name).ok())
            .any(|alive| alive.node_id == *id))
    }

    /// Placeholder liveness probe: currently a local membership check.
    pub fn ping_node(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn topology_version(&self) -> u64 {
        self.shared.state.lock().log.topology_version
    }

    /// Epoch millis fixed at the first coordinator election; 0 until known.
    pub fn grid_start_time(&self) -> u64 {
        self.shared.state.lock().log.grid_start_time
    }

    pub fn is_coordinator(&self) -> bool {
        self.shared.state.lock().is_coordinator()
    }

    /// Fire-and-forget broadcast: the payload lands under the custom-events
    /// directory and the coordinator turns it into an ordered event.
    pub async fn send_custom_message(&self, message: Value) -> Result<(), DiscoveryError> {
        let blob = self.shared.deps.codec.encode(&message)?;
        let prefix = self.shared.paths.custom_prefix(self.local_id());
        self.shared.zk.create(&prefix, blob, CreateMode::PersistentSequential).await?;
        Ok(())
    }

    /// Stop the dispatch lane. Local only; the cluster sees this node fail
    /// once its session lapses.
    pub fn stop(&self) {
        info!("stopping discovery");
        self.shutdown.cancel();
    }
}
