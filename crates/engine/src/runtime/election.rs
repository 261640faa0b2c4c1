// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Next-in-line coordinator election.
//!
//! The member with the minimum internal id coordinates. Everyone else arms an
//! exists-watch on its floor predecessor; when that fires (or the predecessor
//! is already gone) the children are re-read and the election re-runs from
//! scratch, so simultaneous failures of several predecessors resolve without
//! a herd and without promoting the wrong node.

use super::{Dispatcher, Role};
use crate::error::DiscoveryError;
use aviary_core::AliveName;
use tracing::{info, warn};

impl Dispatcher {
    pub(crate) async fn run_election(&self) -> Result<(), DiscoveryError> {
        loop {
            let children =
                self.shared.zk.get_children(&self.shared.paths.alive_dir(), false).await?;
            let mut alive = parse_alive_names(&children);
            alive.sort_by_key(|a| a.internal_id);

            let local_internal = self.shared.state.lock().local.internal_id;
            if !alive.iter().any(|a| a.internal_id == local_internal) {
                // Our ephemeral is gone while the session still answers;
                // nothing sane can follow.
                return Err(DiscoveryError::Protocol(
                    "local alive node missing from zookeeper".to_string(),
                ));
            }

            let Some(predecessor) = pick_predecessor(&alive, local_internal) else {
                return self.become_coordinator().await;
            };

            let pred_path = self.shared.paths.alive_node(&predecessor.name);
            if self.shared.zk.exists(&pred_path, true).await?.is_some() {
                info!(predecessor = %pred_path, "watching predecessor");
                self.shared.state.lock().role =
                    Role::Follower { predecessor: Some(pred_path) };
                return Ok(());
            }
            info!(predecessor = %pred_path, "predecessor already gone, re-running election");
        }
    }
}

pub(crate) fn parse_alive_names(children: &[String]) -> Vec<AliveName> {
    children
        .iter()
        .filter_map(|name| match AliveName::parse(name) {
            Ok(alive) => Some(alive),
            Err(e) => {
                warn!(name = %name, error = %e, "ignoring malformed alive node");
                None
            }
        })
        .collect()
}

/// The floor entry strictly below `local_internal`, if any.
pub(crate) fn pick_predecessor(alive: &[AliveName], local_internal: u64) -> Option<&AliveName> {
    alive.iter().filter(|a| a.internal_id < local_internal).max_by_key(|a| a.internal_id)
}

#[cfg(test)]
#[path = "election_tests.rs"]
mod tests;
