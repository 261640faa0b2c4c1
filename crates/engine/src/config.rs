// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovery instance configuration

use crate::error::DiscoveryError;
use aviary_core::ZkPaths;
use std::time::Duration;

/// Configuration for one discovery instance.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// ZooKeeper connect string, e.g. `"zk1:2181,zk2:2181"`. Consumed by the
    /// session the host opens; recorded here for validation and logging.
    pub connect_string: String,
    /// ZooKeeper session timeout.
    pub session_timeout: Duration,
    /// Root path all cluster znodes live under.
    pub base_path: String,
    /// Cluster name; becomes the child of `base_path` everything hangs off.
    pub cluster_name: String,
    /// Events between alive-record ack writes. Defaults from
    /// `AVIARY_DISCOVERY_ACK_THRESHOLD` (5); clamped to at least 1 at startup.
    pub ack_threshold: u32,
}

impl DiscoveryConfig {
    pub fn new(connect_string: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self {
            connect_string: connect_string.into(),
            session_timeout: Duration::from_secs(10),
            base_path: "/aviary".to_string(),
            cluster_name: cluster_name.into(),
            ack_threshold: crate::env::ack_threshold(),
        }
    }

    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.connect_string.trim().is_empty() {
            return Err(invalid("connect string must not be empty"));
        }
        if !self.base_path.starts_with('/') {
            return Err(invalid("base path must start with '/'"));
        }
        if self.base_path.ends_with('/') {
            return Err(invalid("base path must not end with '/'"));
        }
        if self.base_path.split('/').skip(1).any(str::is_empty) {
            return Err(invalid("base path must not contain empty segments"));
        }
        if self.cluster_name.is_empty() {
            return Err(invalid("cluster name must not be empty"));
        }
        if self.cluster_name.contains('/') || self.cluster_name.contains('|') {
            return Err(invalid("cluster name must not contain '/' or '|'"));
        }
        Ok(())
    }

    pub(crate) fn paths(&self) -> ZkPaths {
        ZkPaths::new(&self.base_path, &self.cluster_name)
    }
}

fn invalid(msg: &str) -> DiscoveryError {
    DiscoveryError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
