// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn defaults_are_valid() {
    let config = DiscoveryConfig::new("localhost:2181", "prod");
    config.validate().unwrap();
    assert_eq!(config.base_path, "/aviary");
    assert!(config.ack_threshold >= 1);
}

#[test]
fn paths_are_rooted_at_base_and_cluster() {
    let config = DiscoveryConfig::new("localhost:2181", "prod");
    assert_eq!(config.paths().root(), "/aviary/prod");
}

#[parameterized(
    empty_connect = { "", "prod", "/aviary" },
    blank_connect = { "  ", "prod", "/aviary" },
    relative_base = { "zk:2181", "prod", "aviary" },
    trailing_slash = { "zk:2181", "prod", "/aviary/" },
    empty_segment = { "zk:2181", "prod", "/aviary//x" },
    bare_root = { "zk:2181", "prod", "/" },
    empty_cluster = { "zk:2181", "", "/aviary" },
    slash_in_cluster = { "zk:2181", "a/b", "/aviary" },
    pipe_in_cluster = { "zk:2181", "a|b", "/aviary" },
)]
fn invalid_configs_are_rejected(connect: &str, cluster: &str, base: &str) {
    let mut config = DiscoveryConfig::new(connect, cluster);
    config.base_path = base.to_string();
    assert!(matches!(config.validate(), Err(DiscoveryError::InvalidConfig(_))));
}

#[test]
fn nested_base_path_is_accepted() {
    let mut config = DiscoveryConfig::new("zk:2181", "prod");
    config.base_path = "/infra/discovery".to_string();
    config.validate().unwrap();
    assert_eq!(config.paths().root(), "/infra/discovery/prod");
}
