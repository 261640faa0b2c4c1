// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! aviary-zk: ZooKeeper client facade for the aviary discovery engine
//!
//! The engine talks to ZooKeeper through the [`ZkSession`] trait; watch
//! notifications and session termination arrive as [`SessionEvent`] messages
//! on a channel instead of callbacks, so the engine can drain them on a single
//! dispatch lane. [`ZkClient`] layers retries and a terminal failure latch on
//! top of a raw session.

mod client;
mod types;

#[cfg(any(test, feature = "test-support"))]
mod memory;

pub use client::{ZkClient, ZkSession};
pub use types::{CreateMode, SessionEvent, Stat, WatchKind, WatchedEvent, ZkError};

#[cfg(any(test, feature = "test-support"))]
pub use memory::{MemorySession, MemoryZk};
