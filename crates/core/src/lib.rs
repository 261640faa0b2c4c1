// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! aviary-core: data model for the aviary cluster discovery engine
//!
//! Holds everything the coordinator and replay machinery agree on: node
//! identity, the three-index cluster view, the ordered discovery event log
//! with per-event ack tracking, the ZooKeeper path schema with its name
//! codecs, and the opaque payload codec boundary.

pub mod clock;
pub mod codec;
pub mod event;
pub mod node;
pub mod paths;
pub mod view;

pub use clock::{Clock, FakeClock, SystemClock};
pub use codec::{Codec, CodecError, JsonCodec};
pub use event::{DiscoveryEvent, EventKind, EventLog};
pub use node::{ClusterNode, NodeId};
pub use paths::{parse_created_seq, AliveName, PathError, SubmissionName, ZkPaths};
pub use view::ClusterView;
