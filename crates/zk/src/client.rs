// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session trait and the retrying client wrapper

use crate::types::{CreateMode, Stat, ZkError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Raw ZooKeeper session operations.
///
/// `watch: true` arms a one-shot watch on the touched path; the fire is
/// delivered as a [`crate::SessionEvent::Watch`] on the session's event
/// channel. Session termination delivers [`crate::SessionEvent::ConnectionLost`]
/// exactly once, after which every operation fails with
/// [`ZkError::SessionExpired`].
#[async_trait]
pub trait ZkSession: Send + Sync + 'static {
    /// Create a znode, returning the full path of the created node (including
    /// any assigned sequence suffix).
    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode)
        -> Result<String, ZkError>;

    async fn get_data(&self, path: &str, watch: bool) -> Result<(Vec<u8>, Stat), ZkError>;

    /// `version: None` writes unconditionally (ZooKeeper's version -1).
    async fn set_data(&self, path: &str, data: Vec<u8>, version: Option<i32>)
        -> Result<Stat, ZkError>;

    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, ZkError>;

    async fn exists(&self, path: &str, watch: bool) -> Result<Option<Stat>, ZkError>;

    async fn delete(&self, path: &str) -> Result<(), ZkError>;
}

const RETRY_DELAY_MS: u64 = 100;
const MAX_RETRY_DELAY_MS: u64 = 2_000;

/// Retrying facade over a raw [`ZkSession`].
///
/// Transient errors are retried with capped backoff until the operation
/// succeeds. Session expiry trips a terminal latch; once latched, every call
/// fails fast with [`ZkError::ClientFailed`].
#[derive(Clone)]
pub struct ZkClient {
    session: Arc<dyn ZkSession>,
    failed: Arc<AtomicBool>,
}

macro_rules! with_retry {
    ($self:ident, $op:literal, $call:expr) => {{
        let mut delay = RETRY_DELAY_MS;
        loop {
            $self.check()?;
            match $call {
                Ok(v) => break Ok(v),
                Err(e) if e.is_transient() => {
                    warn!(op = $op, delay_ms = delay, error = %e, "transient zookeeper error, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY_MS);
                }
                Err(e) => break Err($self.escalate(e)),
            }
        }
    }};
}

impl ZkClient {
    pub fn new(session: Arc<dyn ZkSession>) -> Self {
        Self { session, failed: Arc::new(AtomicBool::new(false)) }
    }

    /// True once the terminal latch has tripped.
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Trip the terminal latch. Returns true iff this call tripped it.
    pub fn fail(&self) -> bool {
        !self.failed.swap(true, Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ZkError> {
        if self.is_failed() {
            return Err(ZkError::ClientFailed);
        }
        Ok(())
    }

    fn escalate(&self, err: ZkError) -> ZkError {
        if err.is_terminal() {
            self.fail();
            return ZkError::ClientFailed;
        }
        err
    }

    pub async fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
    ) -> Result<String, ZkError> {
        with_retry!(self, "create", self.session.create(path, data.clone(), mode).await)
    }

    pub async fn get_data(&self, path: &str, watch: bool) -> Result<(Vec<u8>, Stat), ZkError> {
        with_retry!(self, "get_data", self.session.get_data(path, watch).await)
    }

    pub async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        version: Option<i32>,
    ) -> Result<Stat, ZkError> {
        with_retry!(self, "set_data", self.session.set_data(path, data.clone(), version).await)
    }

    pub async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, ZkError> {
        with_retry!(self, "get_children", self.session.get_children(path, watch).await)
    }

    pub async fn exists(&self, path: &str, watch: bool) -> Result<Option<Stat>, ZkError> {
        with_retry!(self, "exists", self.session.exists(path, watch).await)
    }

    pub async fn delete(&self, path: &str) -> Result<(), ZkError> {
        with_retry!(self, "delete", self.session.delete(path).await)
    }

    /// Create every path as PERSISTENT, in order, ignoring ones that exist.
    pub async fn create_all_if_needed(&self, paths: &[String]) -> Result<(), ZkError> {
        for path in paths {
            match self.create(path, Vec::new(), CreateMode::Persistent).await {
                Ok(_) | Err(ZkError::NodeExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Delete a znode, treating an already-missing node as success.
    pub async fn delete_if_exists(&self, path: &str) -> Result<(), ZkError> {
        match self.delete(path).await {
            Ok(()) | Err(ZkError::NoNode(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
