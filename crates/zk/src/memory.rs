// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory ZooKeeper stand-in for tests.
//!
//! Models the znode tree with data versions, ephemeral owners, per-parent
//! ten-digit sequential counters, and one-shot data/child/exists watches.
//! Multiple sessions can connect; `expire_session` drops a session's
//! ephemerals (firing watches on survivors) and delivers `ConnectionLost`,
//! which is exactly the failure surface the engine has to handle.

use crate::types::{CreateMode, SessionEvent, Stat, WatchKind, WatchedEvent, ZkError};
use crate::ZkSession;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct Znode {
    data: Vec<u8>,
    version: i32,
    ephemeral_owner: Option<u64>,
    next_seq: u64,
    data_watchers: Vec<u64>,
    child_watchers: Vec<u64>,
    exists_watchers: Vec<u64>,
}

struct Session {
    tx: mpsc::UnboundedSender<SessionEvent>,
    alive: bool,
}

#[derive(Default)]
struct Ensemble {
    nodes: BTreeMap<String, Znode>,
    sessions: HashMap<u64, Session>,
    absent_watchers: HashMap<String, Vec<u64>>,
    next_session_id: u64,
}

impl Ensemble {
    fn parent_of(path: &str) -> Option<&str> {
        match path.rsplit_once('/') {
            Some(("", _)) | None => None,
            Some((parent, _)) => Some(parent),
        }
    }

    fn fire(&mut self, notices: Vec<(u64, WatchedEvent)>) {
        for (session_id, event) in notices {
            if let Some(session) = self.sessions.get(&session_id) {
                if session.alive {
                    let _ = session.tx.send(SessionEvent::Watch(event));
                }
            }
        }
    }

    fn check_alive(&self, session_id: u64) -> Result<(), ZkError> {
        match self.sessions.get(&session_id) {
            Some(s) if s.alive => Ok(()),
            _ => Err(ZkError::SessionExpired),
        }
    }

    fn child_names(&self, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k[prefix.len()..].contains('/'))
            .map(|(k, _)| k[prefix.len()..].to_string())
            .collect()
    }

    /// Remove a node and collect the watch notifications it triggers.
    fn remove_node(&mut self, path: &str) -> Vec<(u64, WatchedEvent)> {
        let mut notices = Vec::new();
        if let Some(mut node) = self.nodes.remove(path) {
            for sid in node.data_watchers.drain(..).chain(node.exists_watchers.drain(..)) {
                notices.push((
                    sid,
                    WatchedEvent { path: path.to_string(), kind: WatchKind::Deleted },
                ));
            }
            if let Some(parent) = Self::parent_of(path) {
                let parent = parent.to_string();
                if let Some(p) = self.nodes.get_mut(&parent) {
                    for sid in p.child_watchers.drain(..) {
                        notices.push((
                            sid,
                            WatchedEvent { path: parent.clone(), kind: WatchKind::ChildrenChanged },
                        ));
                    }
                }
            }
        }
        notices
    }
}

/// Shared in-memory ensemble; hand out sessions with [`MemoryZk::connect`].
#[derive(Clone, Default)]
pub struct MemoryZk {
    inner: Arc<Mutex<Ensemble>>,
}

impl MemoryZk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session. The receiver carries watch fires and the terminal
    /// `ConnectionLost`.
    pub fn connect(&self) -> (Arc<MemorySession>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut zk = self.inner.lock();
        let id = zk.next_session_id;
        zk.next_session_id += 1;
        zk.sessions.insert(id, Session { tx, alive: true });
        (Arc::new(MemorySession { id, inner: Arc::clone(&self.inner) }), rx)
    }

    /// Kill a session: its ephemerals vanish (watches fire on survivors) and
    /// the session receives `ConnectionLost`.
    pub fn expire_session(&self, session_id: u64) {
        let mut zk = self.inner.lock();
        let Some(session) = zk.sessions.get_mut(&session_id) else {
            return;
        };
        if !session.alive {
            return;
        }
        session.alive = false;
        let tx = session.tx.clone();

        let ephemerals: Vec<String> = zk
            .nodes
            .iter()
            .filter(|(_, n)| n.ephemeral_owner == Some(session_id))
            .map(|(k, _)| k.clone())
            .collect();
        for path in ephemerals {
            let notices = zk.remove_node(&path);
            zk.fire(notices);
        }
        let _ = tx.send(SessionEvent::ConnectionLost);
    }

    // -- inspection helpers for tests --

    pub fn node_exists(&self, path: &str) -> bool {
        self.inner.lock().nodes.contains_key(path)
    }

    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.lock().nodes.get(path).map(|n| n.data.clone())
    }

    pub fn children(&self, path: &str) -> Vec<String> {
        self.inner.lock().child_names(path)
    }
}

/// One session against a [`MemoryZk`] ensemble.
pub struct MemorySession {
    id: u64,
    inner: Arc<Mutex<Ensemble>>,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
impl ZkSession for MemorySession {
    async fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
    ) -> Result<String, ZkError> {
        let mut zk = self.inner.lock();
        zk.check_alive(self.id)?;

        if !path.starts_with('/') || path.len() < 2 {
            return Err(ZkError::Protocol(format!("invalid path: {path}")));
        }

        let final_path = if mode.is_sequential() {
            let Some(parent) = Ensemble::parent_of(path).map(str::to_string) else {
                return Err(ZkError::Protocol(format!("sequential create at root: {path}")));
            };
            let Some(p) = zk.nodes.get_mut(&parent) else {
                return Err(ZkError::NoNode(parent));
            };
            let seq = p.next_seq;
            p.next_seq += 1;
            format!("{path}{seq:010}")
        } else {
            if let Some(parent) = Ensemble::parent_of(path) {
                if !zk.nodes.contains_key(parent) {
                    return Err(ZkError::NoNode(parent.to_string()));
                }
            }
            path.to_string()
        };

        if zk.nodes.contains_key(&final_path) {
            return Err(ZkError::NodeExists(final_path));
        }

        zk.nodes.insert(
            final_path.clone(),
            Znode {
                data,
                ephemeral_owner: mode.is_ephemeral().then_some(self.id),
                ..Znode::default()
            },
        );

        let mut notices = Vec::new();
        if let Some(parent) = Ensemble::parent_of(&final_path).map(str::to_string) {
            if let Some(p) = zk.nodes.get_mut(&parent) {
                for sid in p.child_watchers.drain(..) {
                    notices.push((
                        sid,
                        WatchedEvent { path: parent.clone(), kind: WatchKind::ChildrenChanged },
                    ));
                }
            }
        }
        if let Some(watchers) = zk.absent_watchers.remove(&final_path) {
            for sid in watchers {
                notices.push((
                    sid,
                    WatchedEvent { path: final_path.clone(), kind: WatchKind::Created },
                ));
            }
        }
        zk.fire(notices);
        Ok(final_path)
    }

    async fn get_data(&self, path: &str, watch: bool) -> Result<(Vec<u8>, Stat), ZkError> {
        let mut zk = self.inner.lock();
        zk.check_alive(self.id)?;
        let id = self.id;
        let Some(node) = zk.nodes.get_mut(path) else {
            return Err(ZkError::NoNode(path.to_string()));
        };
        if watch {
            node.data_watchers.push(id);
        }
        Ok((node.data.clone(), Stat { version: node.version }))
    }

    async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        version: Option<i32>,
    ) -> Result<Stat, ZkError> {
        let mut zk = self.inner.lock();
        zk.check_alive(self.id)?;
        let Some(node) = zk.nodes.get_mut(path) else {
            return Err(ZkError::NoNode(path.to_string()));
        };
        if let Some(expected) = version {
            if expected != node.version {
                return Err(ZkError::BadVersion(path.to_string()));
            }
        }
        node.data = data;
        node.version += 1;
        let stat = Stat { version: node.version };
        let watchers: Vec<u64> =
            node.data_watchers.drain(..).chain(node.exists_watchers.drain(..)).collect();
        let notices = watchers
            .into_iter()
            .map(|sid| {
                (sid, WatchedEvent { path: path.to_string(), kind: WatchKind::DataChanged })
            })
            .collect();
        zk.fire(notices);
        Ok(stat)
    }

    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, ZkError> {
        let mut zk = self.inner.lock();
        zk.check_alive(self.id)?;
        if !zk.nodes.contains_key(path) {
            return Err(ZkError::NoNode(path.to_string()));
        }
        let children = zk.child_names(path);
        if watch {
            let id = self.id;
            if let Some(node) = zk.nodes.get_mut(path) {
                node.child_watchers.push(id);
            }
        }
        Ok(children)
    }

    async fn exists(&self, path: &str, watch: bool) -> Result<Option<Stat>, ZkError> {
        let mut zk = self.inner.lock();
        zk.check_alive(self.id)?;
        let id = self.id;
        match zk.nodes.get_mut(path) {
            Some(node) => {
                if watch {
                    node.exists_watchers.push(id);
                }
                Ok(Some(Stat { version: node.version }))
            }
            None => {
                if watch {
                    zk.absent_watchers.entry(path.to_string()).or_default().push(id);
                }
                Ok(None)
            }
        }
    }

    async fn delete(&self, path: &str) -> Result<(), ZkError> {
        let mut zk = self.inner.lock();
        zk.check_alive(self.id)?;
        if !zk.nodes.contains_key(path) {
            return Err(ZkError::NoNode(path.to_string()));
        }
        if !zk.child_names(path).is_empty() {
            return Err(ZkError::NotEmpty(path.to_string()));
        }
        let notices = zk.remove_node(path);
        zk.fire(notices);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
