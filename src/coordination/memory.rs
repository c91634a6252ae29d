//! In-process coordination namespace
//!
//! Znodes live in a `BTreeMap` keyed by absolute path, so the children of a
//! znode are a contiguous key range. Watches are one-shot senders removed
//! when they fire; senders whose `Watch` was dropped are pruned on the next
//! registration.

use super::{parent_of, validate_path, ConnectionState, Coordination, Stat, Watch, WatchEvent};
use crate::common::{timestamp_now_millis, Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{oneshot, watch};

#[derive(Debug, Clone)]
struct Znode {
    data: Vec<u8>,
    version: i32,
    ctime: u64,
    mtime: u64,
}

#[derive(Default)]
struct Namespace {
    nodes: BTreeMap<String, Znode>,
    data_watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
    child_watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
}

impl Namespace {
    fn children(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let rest = &k[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    fn stat(&self, path: &str, node: &Znode) -> Stat {
        Stat {
            version: node.version,
            num_children: self.children(path).len(),
            ctime: node.ctime,
            mtime: node.mtime,
        }
    }

    fn register(
        watches: &mut HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
        path: &str,
    ) -> Watch {
        watches.retain(|_, senders| {
            senders.retain(|tx| !tx.is_closed());
            !senders.is_empty()
        });
        let (tx, rx) = oneshot::channel();
        watches.entry(path.to_string()).or_default().push(tx);
        Watch::new(rx)
    }

    fn fire(
        watches: &mut HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
        path: &str,
        event: WatchEvent,
    ) {
        if let Some(senders) = watches.remove(path) {
            for tx in senders {
                let _ = tx.send(event.clone());
            }
        }
    }

    fn fire_all(&mut self, event: WatchEvent) {
        for (_, senders) in self.data_watches.drain().chain(self.child_watches.drain()) {
            for tx in senders {
                let _ = tx.send(event.clone());
            }
        }
    }
}

/// Coordination service kept entirely in memory
pub struct MemoryCoordination {
    inner: Mutex<Namespace>,
    state: watch::Sender<ConnectionState>,
}

impl MemoryCoordination {
    pub fn new() -> Self {
        let now = timestamp_now_millis();
        let mut ns = Namespace::default();
        ns.nodes.insert(
            "/".to_string(),
            Znode {
                data: Vec::new(),
                version: 0,
                ctime: now,
                mtime: now,
            },
        );
        let (state, _) = watch::channel(ConnectionState::Connected);
        Self {
            inner: Mutex::new(ns),
            state,
        }
    }

    /// Simulate losing the session: every call fails and pending watches fire.
    pub fn disconnect(&self) {
        self.inner.lock().fire_all(WatchEvent::Disconnected);
        self.state.send_replace(ConnectionState::Disconnected);
        tracing::warn!("Coordination session disconnected");
    }

    pub fn reconnect(&self) {
        self.state.send_replace(ConnectionState::Connected);
        tracing::info!("Coordination session reconnected");
    }

    fn check_connected(&self) -> Result<()> {
        if *self.state.borrow() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(Error::CoordinationUnavailable("session disconnected".into()))
        }
    }
}

impl Default for MemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Coordination for MemoryCoordination {
    async fn exists(&self, path: &str) -> Result<Option<Stat>> {
        self.check_connected()?;
        validate_path(path)?;
        let ns = self.inner.lock();
        Ok(ns.nodes.get(path).map(|n| ns.stat(path, n)))
    }

    async fn create(&self, path: &str, data: Vec<u8>) -> Result<()> {
        self.check_connected()?;
        validate_path(path)?;
        let parent = parent_of(path).ok_or_else(|| Error::NodeExists(path.to_string()))?;

        let mut ns = self.inner.lock();
        if ns.nodes.contains_key(path) {
            return Err(Error::NodeExists(path.to_string()));
        }
        if !ns.nodes.contains_key(parent) {
            return Err(Error::NoNode(parent.to_string()));
        }
        let now = timestamp_now_millis();
        ns.nodes.insert(
            path.to_string(),
            Znode {
                data,
                version: 0,
                ctime: now,
                mtime: now,
            },
        );
        Namespace::fire(
            &mut ns.data_watches,
            path,
            WatchEvent::Created(path.to_string()),
        );
        Namespace::fire(
            &mut ns.child_watches,
            parent,
            WatchEvent::ChildrenChanged(parent.to_string()),
        );
        Ok(())
    }

    async fn get_data(&self, path: &str) -> Result<(Vec<u8>, Stat)> {
        self.check_connected()?;
        validate_path(path)?;
        let ns = self.inner.lock();
        let node = ns
            .nodes
            .get(path)
            .ok_or_else(|| Error::NoNode(path.to_string()))?;
        Ok((node.data.clone(), ns.stat(path, node)))
    }

    async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        expected_version: Option<i32>,
    ) -> Result<Stat> {
        self.check_connected()?;
        validate_path(path)?;
        let mut ns = self.inner.lock();
        let node = ns
            .nodes
            .get_mut(path)
            .ok_or_else(|| Error::NoNode(path.to_string()))?;
        if let Some(expected) = expected_version {
            if node.version != expected {
                return Err(Error::VersionConflict {
                    path: path.to_string(),
                    expected,
                    actual: node.version,
                });
            }
        }
        node.data = data;
        node.version += 1;
        node.mtime = timestamp_now_millis();
        let node = node.clone();

        Namespace::fire(
            &mut ns.data_watches,
            path,
            WatchEvent::DataChanged(path.to_string()),
        );
        Ok(ns.stat(path, &node))
    }

    async fn delete(&self, path: &str, expected_version: Option<i32>) -> Result<()> {
        self.check_connected()?;
        validate_path(path)?;
        let parent = parent_of(path)
            .ok_or_else(|| Error::InvalidConfig("cannot delete the root znode".into()))?;

        let mut ns = self.inner.lock();
        let node = ns
            .nodes
            .get(path)
            .ok_or_else(|| Error::NoNode(path.to_string()))?;
        if let Some(expected) = expected_version {
            if node.version != expected {
                return Err(Error::VersionConflict {
                    path: path.to_string(),
                    expected,
                    actual: node.version,
                });
            }
        }
        if !ns.children(path).is_empty() {
            return Err(Error::NotEmpty(path.to_string()));
        }
        ns.nodes.remove(path);

        let deleted = WatchEvent::Deleted(path.to_string());
        Namespace::fire(&mut ns.data_watches, path, deleted.clone());
        Namespace::fire(&mut ns.child_watches, path, deleted);
        Namespace::fire(
            &mut ns.child_watches,
            parent,
            WatchEvent::ChildrenChanged(parent.to_string()),
        );
        Ok(())
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        self.check_connected()?;
        validate_path(path)?;
        let ns = self.inner.lock();
        if !ns.nodes.contains_key(path) {
            return Err(Error::NoNode(path.to_string()));
        }
        Ok(ns.children(path))
    }

    async fn watch_data(&self, path: &str) -> Result<Watch> {
        self.check_connected()?;
        validate_path(path)?;
        let mut ns = self.inner.lock();
        Ok(Namespace::register(&mut ns.data_watches, path))
    }

    async fn watch_children(&self, path: &str) -> Result<Watch> {
        self.check_connected()?;
        validate_path(path)?;
        let mut ns = self.inner.lock();
        if !ns.nodes.contains_key(path) {
            return Err(Error::NoNode(path.to_string()));
        }
        Ok(Namespace::register(&mut ns.child_watches, path))
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}
