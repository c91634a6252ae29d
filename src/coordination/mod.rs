//! Coordination service client
//!
//! A hierarchical namespace of versioned znodes with byte payloads, one-shot
//! watches and a connection-state feed. The coordinator uses it both as the
//! control bus to storage nodes and as the store for cluster metadata.
//!
//! - [`Coordination`]: the operations the coordinator needs
//! - [`MemoryCoordination`]: in-process namespace (served over HTTP by the ECS binary)
//! - [`http`]: axum routes exposing a namespace to storage node processes

pub mod http;
pub mod memory;

pub use memory::MemoryCoordination;

use crate::common::{retry_with_backoff, Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

/// Metadata of a znode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Bumped on every `set_data`; 0 after `create`
    pub version: i32,
    pub num_children: usize,
    pub ctime: u64,
    pub mtime: u64,
}

/// Session state towards the coordination service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Notification delivered to a one-shot watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "path", rename_all = "snake_case")]
pub enum WatchEvent {
    Created(String),
    DataChanged(String),
    ChildrenChanged(String),
    Deleted(String),
    Disconnected,
}

/// A registered one-shot watch
pub struct Watch {
    rx: oneshot::Receiver<WatchEvent>,
}

impl Watch {
    pub fn new(rx: oneshot::Receiver<WatchEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the watch to fire. A dropped service counts as a disconnect.
    pub async fn fired(self) -> WatchEvent {
        self.rx.await.unwrap_or(WatchEvent::Disconnected)
    }
}

#[async_trait]
pub trait Coordination: Send + Sync {
    async fn exists(&self, path: &str) -> Result<Option<Stat>>;

    /// Create a persistent znode. Fails if it exists or its parent does not.
    async fn create(&self, path: &str, data: Vec<u8>) -> Result<()>;

    async fn get_data(&self, path: &str) -> Result<(Vec<u8>, Stat)>;

    /// Overwrite the payload. `Some(v)` fails with `VersionConflict` unless the
    /// current version is `v`.
    async fn set_data(&self, path: &str, data: Vec<u8>, expected_version: Option<i32>)
        -> Result<Stat>;

    /// Delete a childless znode, optionally checking its version.
    async fn delete(&self, path: &str, expected_version: Option<i32>) -> Result<()>;

    async fn get_children(&self, path: &str) -> Result<Vec<String>>;

    /// Fires once when the znode is created, changed or deleted.
    async fn watch_data(&self, path: &str) -> Result<Watch>;

    /// Fires once when a child is added or removed, or the znode is deleted.
    async fn watch_children(&self, path: &str) -> Result<Watch>;

    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}

pub fn is_connected(coord: &dyn Coordination) -> bool {
    *coord.connection_state().borrow() == ConnectionState::Connected
}

/// Join a parent path and a child name
pub fn join_path(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Parent of an absolute path (`None` for the root)
pub fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

pub fn validate_path(path: &str) -> Result<()> {
    if path == "/" {
        return Ok(());
    }
    if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
        return Err(Error::InvalidConfig(format!("invalid znode path: {:?}", path)));
    }
    Ok(())
}

/// Create `path` and any missing ancestors with empty payloads.
pub async fn ensure_path(coord: &dyn Coordination, path: &str) -> Result<()> {
    validate_path(path)?;
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        if coord.exists(&current).await?.is_none() {
            match coord.create(&current, Vec::new()).await {
                Ok(()) | Err(Error::NodeExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

/// Create or overwrite `path`, retrying on concurrent writers.
pub async fn put(coord: &dyn Coordination, path: &str, data: &[u8]) -> Result<()> {
    retry_with_backoff(
        || async move {
            match coord.exists(path).await? {
                Some(stat) => coord
                    .set_data(path, data.to_vec(), Some(stat.version))
                    .await
                    .map(|_| ()),
                None => coord.create(path, data.to_vec()).await,
            }
        },
        3,
        Duration::from_millis(10),
    )
    .await
}

/// Delete `path` and everything below it. A missing znode is not an error.
pub async fn delete_recursive(coord: &dyn Coordination, path: &str) -> Result<()> {
    let mut stack = vec![path.to_string()];
    let mut order = Vec::new();
    while let Some(current) = stack.pop() {
        match coord.get_children(&current).await {
            Ok(children) => {
                stack.extend(children.iter().map(|c| join_path(&current, c)));
                order.push(current);
            }
            Err(Error::NoNode(_)) => {}
            Err(e) => return Err(e),
        }
    }
    for node in order.iter().rev() {
        match coord.delete(node, None).await {
            Ok(()) | Err(Error::NoNode(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
