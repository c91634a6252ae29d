//! Shared fixtures: an in-memory namespace, a coordinator over it and a
//! stand-in for the storage node processes.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use ringkv::common::{EcsConfig, HashRange};
use ringkv::coordination::{
    join_path, ConnectionState, Coordination, MemoryCoordination, Stat, Watch,
};
use ringkv::coordinator::inventory::ServerEntry;
use ringkv::coordinator::launcher::{NodeLauncher, NoopLauncher};
use ringkv::coordinator::{Command, Coordinator, NodeDescriptor};
use ringkv::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const BASE_PORT: u16 = 50000;

pub fn inventory(n: u16) -> Vec<ServerEntry> {
    (0..n)
        .map(|i| ServerEntry {
            name: format!("server_{}", i + 1),
            host: "127.0.0.1".into(),
            port: BASE_PORT + i,
        })
        .collect()
}

pub fn test_config() -> EcsConfig {
    EcsConfig {
        broadcast_timeout_ms: 500,
        migration_timeout_ms: 1_000,
        ..EcsConfig::default()
    }
}

pub async fn cluster(n: u16) -> (Arc<Coordinator>, Arc<MemoryCoordination>) {
    cluster_with(n, test_config()).await
}

pub async fn cluster_with(
    n: u16,
    config: EcsConfig,
) -> (Arc<Coordinator>, Arc<MemoryCoordination>) {
    let coord = Arc::new(MemoryCoordination::new());
    let ecs = Coordinator::new(coord.clone(), Arc::new(NoopLauncher), &config, inventory(n))
        .await
        .unwrap();
    (Arc::new(ecs), coord)
}

/// What a storage node was asked to push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedTransfer {
    pub source_port: u16,
    pub target_port: u16,
    pub range: HashRange,
}

/// Plays every storage node: answers `KV_TRANSFER` with `TRANSFER_FINISH`.
pub struct StorageNodes {
    transfers: Arc<Mutex<Vec<ObservedTransfer>>>,
    paused: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl StorageNodes {
    pub fn spawn(coord: Arc<MemoryCoordination>) -> Self {
        let transfers = Arc::new(Mutex::new(Vec::new()));
        let paused = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(answer_transfers(
            coord,
            transfers.clone(),
            paused.clone(),
        ));
        Self {
            transfers,
            paused,
            task,
        }
    }

    pub fn transfers(&self) -> Vec<ObservedTransfer> {
        self.transfers.lock().clone()
    }

    /// Stop answering, so migrations hang
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }
}

impl Drop for StorageNodes {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn answer_transfers(
    coord: Arc<MemoryCoordination>,
    transfers: Arc<Mutex<Vec<ObservedTransfer>>>,
    paused: Arc<AtomicBool>,
) {
    loop {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if paused.load(Ordering::SeqCst) {
            continue;
        }
        let Ok(ports) = coord.get_children("/server").await else {
            continue;
        };
        for port in ports {
            let op = join_path(&join_path("/server", &port), "op");
            let Ok((data, stat)) = coord.get_data(&op).await else {
                continue;
            };
            if let Ok(Command::KvTransfer { target_port, range }) = Command::decode(&data) {
                let finished = coord
                    .set_data(&op, Command::TransferFinish.encode(), Some(stat.version))
                    .await;
                if finished.is_ok() {
                    transfers.lock().push(ObservedTransfer {
                        source_port: port.parse().unwrap_or_default(),
                        target_port,
                        range,
                    });
                }
            }
        }
    }
}

/// What a launched storage process does once it is up
pub async fn register(coord: &MemoryCoordination, port: u16) {
    coord
        .create(&format!("/awaitNodes/{}", port), Vec::new())
        .await
        .unwrap();
}

/// Namespace whose writes to the ring snapshot can be made to fail
pub struct FailingSnapshot {
    inner: Arc<MemoryCoordination>,
    snapshot_path: String,
    failing: AtomicBool,
}

impl FailingSnapshot {
    pub fn new(inner: Arc<MemoryCoordination>) -> Self {
        Self {
            inner,
            snapshot_path: "/metadata".into(),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_snapshot_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn check(&self, path: &str) -> Result<()> {
        if path == self.snapshot_path && self.failing.load(Ordering::SeqCst) {
            return Err(Error::CoordinationUnavailable(format!("write to {} refused", path)));
        }
        Ok(())
    }
}

#[async_trait]
impl Coordination for FailingSnapshot {
    async fn exists(&self, path: &str) -> Result<Option<Stat>> {
        self.inner.exists(path).await
    }

    async fn create(&self, path: &str, data: Vec<u8>) -> Result<()> {
        self.check(path)?;
        self.inner.create(path, data).await
    }

    async fn get_data(&self, path: &str) -> Result<(Vec<u8>, Stat)> {
        self.inner.get_data(path).await
    }

    async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        expected_version: Option<i32>,
    ) -> Result<Stat> {
        self.check(path)?;
        self.inner.set_data(path, data, expected_version).await
    }

    async fn delete(&self, path: &str, expected_version: Option<i32>) -> Result<()> {
        self.inner.delete(path, expected_version).await
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        self.inner.get_children(path).await
    }

    async fn watch_data(&self, path: &str) -> Result<Watch> {
        self.inner.watch_data(path).await
    }

    async fn watch_children(&self, path: &str) -> Result<Watch> {
        self.inner.watch_children(path).await
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state()
    }
}

/// Remembers which nodes were launched
#[derive(Default)]
pub struct RecordingLauncher {
    launched: Mutex<Vec<String>>,
}

impl RecordingLauncher {
    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().clone()
    }
}

#[async_trait]
impl NodeLauncher for RecordingLauncher {
    async fn launch(&self, node: &NodeDescriptor) -> Result<()> {
        self.launched.lock().push(node.name.clone());
        Ok(())
    }
}
