//! Cluster metadata kept in the coordination service
//!
//! Stores:
//! - Ring snapshot (every active node in ring order) at the metadata root
//! - One record per active node at `<server root>/<port>/metadata`

use crate::common::{key_hash, Error, HashRange, Result, RingHash};
use crate::coordination::{ensure_path, put, Coordination};
use crate::coordinator::node::{
    DataStatus, EvictionPolicy, LifecycleState, NodeDescriptor, PendingFlag,
};
use crate::coordinator::protocol::Paths;
use crate::coordinator::ring::PartitionRing;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Published view of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub cache_capacity: usize,
    pub eviction_policy: EvictionPolicy,
    pub hash: RingHash,
    pub range: HashRange,
    pub state: LifecycleState,
    pub pending: PendingFlag,
    pub data: DataStatus,
}

impl NodeRecord {
    pub fn new(node: &NodeDescriptor, range: HashRange) -> Self {
        Self {
            name: node.name.clone(),
            host: node.host.clone(),
            port: node.port,
            cache_capacity: node.cache_capacity,
            eviction_policy: node.eviction_policy,
            hash: node.hash,
            range,
            state: node.state,
            pending: node.pending,
            data: node.data,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_responsible_for(&self, key: &str) -> bool {
        self.range.contains(key_hash(key))
    }
}

/// Ring order list of node records, serialized as a bare JSON array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RingSnapshot {
    pub nodes: Vec<NodeRecord>,
}

impl RingSnapshot {
    pub fn new(nodes: Vec<NodeRecord>) -> Self {
        Self { nodes }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// An empty payload is an empty ring (fresh metadata znode)
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(payload)?)
    }

    /// Rebuild the ring the snapshot was taken from.
    ///
    /// Fails if a recorded range disagrees with the rebuilt one.
    pub fn to_ring(&self) -> Result<PartitionRing> {
        let mut ring = PartitionRing::new();
        for node in &self.nodes {
            ring.insert(node.name.clone(), node.hash)?;
        }
        for node in &self.nodes {
            if ring.range_of(&node.name) != Some(node.range) {
                return Err(Error::Other(format!(
                    "snapshot range of {} is {} but the ring gives {:?}",
                    node.name, node.range, ring.range_of(&node.name)
                )));
            }
        }
        Ok(ring)
    }
}

/// Writes and reads cluster metadata znodes
pub struct MetadataStore {
    coord: Arc<dyn Coordination>,
    paths: Paths,
}

impl MetadataStore {
    pub fn new(coord: Arc<dyn Coordination>, paths: Paths) -> Self {
        Self { coord, paths }
    }

    // === Ring snapshot ===

    pub async fn put_snapshot(&self, snapshot: &RingSnapshot) -> Result<()> {
        put(
            self.coord.as_ref(),
            self.paths.ring_snapshot(),
            &snapshot.encode()?,
        )
        .await
    }

    pub async fn get_snapshot(&self) -> Result<RingSnapshot> {
        match self.coord.get_data(self.paths.ring_snapshot()).await {
            Ok((data, _)) => RingSnapshot::decode(&data),
            Err(Error::NoNode(_)) => Ok(RingSnapshot::default()),
            Err(e) => Err(e),
        }
    }

    // === Node records ===

    pub async fn put_node(&self, record: &NodeRecord) -> Result<()> {
        ensure_path(self.coord.as_ref(), &self.paths.server(record.port)).await?;
        put(
            self.coord.as_ref(),
            &self.paths.node_metadata(record.port),
            &serde_json::to_vec(record)?,
        )
        .await
    }

    /// One record per node, then the snapshot
    pub async fn persist(&self, snapshot: &RingSnapshot) -> Result<()> {
        for record in &snapshot.nodes {
            self.put_node(record).await?;
        }
        self.put_snapshot(snapshot).await?;
        tracing::debug!("Persisted ring metadata ({} nodes)", snapshot.nodes.len());
        Ok(())
    }
}
