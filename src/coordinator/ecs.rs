//! External configuration service (ECS)
//!
//! Owns the partition ring, the descriptor of every inventory server and the
//! pool of servers not in the ring. All membership and lifecycle changes go
//! through here:
//!
//! 1. validate (nothing changes on failure)
//! 2. mutate ring and descriptors, migrating ranges where needed
//! 3. persist the ring snapshot and per-node records
//! 4. broadcast the command to the affected nodes

use crate::common::{key_hash, EcsConfig, Error, Result, RingHash};
use crate::coordination::{
    delete_recursive, ensure_path, is_connected, join_path, put, Coordination, WatchEvent,
};
use crate::coordinator::inventory::{load_inventory, ServerEntry};
use crate::coordinator::latch::QuorumLatch;
use crate::coordinator::launcher::{launcher_for, NodeLauncher};
use crate::coordinator::metadata::{MetadataStore, NodeRecord, RingSnapshot};
use crate::coordinator::migration::{self, Transfer};
use crate::coordinator::node::{DataStatus, EvictionPolicy, LifecycleState, NodeDescriptor};
use crate::coordinator::protocol::{Command, Paths};
use crate::coordinator::ring::PartitionRing;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Default)]
struct Cluster {
    ring: PartitionRing,
    /// Every inventory server, active or not
    nodes: HashMap<String, NodeDescriptor>,
    /// Inventory names outside the ring, in hand-out order
    available: VecDeque<String>,
    /// Registrations already matched by `await_nodes`
    registered: usize,
}

impl Cluster {
    fn node(&self, name: &str) -> Result<&NodeDescriptor> {
        self.nodes
            .get(name)
            .ok_or_else(|| Error::UnknownNodeName(name.to_string()))
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut NodeDescriptor> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| Error::UnknownNodeName(name.to_string()))
    }

    fn record(&self, name: &str) -> Option<NodeRecord> {
        let node = self.nodes.get(name)?;
        let range = self.ring.range_of(name)?;
        Some(NodeRecord::new(node, range))
    }

    fn snapshot(&self) -> RingSnapshot {
        RingSnapshot::new(
            self.ring
                .iter()
                .filter_map(|(_, slot)| self.record(&slot.name))
                .collect(),
        )
    }

    /// Ring members in `state`, in ring order
    fn names_in_state(&self, state: LifecycleState) -> Vec<String> {
        self.ring
            .iter()
            .map(|(_, slot)| slot.name.as_str())
            .filter(|name| self.nodes.get(*name).is_some_and(|n| n.state == state))
            .map(str::to_string)
            .collect()
    }

    fn return_to_pool(&mut self, name: &str) -> Result<()> {
        let fresh = self.node(name)?.reset();
        self.nodes.insert(name.to_string(), fresh);
        self.available.push_back(name.to_string());
        Ok(())
    }
}

pub struct Coordinator {
    coord: Arc<dyn Coordination>,
    launcher: Arc<dyn NodeLauncher>,
    paths: Paths,
    store: MetadataStore,
    broadcast_timeout: Duration,
    migration_timeout: Duration,
    cluster: Mutex<Cluster>,
}

impl Coordinator {
    /// Create the namespace roots and publish an empty ring.
    pub async fn new(
        coord: Arc<dyn Coordination>,
        launcher: Arc<dyn NodeLauncher>,
        config: &EcsConfig,
        inventory: Vec<ServerEntry>,
    ) -> Result<Self> {
        if !is_connected(coord.as_ref()) {
            return Err(Error::CoordinationUnavailable(
                "cannot initialise without a session".into(),
            ));
        }

        let paths = Paths::from_config(config);
        for root in [&paths.metadata_root, &paths.server_root, &paths.await_root] {
            ensure_path(coord.as_ref(), root).await?;
        }

        let mut cluster = Cluster::default();
        for entry in inventory {
            if cluster.nodes.contains_key(&entry.name) {
                return Err(Error::DuplicateNodeName(entry.name));
            }
            cluster.available.push_back(entry.name.clone());
            cluster.nodes.insert(
                entry.name.clone(),
                NodeDescriptor::new(entry.name, entry.host, entry.port),
            );
        }
        // registrations left over from an earlier run do not count
        cluster.registered = coord.get_children(&paths.await_root).await?.len();

        let store = MetadataStore::new(coord.clone(), paths.clone());
        store.put_snapshot(&RingSnapshot::default()).await?;

        tracing::info!(
            "ECS ready with {} servers in the pool",
            cluster.available.len()
        );

        Ok(Self {
            coord,
            launcher,
            paths,
            store,
            broadcast_timeout: config.broadcast_timeout(),
            migration_timeout: config.migration_timeout(),
            cluster: Mutex::new(cluster),
        })
    }

    /// Load the inventory file and pick the launcher named in `config`.
    pub async fn from_config(coord: Arc<dyn Coordination>, config: &EcsConfig) -> Result<Self> {
        let inventory = load_inventory(&config.servers_file).await?;
        Self::new(coord, launcher_for(config), config, inventory).await
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    fn ensure_connected(&self) -> Result<()> {
        if is_connected(self.coord.as_ref()) {
            Ok(())
        } else {
            Err(Error::CoordinationUnavailable(
                "coordination session is disconnected".into(),
            ))
        }
    }

    // === Membership ===

    /// Move up to `count` servers from the pool into the ring.
    ///
    /// New nodes are STOPPED and EMPTY; they receive their data on `start`.
    pub async fn add_nodes(
        &self,
        count: usize,
        cache_capacity: usize,
        eviction_policy: EvictionPolicy,
    ) -> Result<Vec<NodeRecord>> {
        self.ensure_connected()?;
        let mut cluster = self.cluster.lock().await;

        let available = cluster.available.len();
        if count == 0 || available == 0 {
            return Err(Error::PoolExhausted {
                requested: count,
                available,
            });
        }
        if count > available {
            tracing::warn!(
                "Requested {} servers but only {} are available; adding {}",
                count,
                available,
                available
            );
        }
        let picked: Vec<String> = cluster.available.iter().take(count).cloned().collect();

        let mut incoming: HashMap<RingHash, &str> = HashMap::new();
        for name in &picked {
            let hash = cluster.node(name)?.hash;
            if let Some(slot) = cluster.ring.slot_at(hash) {
                return Err(Error::HashCollision {
                    existing: slot.name.clone(),
                    incoming: name.clone(),
                });
            }
            if let Some(other) = incoming.insert(hash, name) {
                return Err(Error::HashCollision {
                    existing: other.to_string(),
                    incoming: name.clone(),
                });
            }
        }

        for name in &picked {
            cluster.available.retain(|n| n != name);
            let node = cluster.node_mut(name)?;
            let mut fresh = node.reset();
            fresh.configure(cache_capacity, eviction_policy);
            fresh.apply(&Command::Init)?;
            let hash = fresh.hash;
            *node = fresh;
            let range = cluster.ring.insert(name.clone(), hash)?;
            tracing::info!("Added {} owning {}", name, range);
        }

        let persisted = self.persist(&cluster).await;
        self.broadcast(&cluster, &picked, &Command::Init).await;

        for name in &picked {
            let node = cluster.node(name)?;
            if let Err(e) = self.launcher.launch(node).await {
                tracing::warn!("{}", e);
            }
        }

        persisted?;
        Ok(picked.iter().filter_map(|n| cluster.record(n)).collect())
    }

    /// Take `names` out of the ring, handing their data to a started neighbour.
    pub async fn remove_nodes(&self, names: &[String]) -> Result<()> {
        self.ensure_connected()?;
        let mut cluster = self.cluster.lock().await;
        Self::validate_removal(&cluster, names)?;
        if names.is_empty() {
            return Ok(());
        }

        let outcome = self.remove_validated(&mut cluster, names).await;
        let persisted = self.persist(&cluster).await;
        outcome.and(persisted)
    }

    fn validate_removal(cluster: &Cluster, names: &[String]) -> Result<()> {
        if cluster.ring.is_empty() {
            return Err(Error::EmptyRing);
        }

        let mut leaving = HashSet::new();
        for name in names {
            if !leaving.insert(name.as_str()) {
                return Err(Error::DuplicateNodeName(name.clone()));
            }
            if !cluster.ring.contains(name) {
                return Err(Error::UnknownNodeName(name.clone()));
            }
        }

        let survivors: Vec<&NodeDescriptor> = cluster
            .ring
            .iter()
            .filter(|(_, slot)| !leaving.contains(slot.name.as_str()))
            .filter_map(|(_, slot)| cluster.nodes.get(&slot.name))
            .collect();
        let any_started = survivors
            .iter()
            .any(|n| n.state == LifecycleState::Started);

        if !survivors.is_empty() && !any_started {
            let holder = names
                .iter()
                .find(|n| cluster.nodes.get(*n).is_some_and(migration::holds_data));
            if let Some(holder) = holder {
                return Err(Error::NoEligibleNeighbor(holder.clone()));
            }
        }
        Ok(())
    }

    async fn remove_validated(&self, cluster: &mut Cluster, names: &[String]) -> Result<()> {
        let leaving: HashSet<&str> = names.iter().map(String::as_str).collect();

        for name in names {
            let (hash, port, has_data) = {
                let node = cluster.node(name)?;
                (node.hash, node.port, migration::holds_data(node))
            };
            if has_data {
                self.migrate_out(cluster, name, hash, &leaving).await?;
            }

            cluster.ring.remove(name)?;
            cluster.node_mut(name)?.apply(&Command::ShutDown)?;
            self.broadcast(cluster, std::slice::from_ref(name), &Command::ShutDown)
                .await;

            delete_recursive(self.coord.as_ref(), &self.paths.server(port)).await?;
            if self.drop_registration(port).await? {
                cluster.registered = cluster.registered.saturating_sub(1);
            }
            cluster.return_to_pool(name)?;
            tracing::info!("Removed {}", name);
        }
        Ok(())
    }

    /// Push the range of `name` to the first started successor that is staying.
    async fn migrate_out(
        &self,
        cluster: &mut Cluster,
        name: &str,
        hash: RingHash,
        leaving: &HashSet<&str>,
    ) -> Result<()> {
        let range = cluster
            .ring
            .range_of(name)
            .ok_or_else(|| Error::UnknownNodeName(name.to_string()))?;

        let target = cluster
            .ring
            .successors(hash)
            .map(|(_, slot)| slot.name.as_str())
            .filter(|n| !leaving.contains(n))
            .find(|n| {
                cluster
                    .nodes
                    .get(*n)
                    .is_some_and(|d| d.state == LifecycleState::Started)
            })
            .map(str::to_string);

        let Some(target) = target else {
            let staying = cluster
                .ring
                .iter()
                .any(|(_, slot)| !leaving.contains(slot.name.as_str()));
            if staying {
                return Err(Error::NoEligibleNeighbor(name.to_string()));
            }
            tracing::warn!(
                "No node left to take {} from {}; its data is dropped",
                range,
                name
            );
            return Ok(());
        };

        let absorber = cluster.ring.successor(hash).map(|(_, slot)| slot.name.clone());
        let transfer = Transfer {
            source: name.to_string(),
            source_port: cluster.node(name)?.port,
            target_port: cluster.node(&target)?.port,
            target: target.clone(),
            range,
        };
        cluster.node_mut(name)?.apply(&transfer.command())?;
        migration::execute(
            self.coord.as_ref(),
            &self.paths,
            &transfer,
            self.migration_timeout,
        )
        .await?;

        // the node that now owns the range was skipped and has to pull it on start
        if let Some(absorber) = absorber.filter(|a| *a != target) {
            if let Some(node) = cluster.nodes.get_mut(&absorber) {
                if node.state == LifecycleState::Stopped && node.data == DataStatus::Synced {
                    node.data = DataStatus::Stale;
                    tracing::info!(
                        "{} is stale until it pulls {} from {}",
                        absorber,
                        range,
                        target
                    );
                }
            }
        }
        Ok(())
    }

    /// Delete the registration of `port`. Returns whether one existed.
    async fn drop_registration(&self, port: u16) -> Result<bool> {
        match self.coord.delete(&self.paths.registration(port), None).await {
            Ok(()) => Ok(true),
            Err(Error::NoNode(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // === Lifecycle ===

    /// Start every STOPPED node.
    ///
    /// Empty or stale nodes first pull their range from the first SYNCED
    /// successor; only then is START broadcast to the whole group, so no
    /// command znode carrying START is reused for a transfer.
    pub async fn start(&self) -> Result<()> {
        self.ensure_connected()?;
        let mut cluster = self.cluster.lock().await;

        let stopped = cluster.names_in_state(LifecycleState::Stopped);
        if stopped.is_empty() {
            tracing::info!("No stopped nodes to start");
            return Ok(());
        }

        let outcome = self.start_validated(&mut cluster, &stopped).await;
        let persisted = self.persist(&cluster).await;
        outcome.and(persisted)
    }

    async fn start_validated(&self, cluster: &mut Cluster, stopped: &[String]) -> Result<()> {
        // sources are picked before any pull marks a node SYNCED
        let mut pulls = Vec::new();
        for name in stopped {
            if cluster.node(name)?.data != DataStatus::Synced {
                pulls.push((name.clone(), Self::plan_pull(cluster, name)?));
            }
        }

        for (name, transfer) in pulls {
            if let Some(transfer) = transfer {
                cluster.node_mut(&transfer.source)?.apply(&transfer.command())?;
                migration::execute(
                    self.coord.as_ref(),
                    &self.paths,
                    &transfer,
                    self.migration_timeout,
                )
                .await?;
            }
            cluster.node_mut(&name)?.data = DataStatus::Synced;
        }

        for name in stopped {
            cluster.node_mut(name)?.apply(&Command::Start)?;
        }
        self.broadcast(cluster, stopped, &Command::Start).await;
        Ok(())
    }

    /// The transfer that fills `name`, if any node holds its range.
    fn plan_pull(cluster: &Cluster, name: &str) -> Result<Option<Transfer>> {
        let Some(source) = migration::first_synced_successor(&cluster.ring, &cluster.nodes, name)
        else {
            let others_hold_data = cluster.ring.iter().any(|(_, slot)| {
                slot.name != name
                    && cluster
                        .nodes
                        .get(&slot.name)
                        .is_some_and(migration::holds_data)
            });
            if others_hold_data {
                tracing::warn!(
                    "No synced successor to fill {}; starting it without data",
                    name
                );
            } else {
                tracing::debug!("{} starts with an empty range", name);
            }
            return Ok(None);
        };

        Ok(Some(Transfer {
            source: source.to_string(),
            source_port: cluster.node(source)?.port,
            target: name.to_string(),
            target_port: cluster.node(name)?.port,
            range: cluster
                .ring
                .range_of(name)
                .ok_or_else(|| Error::UnknownNodeName(name.to_string()))?,
        }))
    }

    /// Stop every STARTED node. Data stays where it is.
    pub async fn stop(&self) -> Result<()> {
        self.ensure_connected()?;
        let mut cluster = self.cluster.lock().await;

        let started = cluster.names_in_state(LifecycleState::Started);
        if started.is_empty() {
            tracing::info!("No started nodes to stop");
            return Ok(());
        }
        for name in &started {
            cluster.node_mut(name)?.apply(&Command::Stop)?;
        }
        self.broadcast(&cluster, &started, &Command::Stop).await;
        self.persist(&cluster).await
    }

    /// Shut every active node down and return all of them to the pool.
    pub async fn shutdown(&self) -> Result<()> {
        self.ensure_connected()?;
        let mut cluster = self.cluster.lock().await;

        let active = cluster.ring.names();
        for name in &active {
            cluster.node_mut(name)?.apply(&Command::ShutDown)?;
        }
        self.broadcast(&cluster, &active, &Command::ShutDown).await;

        let mut ports = Vec::with_capacity(active.len());
        for name in &active {
            ports.push(cluster.node(name)?.port);
            cluster.return_to_pool(name)?;
        }
        cluster.ring.clear();
        cluster.registered = 0;

        let outcome = self.clear_node_znodes(&ports).await;
        let persisted = self.persist(&cluster).await;
        tracing::info!("Shut down {} nodes", active.len());
        outcome.and(persisted)
    }

    async fn clear_node_znodes(&self, ports: &[u16]) -> Result<()> {
        for port in ports {
            delete_recursive(self.coord.as_ref(), &self.paths.server(*port)).await?;
        }
        for child in self.coord.get_children(&self.paths.await_root).await? {
            match self
                .coord
                .delete(&join_path(&self.paths.await_root, &child), None)
                .await
            {
                Ok(()) | Err(Error::NoNode(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Wait until `count` more storage processes have registered.
    ///
    /// Returns `false` if they did not show up within `timeout`.
    pub async fn await_nodes(&self, count: usize, timeout: Duration) -> Result<bool> {
        self.ensure_connected()?;
        let baseline = self.cluster.lock().await.registered;
        let wanted = baseline + count;
        let deadline = Instant::now() + timeout;
        let root = &self.paths.await_root;

        loop {
            let watch = self.coord.watch_children(root).await?;
            let present = self.coord.get_children(root).await?.len();
            if present >= wanted {
                self.cluster.lock().await.registered += count;
                tracing::info!("{} nodes registered", present);
                return Ok(true);
            }

            match tokio::time::timeout_at(deadline, watch.fired()).await {
                Err(_) => {
                    tracing::warn!(
                        "Only {} of {} expected registrations after {:?}",
                        present.saturating_sub(baseline),
                        count,
                        timeout
                    );
                    return Ok(false);
                }
                Ok(WatchEvent::Disconnected) => {
                    return Err(Error::CoordinationUnavailable(
                        "session lost while awaiting nodes".into(),
                    ))
                }
                Ok(_) => {}
            }
        }
    }

    // === Queries ===

    pub async fn resolve_key_owner(&self, key: &str) -> Result<NodeRecord> {
        let cluster = self.cluster.lock().await;
        let slot = cluster.ring.node_for_hash(key_hash(key))?;
        cluster
            .record(&slot.name)
            .ok_or_else(|| Error::UnknownNodeName(slot.name.clone()))
    }

    /// Active nodes in ring order
    pub async fn list_active_nodes(&self) -> Vec<NodeRecord> {
        self.cluster.lock().await.snapshot().nodes
    }

    pub async fn available(&self) -> Vec<ServerEntry> {
        let cluster = self.cluster.lock().await;
        cluster
            .available
            .iter()
            .filter_map(|name| cluster.nodes.get(name))
            .map(|n| ServerEntry {
                name: n.name.clone(),
                host: n.host.clone(),
                port: n.port,
            })
            .collect()
    }

    pub async fn node(&self, name: &str) -> Option<NodeDescriptor> {
        self.cluster.lock().await.nodes.get(name).cloned()
    }

    pub async fn ring(&self) -> PartitionRing {
        self.cluster.lock().await.ring.clone()
    }

    /// Ring snapshot as last written to the coordination service
    pub async fn persisted_snapshot(&self) -> Result<RingSnapshot> {
        self.store.get_snapshot().await
    }

    // === Plumbing ===

    async fn persist(&self, cluster: &Cluster) -> Result<()> {
        self.store
            .persist(&cluster.snapshot())
            .await
            .inspect_err(|e| tracing::error!("Failed to persist ring metadata: {}", e))
    }

    /// Write `command` to the command znode of every node in `names`.
    ///
    /// Returns whether all writes landed within the broadcast timeout. A
    /// timeout is only logged.
    async fn broadcast(&self, cluster: &Cluster, names: &[String], command: &Command) -> bool {
        if names.is_empty() {
            return true;
        }

        let latch = QuorumLatch::new(names.len());
        let payload = command.encode();
        for name in names {
            let Some(node) = cluster.nodes.get(name) else {
                tracing::warn!("Cannot send {} to unknown node {}", command.name(), name);
                continue;
            };
            let coord = self.coord.clone();
            let path = self.paths.command(node.port);
            let payload = payload.clone();
            let latch = latch.clone();
            let name = name.clone();
            tokio::spawn(async move {
                match put(coord.as_ref(), &path, &payload).await {
                    Ok(()) => latch.count_down(),
                    Err(e) => tracing::warn!("Failed to send command to {}: {}", name, e),
                }
            });
        }

        let acked = latch.wait(self.broadcast_timeout).await;
        if acked {
            tracing::info!("Sent {} to {} node(s)", command.name(), names.len());
        } else {
            tracing::warn!(
                "{} of {} node(s) did not take {} within {:?}",
                latch.remaining(),
                names.len(),
                command.name(),
                self.broadcast_timeout
            );
        }
        acked
    }
}
