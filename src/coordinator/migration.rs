//! Range migration between storage nodes
//!
//! The coordinator writes `KV_TRANSFER` to the source's command znode, the
//! source pushes the range to the target and answers with `TRANSFER_FINISH`
//! on the same znode. Both command znodes are deleted afterwards.

use crate::common::{Error, HashRange, Result};
use crate::coordination::{put, Coordination, WatchEvent};
use crate::coordinator::node::{DataStatus, NodeDescriptor};
use crate::coordinator::protocol::{Command, Paths};
use crate::coordinator::ring::PartitionRing;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// One planned range move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub source: String,
    pub source_port: u16,
    pub target: String,
    pub target_port: u16,
    pub range: HashRange,
}

impl Transfer {
    pub fn command(&self) -> Command {
        Command::KvTransfer {
            target_port: self.target_port,
            range: self.range,
        }
    }
}

/// First node on the successor chain of `name` whose data is SYNCED, skipping
/// `name` itself.
///
/// STARTED nodes are always SYNCED; a STOPPED+SYNCED node still holds its data
/// and is started by the same `start` that pulls from it.
pub fn first_synced_successor<'a>(
    ring: &'a PartitionRing,
    nodes: &HashMap<String, NodeDescriptor>,
    name: &str,
) -> Option<&'a str> {
    let hash = ring.hash_of(name)?;
    ring.successors(hash)
        .map(|(_, slot)| slot.name.as_str())
        .find(|n| nodes.get(*n).is_some_and(|d| d.data == DataStatus::Synced))
}

/// Whether `node` has anything to hand over before it leaves
pub fn holds_data(node: &NodeDescriptor) -> bool {
    node.data != DataStatus::Empty
}

/// Run one transfer and wait for the source to finish.
pub async fn execute(
    coord: &dyn Coordination,
    paths: &Paths,
    transfer: &Transfer,
    timeout: Duration,
) -> Result<()> {
    let op = paths.command(transfer.source_port);
    tracing::info!(
        "Moving {} from {} to {}",
        transfer.range,
        transfer.source,
        transfer.target
    );

    put(coord, &op, &transfer.command().encode()).await?;
    wait_for_finish(coord, &op, timeout).await?;

    for path in [op, paths.command(transfer.target_port)] {
        match coord.delete(&path, None).await {
            Ok(()) | Err(Error::NoNode(_)) => {}
            Err(e) => return Err(e),
        }
    }
    tracing::info!("Moved {} to {}", transfer.range, transfer.target);
    Ok(())
}

async fn wait_for_finish(coord: &dyn Coordination, op: &str, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        // register before reading so a write in between is not missed
        let watch = coord.watch_data(op).await?;
        match coord.get_data(op).await {
            Ok((data, _)) => match Command::decode(&data) {
                Ok(Command::TransferFinish) => return Ok(()),
                Ok(_) => {}
                Err(e) => tracing::warn!("Ignoring unreadable command on {}: {}", op, e),
            },
            Err(Error::NoNode(_)) => {
                return Err(Error::MigrationAborted(format!("{} was deleted", op)))
            }
            Err(e) => return Err(e),
        }

        match tokio::time::timeout_at(deadline, watch.fired()).await {
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "no TRANSFER_FINISH on {} within {:?}",
                    op, timeout
                )))
            }
            Ok(WatchEvent::Deleted(_)) => {
                return Err(Error::MigrationAborted(format!("{} was deleted", op)))
            }
            Ok(WatchEvent::Disconnected) => {
                return Err(Error::CoordinationUnavailable(format!(
                    "session lost while waiting on {}",
                    op
                )))
            }
            Ok(_) => {}
        }
    }
}
