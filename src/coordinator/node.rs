//! Node descriptor and lifecycle state machine

use crate::common::{node_hash, Error, Result, RingHash};
use crate::coordinator::protocol::Command;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a storage node process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Descriptor exists, process not launched yet
    Uninitialized,
    /// In the ring, not serving clients
    Stopped,
    /// Serving its range
    Started,
    /// Torn down; terminal
    ShutDown,
}

impl LifecycleState {
    /// State reached after `command`, or `None` if the command is not valid here
    pub fn after(self, command: &Command) -> Option<LifecycleState> {
        use LifecycleState::*;
        match (self, command) {
            (Uninitialized, Command::Init) => Some(Stopped),
            (Stopped, Command::Start) => Some(Started),
            (Started, Command::Stop) => Some(Stopped),
            (Stopped | Started, Command::ShutDown) => Some(ShutDown),
            (Stopped | Started, Command::KvTransfer { .. } | Command::TransferFinish) => {
                Some(self)
            }
            (Uninitialized, _) | (Stopped, _) | (Started, _) | (ShutDown, _) => None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninitialized => write!(f, "UNINITIALIZED"),
            LifecycleState::Stopped => write!(f, "STOPPED"),
            LifecycleState::Started => write!(f, "STARTED"),
            LifecycleState::ShutDown => write!(f, "SHUT_DOWN"),
        }
    }
}

/// Last command issued to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingFlag {
    None,
    Init,
    Start,
    Stop,
    ShutDown,
    KvTransfer,
    TransferFinish,
}

impl From<&Command> for PendingFlag {
    fn from(command: &Command) -> Self {
        match command {
            Command::Init => PendingFlag::Init,
            Command::Start => PendingFlag::Start,
            Command::Stop => PendingFlag::Stop,
            Command::ShutDown => PendingFlag::ShutDown,
            Command::KvTransfer { .. } => PendingFlag::KvTransfer,
            Command::TransferFinish => PendingFlag::TransferFinish,
        }
    }
}

/// Whether the node's local data covers the range it owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataStatus {
    /// Never served, holds nothing
    Empty,
    Synced,
    /// Holds data, but part of its range was pushed elsewhere
    Stale,
}

/// Cache replacement strategy of a node. Opaque to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionPolicy {
    Fifo,
    Lru,
    Lfu,
    None,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionPolicy::Fifo => "FIFO",
            EvictionPolicy::Lru => "LRU",
            EvictionPolicy::Lfu => "LFU",
            EvictionPolicy::None => "None",
        };
        f.write_str(name)
    }
}

impl FromStr for EvictionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FIFO" => Ok(EvictionPolicy::Fifo),
            "LRU" => Ok(EvictionPolicy::Lru),
            "LFU" => Ok(EvictionPolicy::Lfu),
            "NONE" => Ok(EvictionPolicy::None),
            _ => Err(Error::InvalidConfig(format!("unknown eviction policy: {}", s))),
        }
    }
}

/// One storage server as the coordinator sees it.
///
/// The hash range is not stored here: the ring slot for `name` owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub cache_capacity: usize,
    pub eviction_policy: EvictionPolicy,
    pub hash: RingHash,
    pub state: LifecycleState,
    pub pending: PendingFlag,
    pub data: DataStatus,
}

impl NodeDescriptor {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let hash = node_hash(&host, port);
        Self {
            name: name.into(),
            host,
            port,
            cache_capacity: 0,
            eviction_policy: EvictionPolicy::None,
            hash,
            state: LifecycleState::Uninitialized,
            pending: PendingFlag::None,
            data: DataStatus::Empty,
        }
    }

    /// Override the ring position (fixtures with hand-picked hashes)
    pub fn with_hash(mut self, hash: RingHash) -> Self {
        self.hash = hash;
        self
    }

    pub fn configure(&mut self, cache_capacity: usize, eviction_policy: EvictionPolicy) {
        self.cache_capacity = cache_capacity;
        self.eviction_policy = eviction_policy;
    }

    /// A fresh, unconfigured descriptor with the same identity
    pub fn reset(&self) -> Self {
        Self {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            cache_capacity: 0,
            eviction_policy: EvictionPolicy::None,
            hash: self.hash,
            state: LifecycleState::Uninitialized,
            pending: PendingFlag::None,
            data: DataStatus::Empty,
        }
    }

    /// Record that `command` was issued and move to the resulting state
    pub fn apply(&mut self, command: &Command) -> Result<()> {
        let next = self
            .state
            .after(command)
            .ok_or_else(|| Error::InvalidTransition {
                node: self.name.clone(),
                state: self.state.to_string(),
                command: command.name().to_string(),
            })?;
        tracing::debug!("{}: {} --{}--> {}", self.name, self.state, command.name(), next);
        self.state = next;
        self.pending = PendingFlag::from(command);
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::HashRange;

    fn transfer() -> Command {
        Command::KvTransfer {
            target_port: 1,
            range: HashRange::new(RingHash(1), RingHash(2)),
        }
    }

    #[test]
    fn test_happy_path() {
        let mut node = NodeDescriptor::new("server_1", "127.0.0.1", 50000);
        assert_eq!(node.state, LifecycleState::Uninitialized);

        node.apply(&Command::Init).unwrap();
        assert_eq!(node.state, LifecycleState::Stopped);
        node.apply(&Command::Start).unwrap();
        assert_eq!(node.state, LifecycleState::Started);
        assert_eq!(node.pending, PendingFlag::Start);

        node.apply(&transfer()).unwrap();
        assert_eq!(node.state, LifecycleState::Started);
        assert_eq!(node.pending, PendingFlag::KvTransfer);

        node.apply(&Command::Stop).unwrap();
        node.apply(&Command::ShutDown).unwrap();
        assert_eq!(node.state, LifecycleState::ShutDown);
    }

    #[test]
    fn test_shut_down_is_terminal() {
        let mut node = NodeDescriptor::new("server_1", "127.0.0.1", 50000);
        node.apply(&Command::Init).unwrap();
        node.apply(&Command::ShutDown).unwrap();
        for command in [
            Command::Init,
            Command::Start,
            Command::Stop,
            Command::ShutDown,
            transfer(),
        ] {
            let err = node.apply(&command).unwrap_err();
            assert!(matches!(err, Error::InvalidTransition { .. }));
        }
        assert_eq!(node.state, LifecycleState::ShutDown);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut node = NodeDescriptor::new("server_1", "127.0.0.1", 50000);
        assert!(node.apply(&Command::Start).is_err());
        assert!(node.apply(&Command::ShutDown).is_err());
        node.apply(&Command::Init).unwrap();
        assert!(node.apply(&Command::Init).is_err());
        assert!(node.apply(&Command::Stop).is_err());
        node.apply(&Command::Start).unwrap();
        assert!(node.apply(&Command::Start).is_err());
    }

    #[test]
    fn test_reset_keeps_identity() {
        let mut node = NodeDescriptor::new("server_1", "127.0.0.1", 50000);
        node.configure(100, EvictionPolicy::Lru);
        node.apply(&Command::Init).unwrap();
        node.data = DataStatus::Synced;

        let fresh = node.reset();
        assert_eq!(fresh.hash, node.hash);
        assert_eq!(fresh.state, LifecycleState::Uninitialized);
        assert_eq!(fresh.data, DataStatus::Empty);
        assert_eq!(fresh.cache_capacity, 0);
        assert_eq!(fresh, NodeDescriptor::new("server_1", "127.0.0.1", 50000));
    }

    #[test]
    fn test_eviction_policy_parse() {
        assert_eq!("lru".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lru);
        assert_eq!("FIFO".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Fifo);
        assert!("random".parse::<EvictionPolicy>().is_err());
        assert_eq!(EvictionPolicy::Lfu.to_string(), "LFU");
    }
}
