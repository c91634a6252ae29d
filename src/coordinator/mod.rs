//! Cluster coordinator (ECS)
//!
//! The coordinator is responsible for:
//! - Partition ring (key hash → node)
//! - Node lifecycle (INIT, START, STOP, SHUT_DOWN)
//! - Range migration when membership changes
//! - Publishing ring metadata to the coordination service

pub mod ecs;
pub mod http;
pub mod inventory;
pub mod latch;
pub mod launcher;
pub mod metadata;
pub mod migration;
pub mod node;
pub mod protocol;
pub mod ring;
pub mod server;

pub use ecs::Coordinator;
pub use metadata::{NodeRecord, RingSnapshot};
pub use node::{DataStatus, EvictionPolicy, LifecycleState, NodeDescriptor};
pub use protocol::{Command, Paths};
pub use ring::PartitionRing;
pub use server::EcsServer;
