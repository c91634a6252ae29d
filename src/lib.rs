//! # ringkv
//!
//! Cluster coordinator for a partitioned key-value store:
//! - Consistent-hash ring assigning key ranges to storage nodes
//! - Node lifecycle driven through per-node command znodes
//! - Range migration on every membership change
//! - Ring metadata published to a coordination service

#![allow(clippy::result_large_err)]
//!
//! ## Architecture
//!
//! ```text
//!  ringkv CLI ──HTTP──▶ ┌──────────────────────────────┐
//!                       │  ECS (ringkv-ecs)            │
//!                       │   admin API  /admin/*        │
//!                       │   namespace  /ns/*           │
//!                       │   Coordinator + ring         │
//!                       └──────┬──────────┬────────────┘
//!             /server/<port>/op│          │/metadata
//!                 ┌────────────┴─┐  ┌─────┴────────┐
//!                 │ node :50000  │  │ node :50001  │ ...
//!                 │ (a..b]       │  │ (b..c]       │
//!                 └──────────────┘  └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start the ECS
//! ```bash
//! ringkv-ecs serve --bind 0.0.0.0:7000 --servers ./ecs.config
//! ```
//!
//! ### Drive the cluster
//! ```bash
//! ringkv add 3 --cache 1024 --policy LRU
//! ringkv await 3 --timeout 30s
//! ringkv start
//! ringkv owner my-key
//! ringkv remove server_2
//! ringkv shutdown
//! ```

pub mod client;
pub mod common;
pub mod coordination;
pub mod coordinator;

// Re-export commonly used types
pub use client::AdminClient;
pub use common::{Config, Error, Result};
pub use coordination::{Coordination, MemoryCoordination};
pub use coordinator::{Coordinator, EcsServer};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
