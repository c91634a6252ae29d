//! Common utilities and types shared across ringkv

pub mod config;
pub mod error;
pub mod hash;
pub mod utils;

pub use config::{Config, EcsConfig, LauncherKind};
pub use error::{Error, Result};
pub use hash::{key_hash, node_hash, HashRange, RingHash};
pub use utils::{encode_key, parse_duration, retry_with_backoff, timestamp_now_millis};
