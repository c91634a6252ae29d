//! Configuration for the ringkv coordinator

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator (ECS) configuration
    #[serde(default)]
    pub ecs: EcsConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ecs: EcsConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file and `RINGKV__*` env vars.
    ///
    /// Without an explicit path, `ringkv.toml` in the working directory is
    /// used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p.to_path_buf()).required(true),
            None => config::File::with_name("ringkv").required(false),
        };

        config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("RINGKV").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

/// How storage node processes get launched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LauncherKind {
    /// Only log; processes are started by someone else
    Noop,
    /// Start each node over ssh
    Ssh,
}

/// Coordinator (ECS) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcsConfig {
    /// Bind address for the admin API and the coordination namespace
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Address storage nodes use to reach the coordination namespace
    #[serde(default = "default_advertise_addr")]
    pub advertise_addr: String,

    /// Server inventory file (`name host port` per line)
    #[serde(default = "default_servers_file")]
    pub servers_file: PathBuf,

    /// Znode holding the JSON ring snapshot
    #[serde(default = "default_metadata_root")]
    pub metadata_root: String,

    /// Parent of the per-node znodes (`<root>/<port>/op`, `<root>/<port>/metadata`)
    #[serde(default = "default_server_root")]
    pub server_root: String,

    /// Parent under which launched nodes register themselves
    #[serde(default = "default_await_root")]
    pub await_root: String,

    /// Deadline for broadcast acknowledgements
    #[serde(default = "default_broadcast_timeout")]
    pub broadcast_timeout_ms: u64,

    /// Deadline for a single range migration
    #[serde(default = "default_migration_timeout")]
    pub migration_timeout_ms: u64,

    #[serde(default = "default_launcher")]
    pub launcher: LauncherKind,

    /// Command started on the remote host, followed by `<port> <cache> <policy> <coordination addr>`
    #[serde(default = "default_server_command")]
    pub server_command: String,

    /// Directory for remote node logs
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 7000))
}
fn default_advertise_addr() -> String {
    "127.0.0.1:7000".to_string()
}
fn default_servers_file() -> PathBuf {
    PathBuf::from("ecs.config")
}
fn default_metadata_root() -> String {
    "/metadata".to_string()
}
fn default_server_root() -> String {
    "/server".to_string()
}
fn default_await_root() -> String {
    "/awaitNodes".to_string()
}
fn default_broadcast_timeout() -> u64 {
    5_000
}
fn default_migration_timeout() -> u64 {
    60_000
}
fn default_launcher() -> LauncherKind {
    LauncherKind::Noop
}
fn default_server_command() -> String {
    "ringkv-node".to_string()
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            advertise_addr: default_advertise_addr(),
            servers_file: default_servers_file(),
            metadata_root: default_metadata_root(),
            server_root: default_server_root(),
            await_root: default_await_root(),
            broadcast_timeout_ms: default_broadcast_timeout(),
            migration_timeout_ms: default_migration_timeout(),
            launcher: default_launcher(),
            server_command: default_server_command(),
            log_dir: default_log_dir(),
        }
    }
}

impl EcsConfig {
    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }

    pub fn migration_timeout(&self) -> Duration {
        Duration::from_millis(self.migration_timeout_ms)
    }
}
