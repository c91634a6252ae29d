//! Starting storage node processes

use crate::common::{EcsConfig, Error, LauncherKind, Result};
use crate::coordinator::node::NodeDescriptor;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

#[async_trait]
pub trait NodeLauncher: Send + Sync {
    async fn launch(&self, node: &NodeDescriptor) -> Result<()>;
}

/// Logs the launch and leaves the process to the operator
pub struct NoopLauncher;

#[async_trait]
impl NodeLauncher for NoopLauncher {
    async fn launch(&self, node: &NodeDescriptor) -> Result<()> {
        tracing::info!(
            "Not launching {} ({}); expecting it to register on its own",
            node.name,
            node.address()
        );
        Ok(())
    }
}

/// Starts `server_command` on the node's host over ssh, detached with nohup
pub struct SshLauncher {
    pub server_command: String,
    pub coordination_addr: String,
    pub log_dir: PathBuf,
}

impl SshLauncher {
    pub fn from_config(config: &EcsConfig) -> Self {
        Self {
            server_command: config.server_command.clone(),
            coordination_addr: config.advertise_addr.clone(),
            log_dir: config.log_dir.clone(),
        }
    }

    /// Command run on the remote host
    pub fn remote_command(&self, node: &NodeDescriptor) -> String {
        format!(
            "nohup {} {} {} {} {} > {}/server_{}.log 2>&1 &",
            self.server_command,
            node.port,
            node.cache_capacity,
            node.eviction_policy,
            self.coordination_addr,
            self.log_dir.display(),
            node.port
        )
    }
}

#[async_trait]
impl NodeLauncher for SshLauncher {
    async fn launch(&self, node: &NodeDescriptor) -> Result<()> {
        let remote = self.remote_command(node);
        tracing::info!("Launching {} on {}: {}", node.name, node.host, remote);

        let status = tokio::process::Command::new("ssh")
            .args(["-o", "StrictHostKeyChecking=no", "-n", &node.host, &remote])
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::Launch {
                node: node.name.clone(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(Error::Launch {
                node: node.name.clone(),
                reason: format!("ssh exited with {}", status),
            });
        }
        Ok(())
    }
}

pub fn launcher_for(config: &EcsConfig) -> Arc<dyn NodeLauncher> {
    match config.launcher {
        LauncherKind::Noop => Arc::new(NoopLauncher),
        LauncherKind::Ssh => Arc::new(SshLauncher::from_config(config)),
    }
}
