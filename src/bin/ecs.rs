//! ECS binary

use clap::{Parser, Subcommand};
use ringkv::common::{parse_duration, Config, LauncherKind};
use ringkv::EcsServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ringkv-ecs")]
#[command(about = "ringkv external configuration service")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./ringkv.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the ECS
    Serve {
        /// Bind address for the admin API and the coordination namespace
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Address storage nodes use to reach this ECS
        #[arg(long)]
        advertise: Option<String>,

        /// Server inventory file
        #[arg(long)]
        servers: Option<PathBuf>,

        /// Launch storage nodes over ssh instead of waiting for them
        #[arg(long)]
        ssh: bool,

        /// Broadcast acknowledgement deadline (e.g. 5s)
        #[arg(long)]
        broadcast_timeout: Option<String>,

        /// Deadline for a single range migration (e.g. 60s)
        #[arg(long)]
        migration_timeout: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            advertise,
            servers,
            ssh,
            broadcast_timeout,
            migration_timeout,
        } => {
            // CLI flags win over the file and the environment
            let ecs = &mut config.ecs;
            if let Some(bind) = bind {
                ecs.bind_addr = bind;
            }
            if let Some(advertise) = advertise {
                ecs.advertise_addr = advertise;
            }
            if let Some(servers) = servers {
                ecs.servers_file = servers;
            }
            if ssh {
                ecs.launcher = LauncherKind::Ssh;
            }
            if let Some(timeout) = broadcast_timeout {
                ecs.broadcast_timeout_ms = parse_duration(&timeout)?.as_millis() as u64;
            }
            if let Some(timeout) = migration_timeout {
                ecs.migration_timeout_ms = parse_duration(&timeout)?.as_millis() as u64;
            }

            EcsServer::new(config.ecs).serve().await?;
        }
    }

    Ok(())
}
