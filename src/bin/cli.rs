//! CLI for cluster operations

use clap::{Parser, Subcommand};
use ringkv::common::parse_duration;
use ringkv::coordinator::{EvictionPolicy, NodeRecord};
use ringkv::AdminClient;

#[derive(Parser)]
#[command(name = "ringkv")]
#[command(about = "ringkv cluster administration CLI")]
#[command(version)]
struct Cli {
    /// ECS URL
    #[arg(long, default_value = "http://localhost:7000")]
    ecs: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add servers from the pool to the ring
    Add {
        /// Number of servers
        count: usize,

        /// Cache capacity of each new server
        #[arg(long, default_value = "1024")]
        cache: usize,

        /// Eviction policy (FIFO, LRU, LFU, None)
        #[arg(long, default_value = "LRU")]
        policy: EvictionPolicy,
    },

    /// Remove servers from the ring
    Remove {
        /// Server names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Start every stopped server
    Start,

    /// Stop every started server
    Stop,

    /// Shut every active server down
    Shutdown,

    /// Wait for launched servers to register
    Await {
        /// Number of registrations
        count: usize,

        /// How long to wait (e.g. 30s, 500ms)
        #[arg(long, default_value = "30s")]
        timeout: String,
    },

    /// List active servers in ring order
    Nodes,

    /// List servers not in the ring
    Available,

    /// Show the server responsible for a key
    Owner {
        /// Key
        key: String,
    },

    /// Print the published ring metadata as JSON
    Ring,
}

fn print_nodes(nodes: &[NodeRecord]) {
    if nodes.is_empty() {
        println!("(no active servers)");
        return;
    }
    for node in nodes {
        println!(
            "{:<12} {:<21} {:<9} {:<6} {}",
            node.name,
            node.address(),
            node.state.to_string(),
            format!("{:?}", node.data).to_uppercase(),
            node.range
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = AdminClient::new(&cli.ecs)?;

    match cli.command {
        Commands::Add {
            count,
            cache,
            policy,
        } => {
            let added = client.add_nodes(count, cache, policy).await?;
            println!("Added {} server(s):", added.len());
            print_nodes(&added);
        }

        Commands::Remove { names } => {
            client.remove_nodes(names.clone()).await?;
            println!("Removed {}", names.join(", "));
        }

        Commands::Start => print_nodes(&client.start().await?),

        Commands::Stop => print_nodes(&client.stop().await?),

        Commands::Shutdown => {
            client.shutdown().await?;
            println!("All servers shut down");
        }

        Commands::Await { count, timeout } => {
            let timeout = parse_duration(&timeout)?;
            if client.await_nodes(count, timeout).await? {
                println!("{} server(s) registered", count);
            } else {
                anyhow::bail!("{} server(s) did not register within {:?}", count, timeout);
            }
        }

        Commands::Nodes => print_nodes(&client.list_nodes().await?),

        Commands::Available => {
            for server in client.available().await? {
                println!("{:<12} {}:{}", server.name, server.host, server.port);
            }
        }

        Commands::Owner { key } => {
            let owner = client.owner(&key).await?;
            println!("{} -> {} ({})", key, owner.name, owner.address());
        }

        Commands::Ring => {
            let snapshot = client.ring().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}
