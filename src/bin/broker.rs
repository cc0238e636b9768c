//! Broker binary

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tournd::common::config::Config;
use tournd::{Broker, MemoryStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tournd-broker")]
#[command(about = "tournd request broker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a broker instance
    Serve {
        /// Bind address for the request channel
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Root path for tournament nodes
        #[arg(long)]
        root: Option<String>,

        /// Lock acquisition bound in milliseconds
        #[arg(long)]
        lock_timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            root,
            lock_timeout_ms,
        } => {
            // File/env config first, CLI arguments win.
            let mut config = Config::load()?.broker;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(root) = root {
                config.root_path = root;
            }
            if let Some(lock_timeout_ms) = lock_timeout_ms {
                config.lock_timeout_ms = lock_timeout_ms;
            }

            let store = Arc::new(MemoryStore::new());
            let broker = Broker::bind(&config, store).await?;
            let stop = broker.stop_handle();

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown signal received");
                    stop.stop();
                }
            });

            broker.run().await?;
        }
    }

    Ok(())
}
