//! CLI client: talks to the broker fleet through the endpoint selector

use clap::{Parser, Subcommand};
use tournd::common::config::Config;
use tournd::common::wire::Request;
use tournd::EndpointSelector;

#[derive(Parser)]
#[command(name = "tournd")]
#[command(about = "tournd tournament coordination CLI")]
#[command(version)]
struct Cli {
    /// Broker host
    #[arg(long)]
    host: Option<String>,

    /// First broker port
    #[arg(long)]
    start_port: Option<u16>,

    /// Number of broker instances
    #[arg(long)]
    brokers: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a tournament with its player roster
    Create {
        /// Tournament name
        name: String,

        /// Shared secret gating update and delete
        #[arg(long)]
        password: String,

        /// Modality
        #[arg(long, default_value = "0")]
        modality: u32,

        /// Player names (comma-separated)
        #[arg(long, value_delimiter = ',')]
        players: Vec<String>,
    },

    /// Read a tournament and its roster
    Get {
        /// Tournament id
        id: u64,
    },

    /// List all tournaments
    List,

    /// Replace the classification string
    Update {
        /// Tournament id
        id: u64,

        /// Last-seen version
        #[arg(long)]
        version: u64,

        /// New classification (symbols U, 1, 2)
        #[arg(long)]
        classification: String,

        /// Tournament password
        #[arg(long)]
        password: String,
    },

    /// Delete a tournament and its players
    Delete {
        /// Tournament id
        id: u64,

        /// Tournament password
        #[arg(long)]
        password: String,
    },

    /// Report broker store-connection state
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = Config::load()?.client;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(start_port) = cli.start_port {
        config.start_port = start_port;
    }
    if let Some(brokers) = cli.brokers {
        config.broker_count = brokers;
    }
    let selector = EndpointSelector::from_config(&config)?;

    let request = match cli.command {
        Commands::Create {
            name,
            password,
            modality,
            players,
        } => Request::Create {
            name,
            modality,
            password,
            players,
        },
        Commands::Get { id } => Request::Get { id },
        Commands::List => Request::GetList {},
        Commands::Update {
            id,
            version,
            classification,
            password,
        } => Request::Update {
            id,
            version,
            classification,
            password,
        },
        Commands::Delete { id, password } => Request::Delete { id, password },
        Commands::Status => Request::Status {},
    };

    let response = selector.call(&request).await?;
    if response.is_ok() {
        println!("{}", serde_json::to_string_pretty(&response.data)?);
    } else {
        eprintln!("error {}: {}", response.code, response.data);
        std::process::exit(1);
    }

    Ok(())
}
