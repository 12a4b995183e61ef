// weave-node/src/main.rs

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "weave-node")]
#[command(about = "Blockweave Node", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the blockweave node
    Start {
        /// Configuration file path
        #[arg(short, long, default_value = "./config.toml")]
        config: String,

        /// Override data directory
        #[arg(short = 'D', long)]
        data_dir: Option<String>,

        /// Start mining immediately
        #[arg(short, long)]
        mine: bool,
    },

    /// Initialize a new node
    Init {
        /// Data directory
        #[arg(short = 'D', long, default_value = "./data")]
        data_dir: String,
    },

    /// Generate a wallet keypair
    Keygen {
        /// Output path
        #[arg(short, long)]
        output: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}={}", env!("CARGO_PKG_NAME"), log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Start {
            config,
            data_dir,
            mine,
        } => {
            start_node(&config, data_dir, mine).await?;
        }
        Commands::Init { data_dir } => {
            init_node(&data_dir)?;
        }
        Commands::Keygen { output } => {
            keygen(&output)?;
        }
    }

    Ok(())
}

async fn start_node(
    config_path: &str,
    data_dir_override: Option<String>,
    mine: bool,
) -> anyhow::Result<()> {
    use weave_node::{Node, NodeConfig};

    tracing::info!("Loading configuration from {}", config_path);
    let mut config = NodeConfig::from_file(config_path)?;

    if let Some(data_dir) = data_dir_override {
        config.data_dir = data_dir;
    }
    if mine {
        config.automine = true;
    }

    tracing::info!("Starting node with data directory: {}", config.data_dir);
    let handle = Node::start(config)?;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    handle.stop().await.ok();
    tracing::info!("Node stopped gracefully");

    Ok(())
}

fn init_node(data_dir: &str) -> anyhow::Result<()> {
    tracing::info!("Initializing node at {}", data_dir);

    std::fs::create_dir_all(data_dir)?;
    std::fs::create_dir_all(format!("{}/db", data_dir))?;
    std::fs::create_dir_all(format!("{}/keys", data_dir))?;

    let mut config = weave_node::NodeConfig::default();
    config.data_dir = data_dir.to_string();
    config.to_file(&format!("{}/config.toml", data_dir))?;

    tracing::info!("Node initialized at {}", data_dir);
    tracing::info!("Edit {}/config.toml to configure your node", data_dir);

    Ok(())
}

fn keygen(output: &str) -> anyhow::Result<()> {
    use weave_crypto::{SignatureScheme, Wallet};

    tracing::info!("Generating wallet keypair");
    let wallet = Wallet::generate(SignatureScheme::Ed25519)?;

    let key_json = serde_json::json!({
        "public_key": wallet.public_key().to_hex(),
        "secret_key": wallet.secret_key().to_hex(),
        "address": wallet.address().to_hex(),
    });

    std::fs::write(output, serde_json::to_string_pretty(&key_json)?)?;
    tracing::info!("Keypair saved to {}", output);
    tracing::warn!("Keep this file secure!");

    Ok(())
}
