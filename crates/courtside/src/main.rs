//! Courtside daemon - HTTP chat server for sports-injury questions

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use courtside::ResponseOrchestrator;
use courtside::config::Config;
use courtside::error::Result;
use courtside::history::open_store;
use courtside::server::ChatServer;

/// Courtside - sports-injury chat assistant
#[derive(Parser)]
#[command(name = "courtside")]
#[command(about = "A sports-injury chat assistant with pluggable LLM providers")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured provider (openai, local, hosted, third_party)
    #[arg(long, global = true)]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the chat server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config, cli.provider).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,courtside=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config_path: Option<PathBuf>, provider: Option<String>) -> Result<()> {
    tracing::info!("Starting Courtside");

    let mut config = Config::load(config_path.as_deref())?;
    if let Some(kind) = provider {
        config.apply_provider_override(&kind)?;
    }
    tracing::debug!("Config loaded: {:?}", config);

    let store = open_store(&config.storage)?;
    let orchestrator = Arc::new(ResponseOrchestrator::from_config(&config)?);

    let server = ChatServer::new(config.server.clone(), orchestrator, store);
    server.serve().await
}
