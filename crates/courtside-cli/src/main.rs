use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courtside::config::Config;
use courtside::history::SqliteHistoryStore;
use courtside_cli::commands::{AskCommand, CheckCommand, HistoryCommand};
use courtside_cli::error::CliResult;
use courtside_cli::output::OutputFormat;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "courtside-cli")]
#[command(about = "Courtside CLI - launch checks, questions and history")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(long, global = true, help = "Path to the SQLite history database")]
    pub database: Option<PathBuf>,

    #[clap(long, short, global = true, help = "Log to stderr")]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Verify configuration, credentials and storage before launch")]
    Check(CheckCommand),

    #[clap(about = "Ask a single question through the full pipeline")]
    Ask(AskCommand),

    #[clap(about = "Show stored sessions and exchanges")]
    History(HistoryCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    if cli.verbose {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,courtside=debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        config.storage.database_path = database.clone();
    }

    match &cli.command {
        Command::Check(cmd) => cmd.execute(&config, format).await,
        Command::Ask(cmd) => cmd.execute(&config, format).await,
        Command::History(cmd) => {
            let store = SqliteHistoryStore::open(&config.storage.database_path)?;
            cmd.execute(&store, format).await
        }
    }
}
