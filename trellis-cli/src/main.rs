use anyhow::Result;
use clap::{Parser, Subcommand};

use trellis_cli::app;
use trellis_cli::telemetry::init_tracing;
use trellis_config::load_config;

#[derive(Parser)]
#[command(author, version, about = "Trellis session orchestrator")]
struct Cli {
    /// Configuration environment layered over config/default.toml
    #[arg(long, global = true)]
    env: Option<String>,
    /// Seed for the simulated venue
    #[arg(long, global = true, default_value_t = 42)]
    seed: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full trading session against the simulated venue
    Trade,
    /// Run the configured scanners once and print the universe
    Scan,
    /// Print how today's universe would be sharded
    Shards,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.env.as_deref())?;
    init_tracing(&config.log_level, config.log_path.as_deref())?;

    match cli.command {
        Command::Trade => app::run_trade(&config, cli.seed).await?,
        Command::Scan => app::run_scan(&config, cli.seed).await?,
        Command::Shards => app::run_shards(&config, cli.seed).await?,
    }
    Ok(())
}
