//! Command implementations wired to the simulated collaborators.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use trellis_config::AppConfig;
use trellis_core::{ShardPlan, Symbol};
use trellis_scanners::ScannerRegistry;
use trellis_session::{SessionOutcome, SessionRunner, ShutdownSignal};
use trellis_sim::{SimCalendar, SimFeedConnector, SimMarketData, SimPositions, TapeConsumerFactory};

use crate::telemetry::{spawn_metrics_server, SessionMetrics};

/// Symbols the simulated venue knows about.
const SIM_WATCHLIST: &[&str] = &[
    "AAPL", "TSLA", "MSFT", "NVDA", "AMD", "GME", "AMC", "PLTR", "SOFI", "RIVN",
];

fn sim_runner(seed: u64) -> SessionRunner {
    let watchlist: Vec<Symbol> = SIM_WATCHLIST.iter().map(|s| s.to_string()).collect();
    let market_data = Arc::new(SimMarketData::new(watchlist, seed));
    SessionRunner::new(
        Arc::new(SimCalendar),
        Arc::new(SimPositions::new(&["XOM"])),
        market_data.clone(),
        market_data,
        Arc::new(SimFeedConnector {
            seed,
            ..SimFeedConnector::default()
        }),
        ScannerRegistry::with_builtins(),
        Arc::new(TapeConsumerFactory),
    )
}

/// Run one full session against the simulated venue.
pub async fn run_trade(config: &AppConfig, seed: u64) -> Result<()> {
    let metrics = SessionMetrics::new();
    let metrics_addr: SocketAddr = config
        .metrics_addr
        .parse()
        .with_context(|| format!("invalid metrics address {}", config.metrics_addr))?;
    let server = spawn_metrics_server(metrics.registry(), metrics_addr);

    let runner = sim_runner(seed);
    let shutdown = ShutdownSignal::hooked_to_ctrl_c();
    let outcome = runner.run(config, shutdown).await?;
    match outcome {
        SessionOutcome::NotToday => println!("No trading session today."),
        SessionOutcome::MarketClosed => println!("Market already closed for today."),
        SessionOutcome::Interrupted => println!("Interrupted before the market opened."),
        SessionOutcome::EmptyUniverse => {
            warn!("scanners produced no tradable symbols");
            println!("Nothing to trade: empty universe.");
        }
        SessionOutcome::Completed(report) => {
            metrics.record_report(&report);
            println!(
                "Session complete: shards={}, routed={}, consumed={}, dropped={}, consumer_failures={}",
                report.shard_count,
                report.events_routed,
                report.events_consumed,
                report.events_dropped,
                report.consumer_failures
            );
        }
    }
    server.abort();
    Ok(())
}

/// Run the configured scanners once and print the discovered universe.
pub async fn run_scan(config: &AppConfig, seed: u64) -> Result<()> {
    config.validate()?;
    let runner = sim_runner(seed);
    let universe = runner.discover_universe(config).await?;
    info!(symbols = universe.len(), "scan complete");
    for symbol in &universe {
        println!("{symbol}");
    }
    Ok(())
}

/// Show how today's universe would be partitioned across consumers.
pub async fn run_shards(config: &AppConfig, seed: u64) -> Result<()> {
    config.validate()?;
    let runner = sim_runner(seed);
    let universe = runner.discover_universe(config).await?;
    let plan = ShardPlan::build(&universe, config.session.consumer_ratio)?;
    println!(
        "{} symbols across {} shards (ratio {})",
        universe.len(),
        plan.shard_count(),
        plan.ratio()
    );
    for (index, shard) in plan.shards().iter().enumerate() {
        println!("shard {index}: {}", shard.join(" "));
    }
    Ok(())
}
