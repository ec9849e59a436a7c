//! Live trading session orchestration.
//!
//! A session is one end-to-end run: gate on the market schedule, discover
//! the symbol universe (scanners plus open positions), prefetch history,
//! shard the universe, then drive the producer/consumer pipeline until the
//! market closes, the feed ends, or the operator interrupts.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use trellis_broker::{
    BrokerError, FeedConnector, HistoricalData, MarketCalendar, MarketScreen, PositionClient,
};
use trellis_config::{AppConfig, ConfigValidationError};
use trellis_core::{SessionId, ShardError, ShardPlan, SymbolUniverse};
use trellis_scanners::{ScannerError, ScannerRegistry};

mod gate;
mod pipeline;
mod prefetch;
mod shutdown;
mod window;

pub use gate::{GateOutcome, ReadinessGate};
pub use pipeline::{
    run_pipeline, ConsumerFactory, EventConsumer, PipelineReport, PipelineSettings, ShardContext,
};
pub use prefetch::{prefetch_history, HistoricalBuffer};
pub use shutdown::ShutdownSignal;
pub use window::resolve_window;

/// Failures that abort a session before or during setup. Child-task failures
/// inside the pipeline are not represented here; they end up in the
/// [`PipelineReport`] instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Scanner(#[from] ScannerError),
    #[error(transparent)]
    Shard(#[from] ShardError),
    #[error(transparent)]
    Config(#[from] ConfigValidationError),
}

/// How a session run ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Today is not a trading day; nothing was spawned.
    NotToday,
    /// The market had already closed when the run started.
    MarketClosed,
    /// Interrupted while waiting for the market to open.
    Interrupted,
    /// Discovery produced no tradable symbols with history.
    EmptyUniverse,
    /// The pipeline ran; the report says how it went.
    Completed(PipelineReport),
}

/// Owns the collaborators for one or more session runs and executes the
/// orchestration sequence.
pub struct SessionRunner {
    calendar: Arc<dyn MarketCalendar>,
    positions: Arc<dyn PositionClient>,
    history: Arc<dyn HistoricalData>,
    screen: Arc<dyn MarketScreen>,
    feed: Arc<dyn FeedConnector>,
    registry: ScannerRegistry,
    consumers: Arc<dyn ConsumerFactory>,
}

impl SessionRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        calendar: Arc<dyn MarketCalendar>,
        positions: Arc<dyn PositionClient>,
        history: Arc<dyn HistoricalData>,
        screen: Arc<dyn MarketScreen>,
        feed: Arc<dyn FeedConnector>,
        registry: ScannerRegistry,
        consumers: Arc<dyn ConsumerFactory>,
    ) -> Self {
        Self {
            calendar,
            positions,
            history,
            screen,
            feed,
            registry,
            consumers,
        }
    }

    /// Run one full session. Setup failures return an error; everything after
    /// the pipeline starts is absorbed into the returned outcome.
    pub async fn run(
        &self,
        config: &AppConfig,
        shutdown: ShutdownSignal,
    ) -> Result<SessionOutcome, SessionError> {
        config.validate()?;
        let session_id: SessionId = Uuid::new_v4();
        info!(
            version = env!("CARGO_PKG_VERSION"),
            %session_id,
            scanners = config.scanners.len(),
            strategies = config.strategies.len(),
            consumer_ratio = config.session.consumer_ratio,
            max_symbols = config.session.max_symbols,
            "session starting"
        );

        let gate = ReadinessGate::new(shutdown.clone(), config.bypass_market_schedule);
        let window = match gate
            .wait_until_open(self.calendar.as_ref(), Utc::now())
            .await?
        {
            GateOutcome::Ready(window) => window,
            GateOutcome::NotToday => {
                info!("not a trading day, session over");
                return Ok(SessionOutcome::NotToday);
            }
            GateOutcome::MarketClosed(window) => {
                info!(close = %window.close, "market already closed, session over");
                return Ok(SessionOutcome::MarketClosed);
            }
            GateOutcome::Interrupted => {
                info!("interrupted before the open, session over");
                return Ok(SessionOutcome::Interrupted);
            }
        };

        let mut universe = self.discover_universe(config).await?;

        let buffer = prefetch_history(
            self.history.as_ref(),
            &mut universe,
            config.session.max_symbols,
            config.session.history_lookback,
        )
        .await?;
        if universe.is_empty() {
            warn!("no tradable symbols with history, session over");
            return Ok(SessionOutcome::EmptyUniverse);
        }

        let plan = ShardPlan::build(&universe, config.session.consumer_ratio)?;
        info!(
            symbols = universe.len(),
            shards = plan.shard_count(),
            ratio = plan.ratio(),
            "shard plan built"
        );

        let stream = self.feed.connect(universe.as_slice()).await?;
        let settings = PipelineSettings {
            queue_depth: config.session.queue_depth,
            shutdown_grace: std::time::Duration::from_secs(config.session.shutdown_grace_secs),
        };
        let report = run_pipeline(
            session_id,
            &plan,
            &window,
            &buffer,
            stream,
            self.consumers.as_ref(),
            &settings,
            shutdown,
        )
        .await;

        info!(
            %session_id,
            routed = report.events_routed,
            dropped = report.events_dropped,
            consumed = report.events_consumed,
            consumer_failures = report.consumer_failures,
            producer_failed = report.producer_failed,
            "session run completed"
        );
        Ok(SessionOutcome::Completed(report))
    }

    /// Run the configured scanners and merge in open positions. This is the
    /// universe before the history filter narrows it.
    pub async fn discover_universe(
        &self,
        config: &AppConfig,
    ) -> Result<SymbolUniverse, SessionError> {
        let candidates = self
            .registry
            .run_all(&config.scanners, self.screen.clone())
            .await?;
        let mut universe = SymbolUniverse::from_scanner_output(candidates);
        info!(candidates = universe.len(), "scanners selected universe");

        let positions = self.positions.list_positions().await?;
        if positions.is_empty() {
            info!("no open positions");
        } else {
            let added = universe.track_positions(positions.into_iter().map(|p| p.symbol));
            info!(
                tracked = added.len(),
                "open positions folded into universe"
            );
        }
        Ok(universe)
    }
}
