//! Single-producer, per-shard-consumer event pipeline.
//!
//! One producer task pulls events off the live feed and routes each to the
//! bounded queue of the shard owning its symbol. One consumer task per shard
//! drains its queue in FIFO order. Queues are single-writer single-reader;
//! no event is shared across shards, so consumers never need to coordinate.
//!
//! End of session is signalled by closing the queues (the producer drops the
//! senders when the feed ends or the close time passes). Interrupt is
//! cooperative: every task selects on the shutdown signal, and a watchdog
//! aborts whatever is still running after the grace period.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{error, info, trace, warn};

use trellis_broker::MarketStream;
use trellis_core::{MarketEvent, MarketWindow, SessionId, ShardPlan, Symbol};

use crate::prefetch::HistoricalBuffer;
use crate::shutdown::ShutdownSignal;

/// Feed errors tolerated back-to-back before the producer gives up.
const MAX_CONSECUTIVE_FEED_ERRORS: u32 = 3;

/// Everything a consumer needs to start working its shard.
pub struct ShardContext {
    pub session_id: SessionId,
    pub shard_index: usize,
    /// Symbols owned by this shard, in universe order.
    pub symbols: Vec<Symbol>,
    /// Prefetched minute history for exactly those symbols.
    pub history: HistoricalBuffer,
}

/// Strategy-side handler for one shard's event stream.
///
/// Events arrive strictly in the order the producer routed them. A returned
/// error is logged and counted; it never stops the shard or the session.
#[async_trait]
pub trait EventConsumer: Send {
    async fn on_event(&mut self, event: MarketEvent) -> Result<()>;

    /// Called once after the last event, when the session ended normally.
    /// Not called on interrupt.
    async fn on_session_end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Builds one consumer per shard at pipeline startup.
pub trait ConsumerFactory: Send + Sync {
    fn build(&self, context: ShardContext) -> Box<dyn EventConsumer>;
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineSettings {
    /// Bounded depth of each shard queue.
    pub queue_depth: usize,
    /// How long tasks get to wind down after an interrupt before being aborted.
    pub shutdown_grace: Duration,
}

/// What happened during one pipeline run, for the closing log line and the
/// metrics exporter. Consumer errors are recorded here rather than propagated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub shard_count: usize,
    pub universe_symbols: usize,
    pub events_routed: u64,
    pub events_dropped: u64,
    pub events_consumed: u64,
    pub consumer_failures: u64,
    pub producer_failed: bool,
}

#[derive(Default)]
struct ConsumerCounters {
    consumed: AtomicU64,
    failures: AtomicU64,
}

struct ProducerStats {
    routed: u64,
    dropped: u64,
    failed: bool,
}

/// Run the full pipeline to completion: spawn consumers, then the producer,
/// route until the feed ends, the close time passes, or shutdown triggers,
/// then join everything. Child failures are absorbed into the report.
pub async fn run_pipeline(
    session_id: SessionId,
    plan: &ShardPlan,
    window: &MarketWindow,
    history: &HistoricalBuffer,
    stream: Box<dyn MarketStream>,
    factory: &dyn ConsumerFactory,
    settings: &PipelineSettings,
    shutdown: ShutdownSignal,
) -> PipelineReport {
    let shard_count = plan.shard_count();
    let counters = Arc::new(ConsumerCounters::default());
    let mut senders = Vec::with_capacity(shard_count);
    let mut consumer_handles = Vec::with_capacity(shard_count);
    let mut abort_handles: Vec<AbortHandle> = Vec::with_capacity(shard_count + 1);

    // Consumers come up before the producer so no queue is ever written
    // without a reader on the other end.
    for shard_index in 0..shard_count {
        let symbols = plan.symbols(shard_index).to_vec();
        let shard_history: HistoricalBuffer = symbols
            .iter()
            .filter_map(|s| history.get(s).map(|bars| (s.clone(), bars.clone())))
            .collect();
        let consumer = factory.build(ShardContext {
            session_id,
            shard_index,
            symbols,
            history: shard_history,
        });
        let (tx, rx) = mpsc::channel(settings.queue_depth);
        senders.push(tx);
        let handle = tokio::spawn(consumer_loop(
            consumer,
            rx,
            shard_index,
            shutdown.clone(),
            Arc::clone(&counters),
        ));
        abort_handles.push(handle.abort_handle());
        consumer_handles.push(handle);
    }
    info!(shards = shard_count, "consumers started");

    let producer_handle = tokio::spawn(producer_loop(
        stream,
        plan.clone(),
        senders,
        *window,
        shutdown.clone(),
    ));
    abort_handles.push(producer_handle.abort_handle());

    // After an interrupt, anything still running past the grace period gets
    // aborted so the run always terminates.
    let watchdog = tokio::spawn({
        let shutdown = shutdown.clone();
        let grace = settings.shutdown_grace;
        async move {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
            warn!("shutdown grace period expired, aborting remaining tasks");
            for handle in abort_handles {
                handle.abort();
            }
        }
    });

    // Join the producer first. Once it is gone the senders are dropped and
    // every consumer drains to completion on its own.
    let mut report = PipelineReport {
        shard_count,
        universe_symbols: plan.shards().iter().map(Vec::len).sum(),
        ..PipelineReport::default()
    };
    match producer_handle.await {
        Ok(stats) => {
            report.events_routed = stats.routed;
            report.events_dropped = stats.dropped;
            report.producer_failed = stats.failed;
        }
        Err(err) => {
            if !err.is_cancelled() {
                error!(%err, "producer task panicked");
                report.producer_failed = true;
            }
        }
    }

    for (shard_index, handle) in consumer_handles.into_iter().enumerate() {
        if let Err(err) = handle.await {
            if !err.is_cancelled() {
                error!(shard = shard_index, %err, "consumer task panicked");
                report.consumer_failures += 1;
            }
        }
    }
    watchdog.abort();

    report.events_consumed = counters.consumed.load(Ordering::Relaxed);
    report.consumer_failures += counters.failures.load(Ordering::Relaxed);
    report
}

async fn producer_loop(
    mut stream: Box<dyn MarketStream>,
    plan: ShardPlan,
    senders: Vec<mpsc::Sender<MarketEvent>>,
    window: MarketWindow,
    shutdown: ShutdownSignal,
) -> ProducerStats {
    let mut stats = ProducerStats {
        routed: 0,
        dropped: 0,
        failed: false,
    };
    let until_close = (window.close - Utc::now()).to_std().unwrap_or_default();
    let close_timer = tokio::time::sleep(until_close);
    tokio::pin!(close_timer);
    let mut consecutive_errors = 0u32;
    info!(feed = stream.name(), "producer started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("producer interrupted");
                break;
            }
            _ = &mut close_timer => {
                info!("market close reached, producer stopping");
                break;
            }
            next = stream.next_event() => match next {
                Ok(Some(event)) => {
                    consecutive_errors = 0;
                    match plan.shard_of(event.symbol()) {
                        Some(shard) => match senders[shard].try_send(event) {
                            Ok(()) => stats.routed += 1,
                            Err(mpsc::error::TrySendError::Full(event)) => {
                                stats.dropped += 1;
                                warn!(shard, symbol = event.symbol(), "shard queue full, dropping event");
                            }
                            Err(mpsc::error::TrySendError::Closed(event)) => {
                                stats.dropped += 1;
                                warn!(shard, symbol = event.symbol(), "shard queue closed, dropping event");
                            }
                        },
                        None => {
                            stats.dropped += 1;
                            trace!(symbol = event.symbol(), "no shard owns symbol, dropping event");
                        }
                    }
                }
                Ok(None) => {
                    info!("feed ended");
                    break;
                }
                Err(err) => {
                    consecutive_errors += 1;
                    warn!(%err, attempt = consecutive_errors, "feed error");
                    if consecutive_errors >= MAX_CONSECUTIVE_FEED_ERRORS {
                        error!("feed failed repeatedly, producer giving up");
                        stats.failed = true;
                        break;
                    }
                }
            }
        }
    }
    // Dropping the senders here closes every shard queue, which is the
    // consumers' normal end-of-session signal.
    stats
}

async fn consumer_loop(
    mut consumer: Box<dyn EventConsumer>,
    mut queue: mpsc::Receiver<MarketEvent>,
    shard: usize,
    shutdown: ShutdownSignal,
    counters: Arc<ConsumerCounters>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!(shard, "consumer interrupted");
                break;
            }
            received = queue.recv() => match received {
                Some(event) => match consumer.on_event(event).await {
                    Ok(()) => {
                        counters.consumed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(shard, %err, "consumer error, continuing");
                    }
                },
                None => {
                    if let Err(err) = consumer.on_session_end().await {
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(shard, %err, "consumer end-of-session hook failed");
                    }
                    break;
                }
            }
        }
    }
}
