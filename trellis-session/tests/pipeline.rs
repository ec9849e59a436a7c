//! End-to-end pipeline behavior with scripted feeds and recording consumers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use trellis_broker::{BrokerResult, MarketStream};
use trellis_core::{MarketEvent, MarketWindow, ShardPlan, SymbolUniverse};
use trellis_session::{
    run_pipeline, ConsumerFactory, EventConsumer, HistoricalBuffer, PipelineSettings,
    ShardContext, ShutdownSignal,
};

fn trade(symbol: &str) -> MarketEvent {
    MarketEvent::Trade {
        symbol: symbol.into(),
        price: Decimal::from(10),
        size: Decimal::ONE,
        timestamp: Utc::now(),
    }
}

fn open_window() -> MarketWindow {
    let now = Utc::now();
    MarketWindow {
        open: now,
        close: now + chrono::Duration::hours(1),
        bypass: false,
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        queue_depth: 64,
        shutdown_grace: Duration::from_millis(200),
    }
}

fn plan_for(symbols: &[&str], ratio: usize) -> ShardPlan {
    let universe = SymbolUniverse::from_scanner_output(symbols.iter().copied());
    ShardPlan::build(&universe, ratio).unwrap()
}

/// Feed that yields a fixed script of events, then ends.
struct ScriptedStream(VecDeque<MarketEvent>);

impl ScriptedStream {
    fn new(events: Vec<MarketEvent>) -> Box<dyn MarketStream> {
        Box::new(Self(events.into()))
    }
}

#[async_trait]
impl MarketStream for ScriptedStream {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn next_event(&mut self) -> BrokerResult<Option<MarketEvent>> {
        Ok(self.0.pop_front())
    }
}

/// Feed that never produces anything; only shutdown can end the run.
struct StuckStream;

#[async_trait]
impl MarketStream for StuckStream {
    fn name(&self) -> &str {
        "stuck"
    }

    async fn next_event(&mut self) -> BrokerResult<Option<MarketEvent>> {
        std::future::pending().await
    }
}

#[derive(Default)]
struct Recording {
    events: Vec<(usize, String)>,
    ended_shards: Vec<usize>,
}

struct RecordingConsumer {
    shard: usize,
    log: Arc<Mutex<Recording>>,
    fail_on: Option<String>,
}

#[async_trait]
impl EventConsumer for RecordingConsumer {
    async fn on_event(&mut self, event: MarketEvent) -> anyhow::Result<()> {
        let symbol = event.symbol().to_string();
        self.log
            .lock()
            .unwrap()
            .events
            .push((self.shard, symbol.clone()));
        if self.fail_on.as_deref() == Some(symbol.as_str()) {
            anyhow::bail!("injected failure for {symbol}");
        }
        Ok(())
    }

    async fn on_session_end(&mut self) -> anyhow::Result<()> {
        self.log.lock().unwrap().ended_shards.push(self.shard);
        Ok(())
    }
}

struct RecordingFactory {
    log: Arc<Mutex<Recording>>,
    fail_on: Option<String>,
}

impl RecordingFactory {
    fn new() -> (Self, Arc<Mutex<Recording>>) {
        let log = Arc::new(Mutex::new(Recording::default()));
        (
            Self {
                log: Arc::clone(&log),
                fail_on: None,
            },
            log,
        )
    }

    fn failing_on(symbol: &str) -> (Self, Arc<Mutex<Recording>>) {
        let (mut factory, log) = Self::new();
        factory.fail_on = Some(symbol.to_string());
        (factory, log)
    }
}

impl ConsumerFactory for RecordingFactory {
    fn build(&self, context: ShardContext) -> Box<dyn EventConsumer> {
        Box::new(RecordingConsumer {
            shard: context.shard_index,
            log: Arc::clone(&self.log),
            fail_on: self.fail_on.clone(),
        })
    }
}

#[tokio::test]
async fn events_reach_only_the_owning_shard() {
    let plan = plan_for(&["A", "B", "C", "D", "E"], 2);
    let (factory, log) = RecordingFactory::new();
    let report = run_pipeline(
        Uuid::new_v4(),
        &plan,
        &open_window(),
        &HistoricalBuffer::new(),
        ScriptedStream::new(vec![trade("C"), trade("A"), trade("E")]),
        &factory,
        &settings(),
        ShutdownSignal::new(),
    )
    .await;

    assert_eq!(report.shard_count, 3);
    assert_eq!(report.universe_symbols, 5);
    assert_eq!(report.events_routed, 3);
    assert_eq!(report.events_consumed, 3);
    let log = log.lock().unwrap();
    assert!(log.events.contains(&(1, "C".into())));
    assert!(log.events.contains(&(0, "A".into())));
    assert!(log.events.contains(&(2, "E".into())));
}

#[tokio::test]
async fn events_are_consumed_in_feed_order_within_a_shard() {
    let plan = plan_for(&["A", "B"], 2);
    let (factory, log) = RecordingFactory::new();
    let script = vec![trade("A"), trade("B"), trade("A"), trade("B"), trade("A")];
    let expected: Vec<(usize, String)> = script
        .iter()
        .map(|e| (0, e.symbol().to_string()))
        .collect();
    run_pipeline(
        Uuid::new_v4(),
        &plan,
        &open_window(),
        &HistoricalBuffer::new(),
        ScriptedStream::new(script),
        &factory,
        &settings(),
        ShutdownSignal::new(),
    )
    .await;

    assert_eq!(log.lock().unwrap().events, expected);
}

#[tokio::test]
async fn feed_end_runs_every_consumer_end_hook() {
    let plan = plan_for(&["A", "B", "C"], 1);
    let (factory, log) = RecordingFactory::new();
    run_pipeline(
        Uuid::new_v4(),
        &plan,
        &open_window(),
        &HistoricalBuffer::new(),
        ScriptedStream::new(Vec::new()),
        &factory,
        &settings(),
        ShutdownSignal::new(),
    )
    .await;

    let mut ended = log.lock().unwrap().ended_shards.clone();
    ended.sort_unstable();
    assert_eq!(ended, [0, 1, 2]);
}

#[tokio::test]
async fn unroutable_events_are_dropped_and_counted() {
    let plan = plan_for(&["A"], 1);
    let (factory, log) = RecordingFactory::new();
    let report = run_pipeline(
        Uuid::new_v4(),
        &plan,
        &open_window(),
        &HistoricalBuffer::new(),
        ScriptedStream::new(vec![trade("ZZZ"), trade("A")]),
        &factory,
        &settings(),
        ShutdownSignal::new(),
    )
    .await;

    assert_eq!(report.events_routed, 1);
    assert_eq!(report.events_dropped, 1);
    assert_eq!(log.lock().unwrap().events, [(0, "A".into())]);
}

#[tokio::test]
async fn consumer_error_is_counted_but_does_not_stop_the_shard() {
    let plan = plan_for(&["A", "B"], 2);
    let (factory, log) = RecordingFactory::failing_on("A");
    let report = run_pipeline(
        Uuid::new_v4(),
        &plan,
        &open_window(),
        &HistoricalBuffer::new(),
        ScriptedStream::new(vec![trade("A"), trade("B")]),
        &factory,
        &settings(),
        ShutdownSignal::new(),
    )
    .await;

    assert_eq!(report.consumer_failures, 1);
    assert_eq!(report.events_consumed, 1);
    // The shard kept going after the failure and still ended cleanly.
    let log = log.lock().unwrap();
    assert_eq!(log.events.len(), 2);
    assert_eq!(log.ended_shards, [0]);
}

#[tokio::test]
async fn interrupt_terminates_a_stuck_pipeline() {
    let _ = tracing_subscriber::fmt::try_init();
    let plan = plan_for(&["A", "B", "C", "D"], 2);
    let (factory, log) = RecordingFactory::new();
    let shutdown = ShutdownSignal::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        run_pipeline(
            Uuid::new_v4(),
            &plan,
            &open_window(),
            &HistoricalBuffer::new(),
            Box::new(StuckStream),
            &factory,
            &settings(),
            shutdown,
        ),
    )
    .await
    .expect("pipeline must terminate after interrupt");

    assert_eq!(report.events_routed, 0);
    // Interrupted shards skip the end-of-session hook.
    assert!(log.lock().unwrap().ended_shards.is_empty());
}

#[tokio::test]
async fn shard_context_carries_only_owned_history() {
    let plan = plan_for(&["A", "B", "C"], 2);
    let mut history = HistoricalBuffer::new();
    for symbol in ["A", "B", "C"] {
        history.insert(symbol.into(), Vec::new());
    }

    struct ContextProbe(Arc<Mutex<Vec<(usize, Vec<String>)>>>);

    impl ConsumerFactory for ContextProbe {
        fn build(&self, context: ShardContext) -> Box<dyn EventConsumer> {
            let mut keys: Vec<String> = context.history.keys().cloned().collect();
            keys.sort();
            self.0.lock().unwrap().push((context.shard_index, keys));
            Box::new(NullConsumer)
        }
    }

    struct NullConsumer;

    #[async_trait]
    impl EventConsumer for NullConsumer {
        async fn on_event(&mut self, _event: MarketEvent) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    run_pipeline(
        Uuid::new_v4(),
        &plan,
        &open_window(),
        &history,
        ScriptedStream::new(Vec::new()),
        &ContextProbe(Arc::clone(&seen)),
        &settings(),
        ShutdownSignal::new(),
    )
    .await;

    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(
        seen,
        [
            (0, vec!["A".to_string(), "B".to_string()]),
            (1, vec!["C".to_string()])
        ]
    );
}
