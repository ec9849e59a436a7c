//! Tape consumer: logs every event it receives and summarizes at the end.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use trellis_core::{MarketEvent, SessionId, Symbol};
use trellis_session::{ConsumerFactory, EventConsumer, ShardContext};

/// Consumer that records the tape instead of trading it. Useful for dry runs
/// and as the reference consumer in end-to-end tests.
pub struct TapeConsumer {
    session_id: SessionId,
    shard: usize,
    counts: HashMap<Symbol, u64>,
}

impl TapeConsumer {
    #[must_use]
    pub fn new(context: &ShardContext) -> Self {
        info!(
            session_id = %context.session_id,
            shard = context.shard_index,
            symbols = context.symbols.len(),
            history = context.history.len(),
            "tape consumer ready"
        );
        Self {
            session_id: context.session_id,
            shard: context.shard_index,
            counts: HashMap::new(),
        }
    }
}

#[async_trait]
impl EventConsumer for TapeConsumer {
    async fn on_event(&mut self, event: MarketEvent) -> Result<()> {
        debug!(
            shard = self.shard,
            symbol = event.symbol(),
            timestamp = %event.timestamp(),
            "tape event"
        );
        *self.counts.entry(event.symbol().to_string()).or_default() += 1;
        Ok(())
    }

    async fn on_session_end(&mut self) -> Result<()> {
        let total: u64 = self.counts.values().sum();
        info!(
            session_id = %self.session_id,
            shard = self.shard,
            symbols = self.counts.len(),
            events = total,
            "tape complete"
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct TapeConsumerFactory;

impl ConsumerFactory for TapeConsumerFactory {
    fn build(&self, context: ShardContext) -> Box<dyn EventConsumer> {
        Box::new(TapeConsumer::new(&context))
    }
}
