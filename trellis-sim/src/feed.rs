//! Seeded random-walk trade feed.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use trellis_broker::{BrokerError, BrokerResult, FeedConnector, MarketStream};
use trellis_core::{MarketEvent, Symbol};

/// Connects seeded [`SimFeed`] streams over whatever symbol set the session
/// settled on. `events_per_symbol` bounds the run so offline sessions finish
/// on their own.
pub struct SimFeedConnector {
    pub seed: u64,
    pub events_per_symbol: usize,
    pub tick_interval: Duration,
}

impl Default for SimFeedConnector {
    fn default() -> Self {
        Self {
            seed: 42,
            events_per_symbol: 100,
            tick_interval: Duration::from_millis(1),
        }
    }
}

#[async_trait]
impl FeedConnector for SimFeedConnector {
    async fn connect(&self, symbols: &[Symbol]) -> BrokerResult<Box<dyn MarketStream>> {
        if symbols.is_empty() {
            return Err(BrokerError::InvalidRequest(
                "cannot subscribe to an empty symbol list".into(),
            ));
        }
        Ok(Box::new(SimFeed {
            symbols: symbols.to_vec(),
            prices: symbols.iter().map(|s| (s.clone(), 100.0)).collect(),
            rng: StdRng::seed_from_u64(self.seed),
            step: Normal::new(0.0, 0.05).map_err(|e| BrokerError::Other(e.to_string()))?,
            remaining: self.events_per_symbol.saturating_mul(symbols.len()),
            cursor: 0,
            tick_interval: self.tick_interval,
        }))
    }
}

/// Round-robin trade generator: each subscribed symbol ticks in turn with a
/// random-walk price, so per-symbol FIFO order is trivially observable.
pub struct SimFeed {
    symbols: Vec<Symbol>,
    prices: HashMap<Symbol, f64>,
    rng: StdRng,
    step: Normal<f64>,
    remaining: usize,
    cursor: usize,
    tick_interval: Duration,
}

#[async_trait]
impl MarketStream for SimFeed {
    fn name(&self) -> &str {
        "sim"
    }

    async fn next_event(&mut self) -> BrokerResult<Option<MarketEvent>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        tokio::time::sleep(self.tick_interval).await;

        let symbol = self.symbols[self.cursor % self.symbols.len()].clone();
        self.cursor += 1;
        let price = self
            .prices
            .get_mut(&symbol)
            .ok_or_else(|| BrokerError::Other(format!("untracked symbol {symbol}")))?;
        *price = (*price + self.step.sample(&mut self.rng)).max(0.01);

        Ok(Some(MarketEvent::Trade {
            symbol,
            price: Decimal::from_f64(*price).unwrap_or_default().round_dp(4),
            size: Decimal::from(100),
            timestamp: Utc::now(),
        }))
    }
}
