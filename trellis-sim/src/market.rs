//! Simulated calendar, positions, screening, and historical data.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use trellis_broker::{
    BrokerError, BrokerResult, CalendarDay, HistoricalData, MarketCalendar, MarketScreen,
    OpenPosition, PositionClient, SymbolSnapshot,
};
use trellis_core::{Bar, Symbol};

/// Weekday-only calendar with a fixed 09:30 to 16:00 session.
pub struct SimCalendar;

#[async_trait]
impl MarketCalendar for SimCalendar {
    async fn next_session(&self, from: NaiveDate) -> BrokerResult<Option<CalendarDay>> {
        let mut date = from;
        while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date = date.succ_opt().ok_or_else(|| {
                BrokerError::Other("calendar date overflow".into())
            })?;
        }
        Ok(Some(CalendarDay {
            date,
            open: NaiveTime::from_hms_opt(9, 30, 0).expect("valid time"),
            close: NaiveTime::from_hms_opt(16, 0, 0).expect("valid time"),
        }))
    }
}

/// Fixed set of open positions.
#[derive(Default)]
pub struct SimPositions(Vec<OpenPosition>);

impl SimPositions {
    #[must_use]
    pub fn new(symbols: &[&str]) -> Self {
        Self(
            symbols
                .iter()
                .map(|s| OpenPosition {
                    symbol: (*s).to_string(),
                    quantity: Decimal::from(10),
                    avg_entry_price: Some(Decimal::from(100)),
                })
                .collect(),
        )
    }
}

#[async_trait]
impl PositionClient for SimPositions {
    async fn list_positions(&self) -> BrokerResult<Vec<OpenPosition>> {
        Ok(self.0.clone())
    }
}

/// Seeded source of screening snapshots and minute-bar history for a fixed
/// symbol set. Symbols outside the set get no snapshot and no history.
pub struct SimMarketData {
    symbols: Vec<Symbol>,
    seed: u64,
}

impl SimMarketData {
    #[must_use]
    pub fn new(symbols: Vec<Symbol>, seed: u64) -> Self {
        Self { symbols, seed }
    }

    fn rng_for(&self, salt: u64) -> StdRng {
        StdRng::seed_from_u64(self.seed.wrapping_add(salt))
    }
}

#[async_trait]
impl HistoricalData for SimMarketData {
    async fn minute_bars(
        &self,
        symbols: &[Symbol],
        lookback: usize,
    ) -> BrokerResult<HashMap<Symbol, Vec<Bar>>> {
        let step = Normal::new(0.0, 0.05).map_err(|e| BrokerError::Other(e.to_string()))?;
        let start = Utc::now() - Duration::minutes(lookback as i64);
        let mut out = HashMap::new();
        for (salt, symbol) in symbols.iter().enumerate() {
            if !self.symbols.contains(symbol) {
                continue;
            }
            let mut rng = self.rng_for(salt as u64);
            let mut price = 100.0_f64;
            let mut bars = Vec::with_capacity(lookback);
            for minute in 0..lookback {
                let open = price;
                price = (price + step.sample(&mut rng)).max(0.01);
                let close = price;
                let high = open.max(close) + 0.01;
                let low = open.min(close) - 0.01;
                bars.push(Bar {
                    symbol: symbol.clone(),
                    open: decimal(open),
                    high: decimal(high),
                    low: decimal(low.max(0.01)),
                    close: decimal(close),
                    volume: Decimal::from(1_000),
                    timestamp: start + Duration::minutes(minute as i64),
                });
            }
            out.insert(symbol.clone(), bars);
        }
        Ok(out)
    }
}

#[async_trait]
impl MarketScreen for SimMarketData {
    async fn most_active(&self, max: usize) -> BrokerResult<Vec<SymbolSnapshot>> {
        Ok(self
            .symbols
            .iter()
            .take(max)
            .map(|symbol| SymbolSnapshot {
                symbol: symbol.clone(),
                last_price: Decimal::from(10),
                day_volume: Decimal::from(250_000),
                prev_day_dollar_volume: Decimal::from(2_500_000),
                today_change_percent: Decimal::from(5),
            })
            .collect())
    }
}

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(4)
}
