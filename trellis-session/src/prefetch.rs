//! Historical prefetch: bulk-load recent minute bars for the universe and
//! drop symbols with no retrievable history before sharding.

use std::collections::HashMap;

use tracing::{debug, info};

use trellis_broker::HistoricalData;
use trellis_core::{Bar, Symbol, SymbolUniverse};

use crate::SessionError;

/// Per-symbol minute-bar history handed to each consumer at startup.
pub type HistoricalBuffer = HashMap<Symbol, Vec<Bar>>;

/// Fetch `lookback` minute bars for at most `max_symbols` symbols and shrink
/// the universe to exactly the symbols that came back with data. The filtered
/// universe is the authoritative one from here on: only those symbols get a
/// shard slot and a feed subscription.
pub async fn prefetch_history(
    data: &dyn HistoricalData,
    universe: &mut SymbolUniverse,
    max_symbols: usize,
    lookback: usize,
) -> Result<HistoricalBuffer, SessionError> {
    let take = max_symbols.min(universe.len());
    let requested: Vec<Symbol> = universe.iter().take(take).cloned().collect();
    info!(
        requested = requested.len(),
        lookback, "prefetching minute history"
    );

    let buffer = data.minute_bars(&requested, lookback).await?;

    universe.retain(|symbol| {
        let keep = buffer.contains_key(symbol);
        if !keep {
            debug!(%symbol, "dropping symbol without history");
        }
        keep
    });
    info!(symbols = universe.len(), "historical prefetch complete");
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::Mutex;
    use trellis_broker::BrokerResult;

    struct PartialHistory {
        available: Vec<Symbol>,
        last_request: Mutex<Vec<Symbol>>,
    }

    impl PartialHistory {
        fn new(available: &[&str]) -> Self {
            Self {
                available: available.iter().map(|s| s.to_string()).collect(),
                last_request: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HistoricalData for PartialHistory {
        async fn minute_bars(
            &self,
            symbols: &[Symbol],
            _lookback: usize,
        ) -> BrokerResult<HashMap<Symbol, Vec<Bar>>> {
            *self.last_request.lock().unwrap() = symbols.to_vec();
            Ok(symbols
                .iter()
                .filter(|s| self.available.contains(s))
                .map(|s| {
                    (
                        s.clone(),
                        vec![Bar {
                            symbol: s.clone(),
                            open: Decimal::ONE,
                            high: Decimal::ONE,
                            low: Decimal::ONE,
                            close: Decimal::ONE,
                            volume: Decimal::from(100),
                            timestamp: Utc::now(),
                        }],
                    )
                })
                .collect())
        }
    }

    fn universe(symbols: &[&str]) -> SymbolUniverse {
        SymbolUniverse::from_scanner_output(symbols.iter().map(|s| s.to_string()))
    }

    #[tokio::test]
    async fn symbols_without_history_are_dropped_in_order() {
        let data = PartialHistory::new(&["A", "C", "D"]);
        let mut universe = universe(&["A", "B", "C", "D"]);
        let buffer = prefetch_history(&data, &mut universe, 10, 390)
            .await
            .unwrap();
        assert_eq!(universe.iter().cloned().collect::<Vec<_>>(), ["A", "C", "D"]);
        assert_eq!(buffer.len(), 3);
        assert!(!buffer.contains_key("B"));
    }

    #[tokio::test]
    async fn request_is_capped_at_max_symbols() {
        let data = PartialHistory::new(&["A", "B"]);
        let mut universe = universe(&["A", "B", "C", "D"]);
        prefetch_history(&data, &mut universe, 2, 390).await.unwrap();
        assert_eq!(*data.last_request.lock().unwrap(), ["A", "B"]);
        // Unrequested symbols have no history and so are dropped too.
        assert_eq!(universe.len(), 2);
    }

    #[tokio::test]
    async fn empty_universe_requests_nothing() {
        let data = PartialHistory::new(&[]);
        let mut universe = universe(&[]);
        let buffer = prefetch_history(&data, &mut universe, 10, 390)
            .await
            .unwrap();
        assert!(buffer.is_empty());
        assert!(universe.is_empty());
    }
}
