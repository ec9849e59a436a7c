//! Exchange-agnostic traits the session orchestrator is built against.
//!
//! Every external collaborator named by the runtime (market calendar, open
//! positions, historical data, symbol screening, live feed) sits behind one
//! of these traits so connectors can be swapped without touching the
//! pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use trellis_core::{Bar, MarketEvent, Price, Quantity, Symbol};

/// Convenience alias for broker results.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Common error type returned by collaborator implementations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Represents transport-level failures (network, timeouts, etc.).
    #[error("transport error: {0}")]
    Transport(String),
    /// Returned when authentication fails or credentials are missing.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// Returned when the request parameters are invalid for the target venue.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Wraps serialization or parsing errors.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Venue responded with a business error.
    #[error("venue error: {0}")]
    Venue(String),
    /// A catch-all branch for other issues.
    #[error("unexpected error: {0}")]
    Other(String),
}

/// One trading day's schedule as reported by the market calendar.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

/// Market-calendar collaborator: resolves the next trading date at or after
/// a given date, with that day's open/close time-of-day.
#[async_trait]
pub trait MarketCalendar: Send + Sync {
    async fn next_session(&self, from: NaiveDate) -> BrokerResult<Option<CalendarDay>>;
}

/// An open position held at the broker.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OpenPosition {
    pub symbol: Symbol,
    pub quantity: Quantity,
    pub avg_entry_price: Option<Price>,
}

/// Open-positions collaborator.
#[async_trait]
pub trait PositionClient: Send + Sync {
    async fn list_positions(&self) -> BrokerResult<Vec<OpenPosition>>;
}

/// Historical data collaborator: bulk-fetches recent minute bars for a set
/// of symbols. Symbols with no retrievable history are simply absent from
/// the returned map.
#[async_trait]
pub trait HistoricalData: Send + Sync {
    async fn minute_bars(
        &self,
        symbols: &[Symbol],
        lookback: usize,
    ) -> BrokerResult<HashMap<Symbol, Vec<Bar>>>;
}

/// Daily activity snapshot used by scanners to screen candidates.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SymbolSnapshot {
    pub symbol: Symbol,
    pub last_price: Price,
    pub day_volume: Quantity,
    pub prev_day_dollar_volume: Price,
    pub today_change_percent: Price,
}

/// Screening collaborator queried by scanner implementations.
#[async_trait]
pub trait MarketScreen: Send + Sync {
    /// The most active symbols today, in descending activity order.
    async fn most_active(&self, max: usize) -> BrokerResult<Vec<SymbolSnapshot>>;
}

/// Live feed subscription: the producer pulls events in FIFO order until the
/// feed ends (`Ok(None)`) or the session is torn down.
#[async_trait]
pub trait MarketStream: Send {
    /// Human-friendly name of the connector used for logging purposes.
    fn name(&self) -> &str;

    /// Fetch the next market-data event in FIFO order.
    async fn next_event(&mut self) -> BrokerResult<Option<MarketEvent>>;
}

impl std::fmt::Debug for dyn MarketStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketStream")
            .field("name", &self.name())
            .finish()
    }
}

/// Builds a live stream subscribed to the session's final symbol universe.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self, symbols: &[Symbol]) -> BrokerResult<Box<dyn MarketStream>>;
}

/// Resolve a calendar day's open/close times onto concrete UTC instants for
/// the session date.
#[must_use]
pub fn session_bounds(day: &CalendarDay) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        day.date.and_time(day.open).and_utc(),
        day.date.and_time(day.close).and_utc(),
    )
}
