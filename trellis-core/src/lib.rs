//! Fundamental data types shared across the entire workspace.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod shard;
mod universe;

pub use shard::{ShardError, ShardPlan};
pub use universe::SymbolUniverse;

/// Alias for price precision.
pub type Price = Decimal;
/// Alias for quantity precision.
pub type Quantity = Decimal;
/// Alias used for human-readable ticker symbols (e.g., `AAPL`).
pub type Symbol = String;

/// Opaque token identifying one end-to-end session run, threaded through
/// every producer and consumer for log correlation.
pub type SessionId = Uuid;

/// Aggregated OHLCV bar data.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    pub timestamp: DateTime<Utc>,
}

/// Market-data event emitted by the live feed and routed to shard queues.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum MarketEvent {
    /// A single executed trade print.
    Trade {
        symbol: Symbol,
        price: Price,
        size: Quantity,
        timestamp: DateTime<Utc>,
    },
    /// Top-of-book quote update.
    Quote {
        symbol: Symbol,
        bid: Price,
        ask: Price,
        timestamp: DateTime<Utc>,
    },
    /// Completed minute aggregate.
    MinuteBar(Bar),
}

impl MarketEvent {
    /// The ticker symbol this event is tagged with, used for shard routing.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Trade { symbol, .. } | Self::Quote { symbol, .. } => symbol,
            Self::MinuteBar(bar) => &bar.symbol,
        }
    }

    /// Exchange timestamp carried by the event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Trade { timestamp, .. } | Self::Quote { timestamp, .. } => *timestamp,
            Self::MinuteBar(bar) => bar.timestamp,
        }
    }
}

/// Today's trading session boundaries, produced once per session.
///
/// `bypass` short-circuits readiness gating; the window is still carried so
/// the producer always has a close time to stop on.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct MarketWindow {
    pub open: DateTime<Utc>,
    pub close: DateTime<Utc>,
    pub bypass: bool,
}

impl MarketWindow {
    /// True when `now` falls inside the session (or gating is bypassed).
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.bypass || (now >= self.open && now < self.close)
    }

    /// True once the close boundary has passed.
    #[must_use]
    pub fn has_closed(&self, now: DateTime<Utc>) -> bool {
        now >= self.close
    }
}
