//! Simulated collaborators for running a full session offline.
//!
//! Everything here is seeded and deterministic so two runs with the same
//! configuration produce the same universe and the same tape.

mod feed;
mod market;
mod tape;

pub use feed::{SimFeed, SimFeedConnector};
pub use market::{SimCalendar, SimMarketData, SimPositions};
pub use tape::{TapeConsumer, TapeConsumerFactory};
