//! Session readiness gate.
//!
//! RESOLVING -> WAITING -> READY | NOT_READY. The pre-open wait is
//! interruptible: a shutdown trigger received while blocked unblocks the
//! gate promptly and nothing is spawned afterwards.

use chrono::{DateTime, Utc};
use tracing::info;

use trellis_broker::MarketCalendar;
use trellis_core::MarketWindow;

use crate::shutdown::ShutdownSignal;
use crate::window::resolve_window;
use crate::SessionError;

/// Terminal gate states.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GateOutcome {
    /// The market is (or is about to be) open; start the session.
    Ready(MarketWindow),
    /// Today is not a trading day; exit cleanly without spawning.
    NotToday,
    /// Today's session has already closed.
    MarketClosed(MarketWindow),
    /// Interrupted while waiting for the open.
    Interrupted,
}

pub struct ReadinessGate {
    shutdown: ShutdownSignal,
    bypass: bool,
}

impl ReadinessGate {
    #[must_use]
    pub fn new(shutdown: ShutdownSignal, bypass: bool) -> Self {
        Self { shutdown, bypass }
    }

    /// Resolve today's window and block until the market opens.
    pub async fn wait_until_open(
        &self,
        calendar: &dyn MarketCalendar,
        now: DateTime<Utc>,
    ) -> Result<GateOutcome, SessionError> {
        info!("checking market schedule");
        let Some(window) = resolve_window(calendar, now, self.bypass).await? else {
            return Ok(GateOutcome::NotToday);
        };

        if window.bypass {
            info!("bypassing market schedule, are we debugging something?");
            return Ok(GateOutcome::Ready(window));
        }

        info!(open = %window.open, close = %window.close, "market window resolved");
        if window.has_closed(now) {
            return Ok(GateOutcome::MarketClosed(window));
        }

        if !window.is_open_at(now) {
            let wait = (window.open - now)
                .to_std()
                .unwrap_or_default()
                .saturating_add(std::time::Duration::from_secs(1));
            info!(seconds = wait.as_secs(), "waiting for market open");
            if !self.shutdown.sleep(wait).await {
                return Ok(GateOutcome::Interrupted);
            }
        }
        Ok(GateOutcome::Ready(window))
    }
}
