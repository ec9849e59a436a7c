//! Market window resolution against the calendar collaborator.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use trellis_broker::{session_bounds, MarketCalendar};
use trellis_core::MarketWindow;

use crate::SessionError;

/// Length of a synthetic session used when gating is bypassed but the
/// calendar offers no window today.
const REGULAR_SESSION_MINUTES: i64 = 390;

/// Resolve today's trading window, or `None` when today is not a trading
/// day. With `bypass` set, a window is always produced: the calendar's when
/// one exists for today, otherwise a synthetic one starting now.
pub async fn resolve_window(
    calendar: &dyn MarketCalendar,
    now: DateTime<Utc>,
    bypass: bool,
) -> Result<Option<MarketWindow>, SessionError> {
    let today = now.date_naive();
    let next = calendar.next_session(today).await?;

    if let Some(day) = next {
        info!(next_open = %day.date, "next trading session");
        if day.date == today {
            let (open, close) = session_bounds(&day);
            // A bypassed session still needs a close time in the future,
            // otherwise the producer would stop immediately.
            if bypass && close <= now {
                return Ok(Some(synthetic_window(now)));
            }
            return Ok(Some(MarketWindow {
                open,
                close,
                bypass,
            }));
        }
        info!(today = %today, "which is not today");
    }

    if bypass {
        return Ok(Some(synthetic_window(now)));
    }
    Ok(None)
}

fn synthetic_window(now: DateTime<Utc>) -> MarketWindow {
    MarketWindow {
        open: now,
        close: now + Duration::minutes(REGULAR_SESSION_MINUTES),
        bypass: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use trellis_broker::{BrokerResult, CalendarDay};

    struct FixedCalendar(Option<CalendarDay>);

    #[async_trait]
    impl MarketCalendar for FixedCalendar {
        async fn next_session(&self, _from: NaiveDate) -> BrokerResult<Option<CalendarDay>> {
            Ok(self.0)
        }
    }

    fn day(date: NaiveDate) -> CalendarDay {
        CalendarDay {
            date,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn trading_day_yields_todays_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
        let calendar = FixedCalendar(Some(day(now.date_naive())));
        let window = resolve_window(&calendar, now, false).await.unwrap().unwrap();
        assert_eq!(window.open, Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap());
        assert_eq!(window.close, Utc.with_ymd_and_hms(2024, 3, 4, 16, 0, 0).unwrap());
        assert!(!window.bypass);
    }

    #[tokio::test]
    async fn future_trading_date_is_not_today() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap();
        let calendar = FixedCalendar(Some(day(
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
        )));
        assert!(resolve_window(&calendar, now, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bypass_after_todays_close_still_gets_a_future_close() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 22, 0, 0).unwrap();
        let calendar = FixedCalendar(Some(day(now.date_naive())));
        let window = resolve_window(&calendar, now, true).await.unwrap().unwrap();
        assert!(window.bypass);
        assert!(window.close > now);
    }

    #[tokio::test]
    async fn bypass_synthesizes_a_window_on_closed_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap();
        let calendar = FixedCalendar(None);
        let window = resolve_window(&calendar, now, true).await.unwrap().unwrap();
        assert!(window.bypass);
        assert_eq!(window.open, now);
        assert!(window.close > now);
    }
}
