use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::config::Config;

/// Regular trading session of the exchange the stored data comes from.
#[derive(Debug, Clone, Copy)]
pub struct MarketClock {
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub tz: Tz,
}

impl MarketClock {
    pub fn new(open: NaiveTime, close: NaiveTime, tz: Tz) -> Self {
        Self { open, close, tz }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.market_open, cfg.market_close, cfg.market_tz)
    }

    pub fn is_market_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz);
        if is_weekend(local.date_naive()) {
            return false;
        }
        let t = local.time();
        t >= self.open && t < self.close
    }

    /// Most recent weekday session close at or before `now`.
    pub fn last_market_close(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut day = now.with_timezone(&self.tz).date_naive();
        loop {
            if !is_weekend(day) {
                let close = self.at_exchange_time(day.and_time(self.close));
                if close <= now {
                    return close;
                }
            }
            day -= TimeDelta::days(1);
        }
    }

    /// A stored value is current when nothing has traded since it was written:
    /// never during the session, otherwise only if written after the last close.
    pub fn is_up_to_date(&self, updated: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.is_market_open(now) {
            return false;
        }
        updated >= self.last_market_close(now)
    }

    fn at_exchange_time(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        // DST gaps only affect the small hours, never a session close.
        match self.tz.from_local_datetime(&naive).earliest() {
            Some(dt) => dt.with_timezone(&Utc),
            None => Utc.from_utc_datetime(&naive),
        }
    }
}

fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}
