//! Time source and calendar-day arithmetic.
//!
//! Every day boundary in the engine is taken in one fixed UTC offset (the
//! team's local time), so "today" and snapshot dates agree no matter where
//! the process runs.

use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::sync::RwLock;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant. Used by tests and by replays of
/// historical data.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut writer) = self.now.write() {
            *writer = now;
        }
    }

    pub fn advance(&self, delta: Duration) {
        if let Ok(mut writer) = self.now.write() {
            *writer += delta;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(reader) => *reader,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

pub fn offset_from_minutes(minutes: i32) -> AppResult<FixedOffset> {
    FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| AppError::Config(format!("UTC offset of {} minutes is out of range", minutes)))
}

/// Calendar day an instant falls on in the given offset.
pub fn local_day(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// UTC instant of local midnight starting `day`.
pub fn start_of_day(day: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    local_instant(day.and_time(NaiveTime::default()), offset)
}

/// UTC instant of a local wall-clock time.
pub fn local_instant(naive: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    let shifted = naive - Duration::seconds(i64::from(offset.local_minus_utc()));
    Utc.from_utc_datetime(&shifted)
}

/// `ceil((to - from) / 1 day)`, negative when `to` precedes `from`.
pub fn ceil_days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let millis = (to - from).num_milliseconds();
    let whole = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) == 0 {
        whole
    } else {
        whole + 1
    }
}

#[cfg(test)]
mod tests {
    use super::{ceil_days_between, local_day, offset_from_minutes, start_of_day, Clock, FixedClock};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    #[test]
    fn partial_days_round_up() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap();
        assert_eq!(ceil_days_between(start, start), 0);
        assert_eq!(ceil_days_between(start, start + Duration::hours(1)), 1);
        assert_eq!(ceil_days_between(start, start + Duration::days(14)), 14);
        assert_eq!(ceil_days_between(start, start - Duration::hours(1)), 0);
        assert_eq!(ceil_days_between(start, start - Duration::hours(25)), -1);
    }

    #[test]
    fn local_day_follows_configured_offset() {
        let la_paz = offset_from_minutes(-240).expect("offset");
        let late_evening = Utc.with_ymd_and_hms(2026, 3, 3, 2, 30, 0).unwrap();
        assert_eq!(local_day(late_evening, la_paz), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());

        let midnight = start_of_day(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), la_paz);
        assert_eq!(midnight, Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap());
    }

    #[test]
    fn fixed_clock_can_be_moved() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(Duration::days(2));
        assert_eq!(clock.now(), start + Duration::days(2));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn rejects_out_of_range_offsets() {
        assert!(offset_from_minutes(24 * 60).is_err());
    }
}
