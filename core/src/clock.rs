//! Engine clock — the single source of "now" for every mutation.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock. Tests and replays set it explicitly.
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(at),
        }
    }

    /// Start of `date`, UTC.
    pub fn on(date: NaiveDate) -> Self {
        Self::new(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default()))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = at;
        }
    }

    pub fn set_date(&self, date: NaiveDate) {
        self.set(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default()));
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.current.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.current.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_moves_only_when_told() {
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        clock.advance(chrono::Duration::days(1));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        clock.set_date(NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());
    }
}
