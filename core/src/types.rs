//! Shared primitive types used across the entire engine.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stable, unique identifier for a customer.
pub type CustomerId = String;

/// Staff identifiers.
pub type ManagerId = String;
pub type TeamId = String;

/// Whoever requested a mutation (supplied by the caller's auth context).
pub type Actor = String;

/// Money in currency units of 10,000 won, as entered on the customer card.
pub type ManWon = i64;

/// Money in whole won, as carried on the settlement ledger.
pub type Won = i64;

pub const WON_PER_MAN: Won = 10_000;

/// Year-month key a ledger row is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SettlementMonth {
    pub year: i32,
    pub month: u32,
}

impl SettlementMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Truncate a date to its year-month.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for SettlementMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for SettlementMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{s}'"))?;
        let year: i32 = y.parse().map_err(|_| format!("bad year in '{s}'"))?;
        let month: u32 = m.parse().map_err(|_| format!("bad month in '{s}'"))?;
        Self::new(year, month).ok_or_else(|| format!("month out of range in '{s}'"))
    }
}

impl TryFrom<String> for SettlementMonth {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SettlementMonth> for String {
    fn from(value: SettlementMonth) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_truncates_date() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 17).unwrap();
        assert_eq!(SettlementMonth::of(d).to_string(), "2024-03");
    }

    #[test]
    fn month_parses_and_rejects() {
        assert_eq!(
            "2023-11".parse::<SettlementMonth>().unwrap(),
            SettlementMonth { year: 2023, month: 11 }
        );
        assert!("2023-13".parse::<SettlementMonth>().is_err());
        assert!("202311".parse::<SettlementMonth>().is_err());
    }
}
