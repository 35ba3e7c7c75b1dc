//! Score engine — staff rankings derived from the customer set.
//!
//! Pure: every call rescans the customers it is given. Nothing is cached
//! and nothing is persisted.
//!
//! Per customer, only when its score date falls inside the period:
//!   prepaid before execution  date = contract completion,  base 10 | 5
//!   postpaid/outsourced before execution                    no score
//!   any path at execution     date = execution (fallbacks), base 10 | 5,
//!                                                           postpaid 5
//!   total = base + category bonus (primary org) + amount bonus

use crate::{
    config::BonusConfig,
    customer::Customer,
    error::{CrmError, CrmResult},
    status::{ContractPath, FunnelStage},
    types::{CustomerId, SettlementMonth},
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Period {
    Month { year: i32, month: u32 },
    HalfYear { year: i32, half: u32 },
    Year { year: i32 },
}

impl Period {
    pub fn validate(&self) -> CrmResult<()> {
        let ok = match *self {
            Period::Month { month, .. } => (1..=12).contains(&month),
            Period::HalfYear { half, .. } => half == 1 || half == 2,
            Period::Year { .. } => true,
        };
        if ok {
            Ok(())
        } else {
            Err(CrmError::InvalidPeriod {
                reason: format!("{self:?} is out of range"),
            })
        }
    }

    /// Constituent months, in calendar order.
    pub fn months(&self) -> Vec<SettlementMonth> {
        let (year, range) = match *self {
            Period::Month { year, month } => (year, month..=month),
            Period::HalfYear { year, half: 1 } => (year, 1..=6),
            Period::HalfYear { year, .. } => (year, 7..=12),
            Period::Year { year } => (year, 1..=12),
        };
        range
            .filter_map(|m| SettlementMonth::new(year, m))
            .collect()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match *self {
            Period::Month { year, month } => date.year() == year && date.month() == month,
            Period::HalfYear { year, half } => {
                date.year() == year && (date.month() <= 6) == (half == 1)
            }
            Period::Year { year } => date.year() == year,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            Period::HalfYear { year, half } => write!(f, "{year:04}-H{half}"),
            Period::Year { year } => write!(f, "{year:04}"),
        }
    }
}

impl FromStr for Period {
    type Err = CrmError;

    /// `2024`, `2024-H1`, `2024-03`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || CrmError::InvalidPeriod {
            reason: format!("cannot parse '{s}' (expected YYYY, YYYY-H1|H2 or YYYY-MM)"),
        };
        let period = match s.split_once('-') {
            None => Period::Year {
                year: s.parse().map_err(|_| bad())?,
            },
            Some((y, rest)) => {
                let year = y.parse().map_err(|_| bad())?;
                match rest.strip_prefix('H') {
                    Some(h) => Period::HalfYear {
                        year,
                        half: h.parse().map_err(|_| bad())?,
                    },
                    None => Period::Month {
                        year,
                        month: rest.parse().map_err(|_| bad())?,
                    },
                }
            }
        };
        period.validate()?;
        Ok(period)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingScope {
    Manager,
    Team,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base: i64,
    pub category_bonus: i64,
    pub amount_bonus: i64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> i64 {
        self.base + self.category_bonus + self.amount_bonus
    }

    fn add(&mut self, other: &ScoreBreakdown) {
        self.base += other.base;
        self.category_bonus += other.category_bonus;
        self.amount_bonus += other.amount_bonus;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerScore {
    pub customer_id: CustomerId,
    pub score_date: NaiveDate,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingEntry {
    /// Manager id or team id, depending on scope.
    pub key: String,
    pub name: Option<String>,
    pub total_score: i64,
    pub customer_count: usize,
    pub breakdown: ScoreBreakdown,
}

/// Score one customer, regardless of period. `None` when the customer
/// earns nothing in its current state or lacks a score date.
pub fn score_customer(c: &Customer, bonus: &BonusConfig) -> Option<CustomerScore> {
    let path = c.status.path()?;
    let stage = c.status.stage()?;
    let has_contract_amount = c.contract_amount > 0;

    let (score_date, base) = if stage == FunnelStage::Execution {
        let date = c
            .execution_date
            .or(c.contract_completion_date)
            .unwrap_or_else(|| c.updated_at.date_naive());
        let base = match path {
            ContractPath::Postpaid => 5,
            _ if has_contract_amount => 10,
            _ => 5,
        };
        (date, base)
    } else if path == ContractPath::Prepaid {
        (c.contract_completion_date?, if has_contract_amount { 10 } else { 5 })
    } else {
        return None;
    };

    Some(CustomerScore {
        customer_id: c.customer_id.clone(),
        score_date,
        breakdown: ScoreBreakdown {
            base,
            category_bonus: c.primary_org().map_or(0, |org| bonus.category_bonus(org)),
            amount_bonus: bonus.amount_bonus(c.execution_amount),
        },
    })
}

/// Rank managers or teams by the points their customers earned in `period`.
/// Descending by score; equal scores order by key.
pub fn rank(
    customers: &[Customer],
    period: &Period,
    scope: RankingScope,
    bonus: &BonusConfig,
) -> Vec<RankingEntry> {
    let mut entries: Vec<RankingEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for c in customers {
        let (key, name) = match scope {
            RankingScope::Manager => (c.manager_id.as_ref(), c.manager_name.as_ref()),
            RankingScope::Team => (c.team_id.as_ref(), c.team_name.as_ref()),
        };
        let Some(key) = key else { continue };
        let Some(score) = score_customer(c, bonus) else { continue };
        if !period.contains(score.score_date) {
            continue;
        }

        let slot = *index.entry(key.clone()).or_insert_with(|| {
            entries.push(RankingEntry {
                key: key.clone(),
                name: name.cloned(),
                total_score: 0,
                customer_count: 0,
                breakdown: ScoreBreakdown::default(),
            });
            entries.len() - 1
        });
        let entry = &mut entries[slot];
        entry.breakdown.add(&score.breakdown);
        entry.total_score = entry.breakdown.total();
        entry.customer_count += 1;
    }

    entries.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| a.key.cmp(&b.key))
    });
    entries
}
