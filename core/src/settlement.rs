//! Settlement reconciler — keeps each customer's commission ledger in step
//! with its status, financial fields and manager assignment.
//!
//! Recognition rules:
//!   - contract row:  prepaid path, any stage from contract onwards,
//!                    base = contract_amount, month of contract_date
//!   - execution row: any path at execution stage,
//!                    base = execution_amount, month of execution_date
//!   - amount = base × 10,000 × commission_rate%, split evenly across the
//!     customer's processing organizations (remainder to the primary)
//!
//! A recognition is keyed by (kind, organization, settlement month). A live
//! row with the same key is corrected in place. A new execution month opens
//! a new row and leaves earlier execution months standing (re-executions).
//! Any other live row the current state no longer calls for gets a negated
//! `reversal` twin in the current month. Nothing is ever deleted.
//!
//! Only contract and execution statuses recompute. Documents and
//! application steps between two executions leave the ledger as is.

use crate::{
    clock::Clock,
    config::BonusConfig,
    customer::{Customer, Manager},
    error::{CrmError, CrmResult},
    status::{ContractPath, FunnelStage},
    store::{CrmStore, StoreTx},
    types::{CustomerId, ManWon, SettlementMonth, Won, WON_PER_MAN},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    Contract,
    Execution,
    Clawback,
    /// Withdraws a recognition the customer's state no longer supports.
    Reversal,
}

impl SettlementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Execution => "execution",
            Self::Clawback => "clawback",
            Self::Reversal => "reversal",
        }
    }
}

impl fmt::Display for SettlementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementKind {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contract" => Ok(Self::Contract),
            "execution" => Ok(Self::Execution),
            "clawback" => Ok(Self::Clawback),
            "reversal" => Ok(Self::Reversal),
            other => Err(CrmError::CorruptRow {
                table: "settlement_item",
                detail: format!("unknown kind '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementItem {
    pub item_id: String,
    pub customer_id: CustomerId,
    pub settlement_month: SettlementMonth,
    pub kind: SettlementKind,
    pub processing_org: String,
    /// Signed. Reversal rows are negative.
    pub amount: Won,
    pub manager_id: Option<String>,
    pub team_id: Option<String>,
    pub manager_name: Option<String>,
    pub team_name: Option<String>,
    pub is_clawback: bool,
    pub reverses_item_id: Option<String>,
    pub category_bonus: i64,
    pub amount_bonus: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementItem {
    /// A positive recognition row, as opposed to a clawback or reversal.
    pub fn is_recognition(&self) -> bool {
        self.reverses_item_id.is_none()
    }

    fn same_key(&self, rec: &Recognition) -> bool {
        self.kind == rec.kind
            && self.processing_org == rec.org
            && self.settlement_month == rec.month
    }

    fn same_values(&self, rec: &Recognition, c: &Customer) -> bool {
        self.settlement_month == rec.month
            && self.amount == rec.amount
            && self.category_bonus == rec.category_bonus
            && self.amount_bonus == rec.amount_bonus
            && self.manager_id == c.manager_id
            && self.team_id == c.team_id
            && self.manager_name == c.manager_name
            && self.team_name == c.team_name
    }
}

/// A ledger row the customer's current state calls for.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub kind: SettlementKind,
    pub org: String,
    pub month: SettlementMonth,
    pub amount: Won,
    pub category_bonus: i64,
    pub amount_bonus: i64,
}

/// Commission in won for a base amount in units of 10,000 won.
pub fn commission_won(base: ManWon, rate_percent: f64) -> Won {
    if base <= 0 || !rate_percent.is_finite() || rate_percent <= 0.0 {
        return 0;
    }
    (base as f64 * WON_PER_MAN as f64 * rate_percent / 100.0).round() as Won
}

/// Split `total` into `n` parts summing exactly to `total`; the first part
/// absorbs the remainder.
fn split_evenly(total: Won, n: usize) -> Vec<Won> {
    if n == 0 {
        return Vec::new();
    }
    let share = total / n as Won;
    let mut parts = vec![share; n];
    parts[0] += total - share * n as Won;
    parts
}

/// Ledger rows the customer's current state calls for, or `None` when the
/// status is not a contract or execution status (nothing to recompute;
/// existing rows stand).
pub fn expected_recognitions(c: &Customer, bonus: &BonusConfig) -> Option<Vec<Recognition>> {
    if !c.status.is_financially_significant() {
        return None;
    }
    let path = c.status.path()?;
    let stage = c.status.stage()?;
    let orgs = c.settlement_orgs();
    let mut out = Vec::new();

    let mut recognize = |kind: SettlementKind, month: SettlementMonth, total: Won, amt_bonus: i64| {
        for (org, amount) in orgs.iter().zip(split_evenly(total, orgs.len())) {
            if amount == 0 {
                continue;
            }
            out.push(Recognition {
                kind,
                org: org.clone(),
                month,
                amount,
                category_bonus: bonus.category_bonus(org),
                amount_bonus: amt_bonus,
            });
        }
    };

    if path == ContractPath::Prepaid {
        let month = c
            .contract_date
            .or(c.contract_completion_date)
            .map(SettlementMonth::of);
        let total = commission_won(c.contract_amount, c.commission_rate);
        match month {
            Some(month) if total > 0 => recognize(SettlementKind::Contract, month, total, 0),
            _ => log::debug!("{}: no contract recognition (amount or date missing)", c.customer_id),
        }
    }

    if stage == FunnelStage::Execution {
        let month = c.execution_date.map(SettlementMonth::of);
        let total = commission_won(c.execution_amount, c.commission_rate);
        match month {
            Some(month) if total > 0 => recognize(
                SettlementKind::Execution,
                month,
                total,
                bonus.amount_bonus(c.execution_amount),
            ),
            _ => log::debug!("{}: no execution recognition (amount or date missing)", c.customer_id),
        }
    }

    Some(out)
}

pub struct SettlementReconciler<'a> {
    store: &'a CrmStore,
    bonus: &'a BonusConfig,
    clock: &'a dyn Clock,
}

impl<'a> SettlementReconciler<'a> {
    pub fn new(store: &'a CrmStore, bonus: &'a BonusConfig, clock: &'a dyn Clock) -> Self {
        Self { store, bonus, clock }
    }

    /// Recompute the customer's ledger in its own unit of work.
    pub fn sync_settlement(&self, customer_id: &str) -> CrmResult<Vec<SettlementItem>> {
        let tx = self.store.begin()?;
        let items = self.sync_in(&tx, customer_id)?;
        tx.commit()?;
        Ok(items)
    }

    /// Recompute inside a caller's unit of work.
    pub fn sync_in(&self, tx: &StoreTx<'_>, customer_id: &str) -> CrmResult<Vec<SettlementItem>> {
        let customer = tx
            .load_customer(customer_id)?
            .ok_or_else(|| CrmError::CustomerNotFound {
                customer_id: customer_id.to_string(),
            })?;
        let existing = tx.settlement_items_for(customer_id)?;

        let Some(expected) = expected_recognitions(&customer, self.bonus) else {
            log::debug!(
                "{customer_id}: status {} recognizes nothing, ledger left as is",
                customer.status
            );
            return Ok(existing);
        };

        let reversed: HashSet<&str> = existing
            .iter()
            .filter_map(|i| i.reverses_item_id.as_deref())
            .collect();
        let mut live: Vec<&SettlementItem> = existing
            .iter()
            .filter(|i| i.is_recognition() && !reversed.contains(i.item_id.as_str()))
            .collect();

        let now = self.clock.now();
        let (mut inserted, mut updated) = (0, 0);
        for rec in &expected {
            match live.iter().position(|i| i.same_key(rec)) {
                Some(idx) => {
                    let current = live.swap_remove(idx);
                    if !current.same_values(rec, &customer) {
                        tx.update_settlement_item(&recognized_row(
                            &customer,
                            rec,
                            current.item_id.clone(),
                            current.created_at,
                            now,
                        ))?;
                        updated += 1;
                    }
                }
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    tx.insert_settlement_item(&recognized_row(&customer, rec, id, now, now))?;
                    inserted += 1;
                }
            }
        }

        // An earlier execution month of a still-executed org is a prior
        // execution round and stands. Everything else left over is withdrawn.
        let month = SettlementMonth::of(self.clock.today());
        let mut withdrawn = 0;
        for stale in live {
            let earlier_round = stale.kind == SettlementKind::Execution
                && expected
                    .iter()
                    .any(|r| r.kind == stale.kind && r.org == stale.processing_org);
            if earlier_round {
                continue;
            }
            tx.insert_settlement_item(&reversal_row(stale, month, now))?;
            withdrawn += 1;
        }

        if inserted + updated + withdrawn > 0 {
            log::info!(
                "{customer_id}: ledger synced ({inserted} new, {updated} updated, {withdrawn} withdrawn)"
            );
        }
        tx.settlement_items_for(customer_id)
    }

    /// Rewrite attribution on every ledger row of a customer. Amounts are
    /// untouched.
    pub fn propagate_assignment(
        &self,
        tx: &StoreTx<'_>,
        customer_id: &str,
        manager: &Manager,
    ) -> CrmResult<usize> {
        let n = tx.reassign_settlement_items(customer_id, manager, self.clock.now())?;
        log::debug!("{customer_id}: {n} ledger rows moved to {}", manager.manager_id);
        Ok(n)
    }
}

fn recognized_row(
    c: &Customer,
    rec: &Recognition,
    item_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> SettlementItem {
    SettlementItem {
        item_id,
        customer_id: c.customer_id.clone(),
        settlement_month: rec.month,
        kind: rec.kind,
        processing_org: rec.org.clone(),
        amount: rec.amount,
        manager_id: c.manager_id.clone(),
        team_id: c.team_id.clone(),
        manager_name: c.manager_name.clone(),
        team_name: c.team_name.clone(),
        is_clawback: false,
        reverses_item_id: None,
        category_bonus: rec.category_bonus,
        amount_bonus: rec.amount_bonus,
        created_at,
        updated_at,
    }
}

fn reversal_row(
    original: &SettlementItem,
    month: SettlementMonth,
    at: DateTime<Utc>,
) -> SettlementItem {
    SettlementItem {
        item_id: uuid::Uuid::new_v4().to_string(),
        settlement_month: month,
        kind: SettlementKind::Reversal,
        amount: -original.amount,
        is_clawback: false,
        reverses_item_id: Some(original.item_id.clone()),
        category_bonus: 0,
        amount_bonus: 0,
        created_at: at,
        updated_at: at,
        ..original.clone()
    }
}
