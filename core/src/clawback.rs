//! Clawback processor — reverses recognized commission when a deal ends in
//! final rejection.
//!
//! Originals stay on the ledger; each gets a negated twin dated to the
//! clawback month. Whether a second call reverses the same rows again is
//! decided by `ClawbackPolicy`.

use crate::{
    clock::Clock,
    config::ClawbackPolicy,
    error::{CrmError, CrmResult},
    settlement::{SettlementItem, SettlementKind},
    store::{CrmStore, StoreTx},
    types::{SettlementMonth, Won},
};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClawbackResult {
    pub clawback_created: bool,
    /// The reversal rows written by this call.
    pub items: Vec<SettlementItem>,
    /// Magnitude reversed: the sum of the original amounts.
    pub total_amount: Won,
}

impl ClawbackResult {
    fn nothing() -> Self {
        Self {
            clawback_created: false,
            items: Vec::new(),
            total_amount: 0,
        }
    }
}

/// Ids of the rows that `kind` rows have negated.
fn reversed_by(ledger: &[SettlementItem], kind: SettlementKind) -> HashSet<&str> {
    ledger
        .iter()
        .filter(|i| i.kind == kind)
        .filter_map(|i| i.reverses_item_id.as_deref())
        .collect()
}

pub struct ClawbackProcessor<'a> {
    store: &'a CrmStore,
    clock: &'a dyn Clock,
    policy: ClawbackPolicy,
}

impl<'a> ClawbackProcessor<'a> {
    pub fn new(store: &'a CrmStore, clock: &'a dyn Clock, policy: ClawbackPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn process_clawback(
        &self,
        customer_id: &str,
        clawback_month: SettlementMonth,
    ) -> CrmResult<ClawbackResult> {
        let tx = self.store.begin()?;
        let result = self.process_in(&tx, customer_id, clawback_month)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn process_in(
        &self,
        tx: &StoreTx<'_>,
        customer_id: &str,
        clawback_month: SettlementMonth,
    ) -> CrmResult<ClawbackResult> {
        let mut customer = tx
            .load_customer(customer_id)?
            .ok_or_else(|| CrmError::CustomerNotFound {
                customer_id: customer_id.to_string(),
            })?;
        let ledger = tx.settlement_items_for(customer_id)?;

        let already_reversed = reversed_by(&ledger, SettlementKind::Clawback);
        let withdrawn = reversed_by(&ledger, SettlementKind::Reversal);
        let targets: Vec<&SettlementItem> = ledger
            .iter()
            .filter(|i| i.is_recognition() && !withdrawn.contains(i.item_id.as_str()))
            .filter(|i| match self.policy {
                ClawbackPolicy::Guarded => !already_reversed.contains(i.item_id.as_str()),
                ClawbackPolicy::Repeatable => true,
            })
            .collect();

        if targets.is_empty() {
            if already_reversed.is_empty() {
                log::info!("{customer_id}: no recognized settlement, nothing to claw back");
            } else {
                log::warn!(
                    "{customer_id}: clawback requested again, every row already reversed"
                );
            }
            return Ok(ClawbackResult::nothing());
        }
        if !already_reversed.is_empty() {
            log::warn!(
                "{customer_id}: repeated clawback under {:?} policy, reversing {} rows",
                self.policy,
                targets.len()
            );
        }

        let now = self.clock.now();
        let mut items = Vec::with_capacity(targets.len());
        let mut total_amount: Won = 0;
        for original in targets {
            let reversal = SettlementItem {
                item_id: uuid::Uuid::new_v4().to_string(),
                customer_id: customer_id.to_string(),
                settlement_month: clawback_month,
                kind: SettlementKind::Clawback,
                processing_org: original.processing_org.clone(),
                amount: -original.amount,
                manager_id: original.manager_id.clone(),
                team_id: original.team_id.clone(),
                manager_name: original.manager_name.clone(),
                team_name: original.team_name.clone(),
                is_clawback: true,
                reverses_item_id: Some(original.item_id.clone()),
                category_bonus: 0,
                amount_bonus: 0,
                created_at: now,
                updated_at: now,
            };
            tx.insert_settlement_item(&reversal)?;
            total_amount += original.amount;
            items.push(reversal);
        }

        let expected_version = customer.version;
        customer.clawed_back_at = Some(now);
        customer.version += 1;
        customer.updated_at = now;
        if !tx.update_customer(&customer, expected_version)? {
            return Err(CrmError::VersionConflict {
                customer_id: customer_id.to_string(),
                expected: expected_version,
                actual: tx
                    .load_customer(customer_id)?
                    .map(|c| c.version)
                    .unwrap_or(-1),
            });
        }

        log::info!(
            "{customer_id}: clawed back {total_amount} won over {} rows into {clawback_month}",
            items.len()
        );
        Ok(ClawbackResult {
            clawback_created: true,
            items,
            total_amount,
        })
    }
}
