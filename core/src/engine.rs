//! The CRM engine — wires the store, configuration and clock together and
//! exposes every operation as one unit of work.
//!
//! ORDER inside a transition (one SQLite transaction):
//!   1. Customer state store   validate, patch, status, StatusLog, version
//!   2. Settlement reconciler  only at contract/execution statuses
//!   3. Clawback processor     only when entering final rejection
//!   then commit, then deferred (best-effort) history.
//!
//! RULES:
//!   - Validation errors surface before anything is written.
//!   - Any failure before commit rolls the whole unit back.
//!   - Score queries never write.

use crate::{
    audit::{AuditLogger, HistoryEntry, StatusLogEntry},
    clawback::{ClawbackProcessor, ClawbackResult},
    clock::{Clock, FixedClock, SystemClock},
    command::CrmCommand,
    config::CrmConfig,
    customer::{Customer, FinancialPatch, Manager, NewCustomer},
    error::{CrmError, CrmResult},
    lifecycle::{CustomerLifecycle, TransitionRequest},
    score::{self, CustomerScore, Period, RankingEntry, RankingScope},
    settlement::{SettlementItem, SettlementReconciler},
    status::{self, matches_filter},
    store::CrmStore,
    types::{SettlementMonth, Won},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub customer: Customer,
    pub status_log: StatusLogEntry,
    /// Ledger after reconciliation, when the new status triggered one.
    pub settlement: Option<Vec<SettlementItem>>,
    pub clawback: Option<ClawbackResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReassignOutcome {
    pub customer: Customer,
    /// Ledger rows whose attribution moved with the customer.
    pub reattributed: usize,
}

pub struct CrmEngine {
    pub store: CrmStore,
    pub config: CrmConfig,
    clock: Arc<dyn Clock>,
}

impl CrmEngine {
    pub fn new(store: CrmStore, config: CrmConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Migrate `store`, load configuration from `data_dir` and run on the
    /// wall clock.
    pub fn build(store: CrmStore, data_dir: &str) -> anyhow::Result<Self> {
        store.migrate()?;
        let config = CrmConfig::load(data_dir)?;
        log::info!(
            "engine ready: bonus tables {}, audit {:?}, clawback {:?}",
            config.bonus.version,
            config.engine.audit_mode,
            config.engine.clawback_policy
        );
        Ok(Self::new(store, config, Arc::new(SystemClock)))
    }

    /// In-memory engine with built-in tables, frozen at 2024-01-02 09:00 UTC.
    pub fn build_test() -> CrmResult<Self> {
        let at = DateTime::<Utc>::from_timestamp(1_704_186_000, 0).unwrap_or_default();
        Self::build_test_with(CrmConfig::default_test(), Arc::new(FixedClock::new(at)))
    }

    pub fn build_test_with(config: CrmConfig, clock: Arc<dyn Clock>) -> CrmResult<Self> {
        let store = CrmStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, config, clock))
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn lifecycle(&self) -> CustomerLifecycle<'_> {
        CustomerLifecycle::new(&self.store, self.clock(), self.config.engine.audit_mode)
    }

    fn reconciler(&self) -> SettlementReconciler<'_> {
        SettlementReconciler::new(&self.store, &self.config.bonus, self.clock())
    }

    fn clawbacks(&self) -> ClawbackProcessor<'_> {
        ClawbackProcessor::new(&self.store, self.clock(), self.config.engine.clawback_policy)
    }

    fn audit(&self) -> AuditLogger<'_> {
        AuditLogger::new(&self.store, self.clock())
    }

    // ── Directory & registration ─────────────────────────────────

    /// Add or edit a staff directory entry. An edit is copied onto every
    /// customer and ledger row already attributed to that manager.
    pub fn upsert_manager(&self, manager: &Manager) -> CrmResult<()> {
        let tx = self.store.begin()?;
        tx.upsert_manager(manager)?;
        let (customers, items) = tx.refresh_manager_attribution(manager, self.clock.now())?;
        tx.commit()?;
        if customers + items > 0 {
            log::info!(
                "manager {} updated: {customers} customers, {items} ledger rows re-attributed",
                manager.manager_id
            );
        }
        Ok(())
    }

    pub fn register_customer(&self, new: &NewCustomer, actor: &str) -> CrmResult<Customer> {
        self.lifecycle().register_customer(new, actor)
    }

    pub fn load_customer(&self, customer_id: &str) -> CrmResult<Customer> {
        self.store
            .load_customer(customer_id)?
            .ok_or_else(|| CrmError::CustomerNotFound {
                customer_id: customer_id.to_string(),
            })
    }

    /// Customers whose status matches a funnel group label or a literal.
    pub fn customers_matching(&self, filter: &str) -> CrmResult<Vec<Customer>> {
        Ok(self
            .store
            .all_customers()?
            .into_iter()
            .filter(|c| matches_filter(c.status, filter))
            .collect())
    }

    // ── Lifecycle ────────────────────────────────────────────────

    pub fn transition(&self, req: &TransitionRequest) -> CrmResult<TransitionOutcome> {
        let lifecycle = self.lifecycle();
        let tx = self.store.begin()?;
        let (staged, status_log) = lifecycle.stage_transition(&tx, req)?;
        let target = staged.customer.status;

        let settlement = if target.is_financially_significant() {
            Some(self.reconciler().sync_in(&tx, &req.customer_id)?)
        } else {
            None
        };
        let clawback = if target.is_final_rejection() {
            let date = req.supplement.clawback_date.ok_or_else(|| {
                CrmError::MissingSupplement {
                    status: target.to_string(),
                    missing: vec!["clawback_date"],
                }
            })?;
            let month = SettlementMonth::of(date);
            Some(self.clawbacks().process_in(&tx, &req.customer_id, month)?)
        } else {
            None
        };

        let customer = tx
            .load_customer(&req.customer_id)?
            .unwrap_or_else(|| staged.customer.clone());
        tx.commit()?;
        lifecycle.finish(&staged);

        Ok(TransitionOutcome {
            customer,
            status_log,
            settlement,
            clawback,
        })
    }

    /// Patch financial fields in one unit with a ledger refresh. The
    /// refresh only recomputes at contract and execution statuses.
    pub fn update_financial_fields(
        &self,
        customer_id: &str,
        patch: &FinancialPatch,
        actor: &str,
    ) -> CrmResult<Customer> {
        let lifecycle = self.lifecycle();
        let tx = self.store.begin()?;
        let staged = lifecycle.stage_financials(&tx, customer_id, patch, actor)?;
        self.reconciler().sync_in(&tx, customer_id)?;
        tx.commit()?;
        lifecycle.finish(&staged);
        Ok(staged.customer)
    }

    pub fn reassign_manager(
        &self,
        customer_id: &str,
        new_manager_id: &str,
        new_team_id: &str,
        actor: &str,
    ) -> CrmResult<ReassignOutcome> {
        let lifecycle = self.lifecycle();
        let tx = self.store.begin()?;
        let (staged, manager) =
            lifecycle.stage_reassignment(&tx, customer_id, new_manager_id, new_team_id, actor)?;
        let reattributed = self
            .reconciler()
            .propagate_assignment(&tx, customer_id, &manager)?;
        tx.commit()?;
        lifecycle.finish(&staged);
        Ok(ReassignOutcome {
            customer: staged.customer,
            reattributed,
        })
    }

    pub fn add_memo(&self, customer_id: &str, memo: &str, actor: &str) -> CrmResult<()> {
        self.load_customer(customer_id)?;
        self.audit().memo_added(customer_id, memo, actor);
        Ok(())
    }

    pub fn upload_document(&self, customer_id: &str, file_name: &str, actor: &str) -> CrmResult<()> {
        self.load_customer(customer_id)?;
        self.audit().document_uploaded(customer_id, file_name, actor);
        Ok(())
    }

    // ── Settlement ───────────────────────────────────────────────

    pub fn sync_settlement(&self, customer_id: &str) -> CrmResult<Vec<SettlementItem>> {
        self.reconciler().sync_settlement(customer_id)
    }

    pub fn process_clawback(
        &self,
        customer_id: &str,
        clawback_month: SettlementMonth,
    ) -> CrmResult<ClawbackResult> {
        self.clawbacks().process_clawback(customer_id, clawback_month)
    }

    pub fn settlement_items(&self, customer_id: &str) -> CrmResult<Vec<SettlementItem>> {
        self.store.settlement_items_for(customer_id)
    }

    /// Every ledger row attributed to `month`, across customers.
    pub fn settlement_items_in_month(&self, month: SettlementMonth) -> CrmResult<Vec<SettlementItem>> {
        self.store.settlement_items_in_month(month)
    }

    pub fn ledger_total(&self, customer_id: &str) -> CrmResult<Won> {
        self.store.ledger_total(customer_id)
    }

    // ── Reporting ────────────────────────────────────────────────

    pub fn rank(&self, period: &Period, scope: RankingScope) -> CrmResult<Vec<RankingEntry>> {
        period.validate()?;
        let customers = self.store.all_customers()?;
        Ok(score::rank(&customers, period, scope, &self.config.bonus))
    }

    pub fn score(&self, customer_id: &str) -> CrmResult<Option<CustomerScore>> {
        let customer = self.load_customer(customer_id)?;
        Ok(score::score_customer(&customer, &self.config.bonus))
    }

    pub fn history(&self, customer_id: &str) -> CrmResult<Vec<HistoryEntry>> {
        self.audit().history(customer_id)
    }

    pub fn status_log(&self, customer_id: &str) -> CrmResult<Vec<StatusLogEntry>> {
        self.audit().status_log(customer_id)
    }

    pub fn funnel_counts(&self) -> CrmResult<BTreeMap<String, usize>> {
        let customers = self.store.all_customers()?;
        Ok(status::funnel_counts(customers.iter().map(|c| c.status)))
    }

    /// Run one runner command and render its reply. `Quit` replies null;
    /// ending the loop is the caller's business.
    pub fn execute(&self, cmd: CrmCommand) -> CrmResult<serde_json::Value> {
        let reply = match cmd {
            CrmCommand::RegisterCustomer {
                customer_id,
                name,
                manager_id,
                actor,
            } => {
                let new = NewCustomer {
                    customer_id,
                    name,
                    manager_id,
                };
                serde_json::to_value(self.register_customer(&new, &actor)?)?
            }
            CrmCommand::UpsertManager {
                manager_id,
                manager_name,
                team_id,
                team_name,
            } => {
                let manager = Manager {
                    manager_id,
                    manager_name,
                    team_id,
                    team_name,
                };
                self.upsert_manager(&manager)?;
                serde_json::to_value(manager)?
            }
            CrmCommand::Transition(req) => serde_json::to_value(self.transition(&req)?)?,
            CrmCommand::UpdateFinancials {
                customer_id,
                patch,
                actor,
            } => serde_json::to_value(self.update_financial_fields(&customer_id, &patch, &actor)?)?,
            CrmCommand::Reassign {
                customer_id,
                manager_id,
                team_id,
                actor,
            } => serde_json::to_value(self.reassign_manager(
                &customer_id,
                &manager_id,
                &team_id,
                &actor,
            )?)?,
            CrmCommand::AddMemo {
                customer_id,
                memo,
                actor,
            } => {
                self.add_memo(&customer_id, &memo, &actor)?;
                serde_json::json!({ "ok": true })
            }
            CrmCommand::UploadDocument {
                customer_id,
                file_name,
                actor,
            } => {
                self.upload_document(&customer_id, &file_name, &actor)?;
                serde_json::json!({ "ok": true })
            }
            CrmCommand::SyncSettlement { customer_id } => {
                serde_json::to_value(self.sync_settlement(&customer_id)?)?
            }
            CrmCommand::Clawback { customer_id, month } => {
                serde_json::to_value(self.process_clawback(&customer_id, month)?)?
            }
            CrmCommand::Rank { period, scope } => {
                let period: Period = period.parse()?;
                serde_json::to_value(self.rank(&period, scope)?)?
            }
            CrmCommand::History { customer_id } => {
                serde_json::to_value(self.history(&customer_id)?)?
            }
            CrmCommand::FunnelCounts => serde_json::to_value(self.funnel_counts()?)?,
            CrmCommand::Quit => serde_json::Value::Null,
        };
        Ok(reply)
    }
}
