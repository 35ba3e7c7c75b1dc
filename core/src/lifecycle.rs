//! Customer state store — applies transitions, financial patches and
//! reassignments to the customer aggregate.
//!
//! Every mutation is staged inside a caller-owned `StoreTx` so the engine
//! can fold ledger work into the same unit. History rows either ride along
//! in that unit (`AuditMode::Atomic`) or come back as `Staged::deferred`
//! and are written after commit by `finish`.

use crate::{
    audit::{ActionType, AuditLogger, HistoryEntry, StatusLogEntry},
    clock::Clock,
    config::AuditMode,
    customer::{Customer, FieldChange, FinancialPatch, Manager, NewCustomer},
    error::{CrmError, CrmResult},
    status::{Status, Supplement},
    store::{CrmStore, StoreTx},
    types::{Actor, CustomerId},
};
use serde::{Deserialize, Serialize};

/// A request to move a customer from one status to another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub customer_id: CustomerId,
    /// The status the caller believes is stored.
    pub previous_status: String,
    pub new_status: String,
    /// Optimistic concurrency guard; unchecked when absent.
    #[serde(default)]
    pub expected_version: Option<i64>,
    #[serde(default)]
    pub supplement: Supplement,
    pub actor: Actor,
}

/// Outcome of a staged mutation, before commit.
#[derive(Debug, Clone)]
pub struct Staged {
    pub customer: Customer,
    /// History still to be written after commit (best-effort mode only).
    pub deferred: Vec<HistoryEntry>,
}

pub struct CustomerLifecycle<'a> {
    store: &'a CrmStore,
    clock: &'a dyn Clock,
    audit_mode: AuditMode,
}

impl<'a> CustomerLifecycle<'a> {
    pub fn new(store: &'a CrmStore, clock: &'a dyn Clock, audit_mode: AuditMode) -> Self {
        Self {
            store,
            clock,
            audit_mode,
        }
    }

    /// Create a customer in the initial waiting status.
    pub fn register_customer(&self, new: &NewCustomer, actor: &str) -> CrmResult<Customer> {
        let manager = match &new.manager_id {
            Some(id) => Some(self.store.load_manager(id)?.ok_or_else(|| {
                CrmError::UnknownManager {
                    manager_id: id.clone(),
                }
            })?),
            None => None,
        };
        let now = self.clock.now();
        let customer = Customer {
            customer_id: new.customer_id.clone(),
            name: new.name.clone(),
            status: Status::INITIAL,
            manager_id: manager.as_ref().map(|m| m.manager_id.clone()),
            team_id: manager.as_ref().map(|m| m.team_id.clone()),
            manager_name: manager.as_ref().map(|m| m.manager_name.clone()),
            team_name: manager.as_ref().map(|m| m.team_name.clone()),
            contract_amount: 0,
            commission_rate: 0.0,
            execution_amount: 0,
            contract_date: None,
            execution_date: None,
            contract_completion_date: None,
            processing_orgs: Vec::new(),
            clawed_back_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_customer(&customer)?;
        log::info!("{}: registered by {actor}", customer.customer_id);
        Ok(customer)
    }

    /// Validate and apply a status transition, together with any financial
    /// fields it carries.
    pub fn stage_transition(
        &self,
        tx: &StoreTx<'_>,
        req: &TransitionRequest,
    ) -> CrmResult<(Staged, StatusLogEntry)> {
        let previous: Status = req.previous_status.parse()?;
        let target: Status = req.new_status.parse()?;
        target.requirements().validate(target, &req.supplement)?;

        let mut customer = load(tx, &req.customer_id)?;
        if customer.status != previous {
            return Err(CrmError::StatusMismatch {
                customer_id: req.customer_id.clone(),
                expected: previous.to_string(),
                actual: customer.status.to_string(),
            });
        }
        if let Some(expected) = req.expected_version {
            if expected != customer.version {
                return Err(CrmError::VersionConflict {
                    customer_id: req.customer_id.clone(),
                    expected,
                    actual: customer.version,
                });
            }
        }

        let changes = FinancialPatch::from(&req.supplement).changes(&customer);
        for change in &changes {
            change.apply_to(&mut customer);
        }

        let now = self.clock.now();
        customer.status = target;
        if target.is_contract_completed() && customer.contract_completion_date.is_none() {
            customer.contract_completion_date = Some(self.clock.today());
        }
        self.write_back(tx, &mut customer)?;

        let mut log_entry = StatusLogEntry {
            id: None,
            customer_id: customer.customer_id.clone(),
            previous_status: previous,
            new_status: target,
            changed_by: req.actor.clone(),
            changed_at: now,
        };
        log_entry.id = Some(tx.insert_status_log(&log_entry)?);

        let mut history = vec![HistoryEntry::status_change(&log_entry)];
        history.extend(field_history(&customer.customer_id, &changes, &req.actor, now));
        let deferred = self.audit_in(tx, history)?;

        log::info!(
            "{}: {previous} -> {target} by {} (v{})",
            customer.customer_id,
            req.actor,
            customer.version
        );
        Ok((Staged { customer, deferred }, log_entry))
    }

    /// Apply financial fields without a status change. A patch that
    /// changes nothing leaves the customer and its version untouched.
    pub fn stage_financials(
        &self,
        tx: &StoreTx<'_>,
        customer_id: &str,
        patch: &FinancialPatch,
        actor: &str,
    ) -> CrmResult<Staged> {
        let mut customer = load(tx, customer_id)?;
        let changes = patch.changes(&customer);
        if changes.is_empty() {
            log::debug!("{customer_id}: financial patch changed nothing");
            return Ok(Staged {
                customer,
                deferred: Vec::new(),
            });
        }
        for change in &changes {
            change.apply_to(&mut customer);
        }
        self.write_back(tx, &mut customer)?;

        let history = field_history(customer_id, &changes, actor, customer.updated_at);
        let deferred = self.audit_in(tx, history)?;
        log::info!("{customer_id}: {} financial fields updated by {actor}", changes.len());
        Ok(Staged {
            customer,
            deferred,
        })
    }

    /// Point a customer at a new manager. The manager must exist in the
    /// staff directory and belong to `new_team_id`. Returns the resolved
    /// directory entry so the ledger can be re-attributed in the same unit.
    pub fn stage_reassignment(
        &self,
        tx: &StoreTx<'_>,
        customer_id: &str,
        new_manager_id: &str,
        new_team_id: &str,
        actor: &str,
    ) -> CrmResult<(Staged, Manager)> {
        let manager = tx
            .load_manager(new_manager_id)?
            .ok_or_else(|| CrmError::UnknownManager {
                manager_id: new_manager_id.to_string(),
            })?;
        if manager.team_id != new_team_id {
            return Err(CrmError::TeamMismatch {
                manager_id: new_manager_id.to_string(),
                team_id: new_team_id.to_string(),
            });
        }

        let mut customer = load(tx, customer_id)?;
        let old = customer
            .manager_name
            .clone()
            .or_else(|| customer.manager_id.clone());
        customer.manager_id = Some(manager.manager_id.clone());
        customer.team_id = Some(manager.team_id.clone());
        customer.manager_name = Some(manager.manager_name.clone());
        customer.team_name = Some(manager.team_name.clone());
        self.write_back(tx, &mut customer)?;

        let entry = HistoryEntry::new(
            customer_id,
            ActionType::ManagerChange,
            format!(
                "manager -> {} ({})",
                manager.manager_name, manager.team_name
            ),
            actor,
            customer.updated_at,
        )
        .values(old, Some(manager.manager_name.clone()));
        let deferred = self.audit_in(tx, vec![entry])?;

        log::info!(
            "{customer_id}: reassigned to {} / {} by {actor}",
            manager.manager_id,
            manager.team_id
        );
        Ok((
            Staged {
                customer,
                deferred,
            },
            manager,
        ))
    }

    /// Write deferred history once the unit has committed.
    pub fn finish(&self, staged: &Staged) {
        if !staged.deferred.is_empty() {
            AuditLogger::new(self.store, self.clock).record_all(&staged.deferred);
        }
    }

    fn write_back(&self, tx: &StoreTx<'_>, customer: &mut Customer) -> CrmResult<()> {
        let expected = customer.version;
        customer.version += 1;
        customer.updated_at = self.clock.now();
        if tx.update_customer(customer, expected)? {
            return Ok(());
        }
        let actual = tx
            .load_customer(&customer.customer_id)?
            .map_or(-1, |c| c.version);
        Err(CrmError::VersionConflict {
            customer_id: customer.customer_id.clone(),
            expected,
            actual,
        })
    }

    /// In atomic mode write `history` into the unit now; otherwise hand it
    /// back for `finish`.
    fn audit_in(
        &self,
        tx: &StoreTx<'_>,
        history: Vec<HistoryEntry>,
    ) -> CrmResult<Vec<HistoryEntry>> {
        match self.audit_mode {
            AuditMode::Atomic => {
                for entry in &history {
                    tx.append_history(entry)?;
                }
                Ok(Vec::new())
            }
            AuditMode::BestEffort => Ok(history),
        }
    }
}

fn load(tx: &StoreTx<'_>, customer_id: &str) -> CrmResult<Customer> {
    tx.load_customer(customer_id)?
        .ok_or_else(|| CrmError::CustomerNotFound {
            customer_id: customer_id.to_string(),
        })
}

fn field_history(
    customer_id: &str,
    changes: &[FieldChange],
    actor: &str,
    at: chrono::DateTime<chrono::Utc>,
) -> Vec<HistoryEntry> {
    changes
        .iter()
        .map(|change| {
            HistoryEntry::new(customer_id, change.action_type(), change.describe(), actor, at)
                .values(change.old_value(), Some(change.new_value()))
        })
        .collect()
}
