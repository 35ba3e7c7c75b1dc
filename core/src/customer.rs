//! The customer aggregate and the financial patch applied alongside
//! transitions.

use crate::{
    audit::ActionType,
    status::{Status, Supplement},
    types::{CustomerId, ManWon, ManagerId, TeamId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Organization recorded when a customer has none yet.
pub const UNREGISTERED_ORG: &str = "미등록";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: CustomerId,
    pub name: String,
    pub status: Status,
    pub manager_id: Option<ManagerId>,
    pub team_id: Option<TeamId>,
    pub manager_name: Option<String>,
    pub team_name: Option<String>,
    pub contract_amount: ManWon,
    /// Percent of the base amount paid as commission.
    pub commission_rate: f64,
    pub execution_amount: ManWon,
    pub contract_date: Option<NaiveDate>,
    pub execution_date: Option<NaiveDate>,
    /// Set by the first contract-completed transition. Never rewritten.
    pub contract_completion_date: Option<NaiveDate>,
    /// First entry is the primary organization.
    pub processing_orgs: Vec<String>,
    pub clawed_back_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn primary_org(&self) -> Option<&str> {
        self.processing_orgs.first().map(String::as_str)
    }

    /// Organizations commission is split across; never empty.
    pub fn settlement_orgs(&self) -> Vec<String> {
        if self.processing_orgs.is_empty() {
            vec![UNREGISTERED_ORG.to_string()]
        } else {
            self.processing_orgs.clone()
        }
    }
}

/// Input for registering a customer in the initial waiting status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCustomer {
    pub customer_id: CustomerId,
    pub name: String,
    #[serde(default)]
    pub manager_id: Option<ManagerId>,
}

/// A staff directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manager {
    pub manager_id: ManagerId,
    pub manager_name: String,
    pub team_id: TeamId,
    pub team_name: String,
}

/// Financial fields collected with (or independently of) a transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialPatch {
    pub contract_date: Option<NaiveDate>,
    pub contract_amount: Option<ManWon>,
    pub commission_rate: Option<f64>,
    pub processing_org: Option<String>,
    pub execution_date: Option<NaiveDate>,
    pub execution_amount: Option<ManWon>,
}

impl From<&Supplement> for FinancialPatch {
    fn from(s: &Supplement) -> Self {
        Self {
            contract_date: s.contract_date,
            contract_amount: s.contract_amount,
            commission_rate: s.commission_rate,
            processing_org: s.processing_org.clone(),
            execution_date: s.execution_date,
            execution_amount: s.execution_amount,
        }
    }
}

/// One field actually changed by a patch.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    ContractDate { old: Option<NaiveDate>, new: NaiveDate },
    ContractAmount { old: ManWon, new: ManWon },
    CommissionRate { old: f64, new: f64 },
    ExecutionDate { old: Option<NaiveDate>, new: NaiveDate },
    ExecutionAmount { old: ManWon, new: ManWon },
    ProcessingOrgAdded { existing: Vec<String>, org: String },
}

impl FinancialPatch {
    /// Changes this patch makes to `current`. Empty strings, zero amounts
    /// and values equal to what is stored are skipped, so a patch never
    /// blanks out a recorded value.
    pub fn changes(&self, current: &Customer) -> Vec<FieldChange> {
        let mut out = Vec::new();
        if let Some(new) = self.contract_date {
            if current.contract_date != Some(new) {
                out.push(FieldChange::ContractDate { old: current.contract_date, new });
            }
        }
        if let Some(new) = self.contract_amount.filter(|v| *v != 0) {
            if current.contract_amount != new {
                out.push(FieldChange::ContractAmount { old: current.contract_amount, new });
            }
        }
        if let Some(new) = self.commission_rate.filter(|v| *v != 0.0 && v.is_finite()) {
            if current.commission_rate != new {
                out.push(FieldChange::CommissionRate { old: current.commission_rate, new });
            }
        }
        if let Some(org) = self.processing_org.as_deref().map(str::trim) {
            if !org.is_empty() && !current.processing_orgs.iter().any(|o| o == org) {
                out.push(FieldChange::ProcessingOrgAdded {
                    existing: current.processing_orgs.clone(),
                    org: org.to_string(),
                });
            }
        }
        if let Some(new) = self.execution_date {
            if current.execution_date != Some(new) {
                out.push(FieldChange::ExecutionDate { old: current.execution_date, new });
            }
        }
        if let Some(new) = self.execution_amount.filter(|v| *v != 0) {
            if current.execution_amount != new {
                out.push(FieldChange::ExecutionAmount { old: current.execution_amount, new });
            }
        }
        out
    }
}

impl FieldChange {
    pub fn apply_to(&self, customer: &mut Customer) {
        match self {
            Self::ContractDate { new, .. } => customer.contract_date = Some(*new),
            Self::ContractAmount { new, .. } => customer.contract_amount = *new,
            Self::CommissionRate { new, .. } => customer.commission_rate = *new,
            Self::ExecutionDate { new, .. } => customer.execution_date = Some(*new),
            Self::ExecutionAmount { new, .. } => customer.execution_amount = *new,
            Self::ProcessingOrgAdded { org, .. } => customer.processing_orgs.push(org.clone()),
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            Self::ContractDate { .. } => "contract_date",
            Self::ContractAmount { .. } => "contract_amount",
            Self::CommissionRate { .. } => "commission_rate",
            Self::ExecutionDate { .. } => "execution_date",
            Self::ExecutionAmount { .. } => "execution_amount",
            Self::ProcessingOrgAdded { .. } => "processing_orgs",
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Self::ProcessingOrgAdded { .. } => ActionType::OrgChange,
            _ => ActionType::InfoUpdate,
        }
    }

    pub fn old_value(&self) -> Option<String> {
        match self {
            Self::ContractDate { old, .. } | Self::ExecutionDate { old, .. } => {
                old.map(|d| d.to_string())
            }
            Self::ContractAmount { old, .. } | Self::ExecutionAmount { old, .. } => {
                Some(old.to_string())
            }
            Self::CommissionRate { old, .. } => Some(old.to_string()),
            Self::ProcessingOrgAdded { existing, .. } => {
                (!existing.is_empty()).then(|| existing.join(", "))
            }
        }
    }

    pub fn new_value(&self) -> String {
        match self {
            Self::ContractDate { new, .. } | Self::ExecutionDate { new, .. } => new.to_string(),
            Self::ContractAmount { new, .. } | Self::ExecutionAmount { new, .. } => new.to_string(),
            Self::CommissionRate { new, .. } => new.to_string(),
            Self::ProcessingOrgAdded { existing, org } => {
                let mut all = existing.clone();
                all.push(org.clone());
                all.join(", ")
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::ProcessingOrgAdded { org, .. } => format!("processing org '{org}' added"),
            other => format!(
                "{} {} -> {}",
                other.field(),
                other.old_value().unwrap_or_else(|| "(none)".into()),
                other.new_value()
            ),
        }
    }
}

#[cfg(test)]
pub(crate) fn blank_customer(id: &str) -> Customer {
    let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default();
    Customer {
        customer_id: id.into(),
        name: format!("name-{id}"),
        status: Status::INITIAL,
        manager_id: None,
        team_id: None,
        manager_name: None,
        team_name: None,
        contract_amount: 0,
        commission_rate: 0.0,
        execution_amount: 0,
        contract_date: None,
        execution_date: None,
        contract_completion_date: None,
        processing_orgs: Vec::new(),
        clawed_back_at: None,
        version: 0,
        created_at: at,
        updated_at: at,
    }
}
