//! Status vocabulary, funnel groups and transition requirements.
//!
//! RULE: the literal strings below are persisted and wire-visible.
//! Adding a literal means adding a row to STATUS_TABLE; group, path,
//! stage and required fields all live on that one row.

use crate::error::{CrmError, CrmResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Waiting,
    ShortAbsence,
    LongAbsence,

    // ── 휴지통: hard rejections ─────────────────────
    TrashSimpleRefusal,
    TrashBadCredit,
    TrashShortHistory,
    TrashLowRevenue,
    TrashTaxArrears,
    TrashDelinquent,
    TrashDuplicate,
    TrashOther,

    // ── 타겟: soft rejections, may be revisited ─────
    TargetOnHold,
    TargetRecontact,
    TargetMissingDocuments,
    TargetNoFundingNeed,
    TargetOtherVendor,
    TargetInsufficientLimit,
    TargetRateComplaint,
    TargetFeeComplaint,

    // ── Funnel ──────────────────────────────────────
    ContractPrepaid,
    ContractOutsourced,
    ContractPostpaid,
    DocumentsPrepaid,
    DocumentsOutsourced,
    DocumentsPostpaid,
    ApplicationPrepaid,
    ApplicationOutsourced,
    ApplicationPostpaid,
    ExecutionPrepaid,
    ExecutionOutsourced,
    ExecutionPostpaid,

    FinalRejection,
}

/// Coarse reporting bucket several literals roll up into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FunnelGroup {
    Trash,
    Target,
    ContractCompleted,
    DocumentsCollected,
    ApplicationCompleted,
    ExecutionCompleted,
}

impl FunnelGroup {
    pub const ALL: [FunnelGroup; 6] = [
        FunnelGroup::Trash,
        FunnelGroup::Target,
        FunnelGroup::ContractCompleted,
        FunnelGroup::DocumentsCollected,
        FunnelGroup::ApplicationCompleted,
        FunnelGroup::ExecutionCompleted,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Trash => "휴지통",
            Self::Target => "타겟",
            Self::ContractCompleted => "계약완료",
            Self::DocumentsCollected => "서류취합완료",
            Self::ApplicationCompleted => "신청완료",
            Self::ExecutionCompleted => "집행완료",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.label() == label)
    }
}

/// When commission falls due on a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractPath {
    Prepaid,
    Outsourced,
    Postpaid,
}

/// Position along the contract → execution funnel. Ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Contract,
    Documents,
    Application,
    Execution,
}

/// Supplementary data a transition must carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransitionRequirements {
    pub requires_contract_info: bool,
    pub requires_processing_org: bool,
    pub requires_execution_info: bool,
    pub requires_clawback_date: bool,
}

/// Data the caller submits alongside a transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Supplement {
    pub contract_date: Option<NaiveDate>,
    pub contract_amount: Option<i64>,
    pub commission_rate: Option<f64>,
    pub processing_org: Option<String>,
    pub execution_date: Option<NaiveDate>,
    pub execution_amount: Option<i64>,
    pub clawback_date: Option<NaiveDate>,
}

struct StatusRow {
    status: Status,
    literal: &'static str,
    group: Option<FunnelGroup>,
    funnel: Option<(ContractPath, FunnelStage)>,
    needs: TransitionRequirements,
}

const NONE: TransitionRequirements = TransitionRequirements {
    requires_contract_info: false,
    requires_processing_org: false,
    requires_execution_info: false,
    requires_clawback_date: false,
};
const CONTRACT: TransitionRequirements = TransitionRequirements {
    requires_contract_info: true,
    ..NONE
};
const ORG: TransitionRequirements = TransitionRequirements {
    requires_processing_org: true,
    ..NONE
};
const EXECUTION: TransitionRequirements = TransitionRequirements {
    requires_execution_info: true,
    ..NONE
};
const CLAWBACK: TransitionRequirements = TransitionRequirements {
    requires_clawback_date: true,
    ..NONE
};

macro_rules! row {
    ($status:ident, $lit:literal, $group:expr, $funnel:expr, $needs:expr) => {
        StatusRow {
            status: Status::$status,
            literal: $lit,
            group: $group,
            funnel: $funnel,
            needs: $needs,
        }
    };
}

use ContractPath::{Outsourced, Postpaid, Prepaid};
use FunnelGroup as G;
use FunnelStage as Stage;

static STATUS_TABLE: [StatusRow; 32] = [
    row!(Waiting, "대기", None, None, NONE),
    row!(ShortAbsence, "단기부재", None, None, NONE),
    row!(LongAbsence, "장기부재", None, None, NONE),
    row!(TrashSimpleRefusal, "휴지통(단순거절)", Some(G::Trash), None, NONE),
    row!(TrashBadCredit, "휴지통(신용불량)", Some(G::Trash), None, NONE),
    row!(TrashShortHistory, "휴지통(업력미달)", Some(G::Trash), None, NONE),
    row!(TrashLowRevenue, "휴지통(매출미달)", Some(G::Trash), None, NONE),
    row!(TrashTaxArrears, "휴지통(세금체납)", Some(G::Trash), None, NONE),
    row!(TrashDelinquent, "휴지통(연체)", Some(G::Trash), None, NONE),
    row!(TrashDuplicate, "휴지통(중복)", Some(G::Trash), None, NONE),
    row!(TrashOther, "휴지통(기타)", Some(G::Trash), None, NONE),
    row!(TargetOnHold, "타겟(보류)", Some(G::Target), None, NONE),
    row!(TargetRecontact, "타겟(재상담)", Some(G::Target), None, NONE),
    row!(TargetMissingDocuments, "타겟(서류미비)", Some(G::Target), None, NONE),
    row!(TargetNoFundingNeed, "타겟(자금불필요)", Some(G::Target), None, NONE),
    row!(TargetOtherVendor, "타겟(타사진행)", Some(G::Target), None, NONE),
    row!(TargetInsufficientLimit, "타겟(한도부족)", Some(G::Target), None, NONE),
    row!(TargetRateComplaint, "타겟(금리불만)", Some(G::Target), None, NONE),
    row!(TargetFeeComplaint, "타겟(수수료불만)", Some(G::Target), None, NONE),
    row!(ContractPrepaid, "계약완료(선불)", Some(G::ContractCompleted), Some((Prepaid, Stage::Contract)), CONTRACT),
    row!(ContractOutsourced, "계약완료(외주)", Some(G::ContractCompleted), Some((Outsourced, Stage::Contract)), CONTRACT),
    row!(ContractPostpaid, "계약완료(후불)", Some(G::ContractCompleted), Some((Postpaid, Stage::Contract)), CONTRACT),
    row!(DocumentsPrepaid, "서류취합완료(선불)", Some(G::DocumentsCollected), Some((Prepaid, Stage::Documents)), NONE),
    row!(DocumentsOutsourced, "서류취합완료(외주)", Some(G::DocumentsCollected), Some((Outsourced, Stage::Documents)), NONE),
    row!(DocumentsPostpaid, "서류취합완료(후불)", Some(G::DocumentsCollected), Some((Postpaid, Stage::Documents)), NONE),
    row!(ApplicationPrepaid, "신청완료(선불)", Some(G::ApplicationCompleted), Some((Prepaid, Stage::Application)), ORG),
    row!(ApplicationOutsourced, "신청완료(외주)", Some(G::ApplicationCompleted), Some((Outsourced, Stage::Application)), ORG),
    row!(ApplicationPostpaid, "신청완료(후불)", Some(G::ApplicationCompleted), Some((Postpaid, Stage::Application)), ORG),
    row!(ExecutionPrepaid, "집행완료(선불)", Some(G::ExecutionCompleted), Some((Prepaid, Stage::Execution)), EXECUTION),
    row!(ExecutionOutsourced, "집행완료(외주)", Some(G::ExecutionCompleted), Some((Outsourced, Stage::Execution)), EXECUTION),
    row!(ExecutionPostpaid, "집행완료(후불)", Some(G::ExecutionCompleted), Some((Postpaid, Stage::Execution)), EXECUTION),
    row!(FinalRejection, "최종부결", None, None, CLAWBACK),
];

impl Status {
    /// Initial state for newly ingested customers.
    pub const INITIAL: Status = Status::Waiting;

    pub fn all() -> impl Iterator<Item = Status> {
        STATUS_TABLE.iter().map(|s| s.status)
    }

    fn row(&self) -> &'static StatusRow {
        // STATUS_TABLE is declared in enum order
        &STATUS_TABLE[*self as usize]
    }

    pub fn as_str(&self) -> &'static str {
        self.row().literal
    }

    pub fn group(&self) -> Option<FunnelGroup> {
        self.row().group
    }

    pub fn path(&self) -> Option<ContractPath> {
        self.row().funnel.map(|(p, _)| p)
    }

    pub fn stage(&self) -> Option<FunnelStage> {
        self.row().funnel.map(|(_, s)| s)
    }

    pub fn requirements(&self) -> TransitionRequirements {
        self.row().needs
    }

    pub fn is_contract_completed(&self) -> bool {
        self.stage() == Some(FunnelStage::Contract)
    }

    pub fn is_execution_completed(&self) -> bool {
        self.stage() == Some(FunnelStage::Execution)
    }

    pub fn is_final_rejection(&self) -> bool {
        *self == Status::FinalRejection
    }

    /// Entering this status refreshes the settlement ledger.
    pub fn is_financially_significant(&self) -> bool {
        self.is_contract_completed() || self.is_execution_completed()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        STATUS_TABLE
            .iter()
            .find(|row| row.literal == s)
            .map(|row| row.status)
            .ok_or_else(|| CrmError::UnknownStatus {
                literal: s.to_string(),
            })
    }
}

impl Serialize for Status {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let literal = String::deserialize(deserializer)?;
        literal.parse().map_err(serde::de::Error::custom)
    }
}

/// Which supplementary fields a transition into `target` needs.
pub fn classify(target: Status) -> TransitionRequirements {
    target.requirements()
}

impl TransitionRequirements {
    pub fn is_empty(&self) -> bool {
        *self == NONE
    }

    /// Names of required fields absent from `supplement`.
    pub fn missing(&self, supplement: &Supplement) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.requires_contract_info {
            if supplement.contract_date.is_none() {
                missing.push("contract_date");
            }
            if supplement.contract_amount.is_none() {
                missing.push("contract_amount");
            }
            if supplement.commission_rate.is_none() {
                missing.push("commission_rate");
            }
        }
        if self.requires_processing_org
            && supplement
                .processing_org
                .as_deref()
                .map_or(true, |org| org.trim().is_empty())
        {
            missing.push("processing_org");
        }
        if self.requires_execution_info {
            if supplement.execution_date.is_none() {
                missing.push("execution_date");
            }
            if supplement.execution_amount.is_none() {
                missing.push("execution_amount");
            }
        }
        if self.requires_clawback_date && supplement.clawback_date.is_none() {
            missing.push("clawback_date");
        }
        missing
    }

    /// Reject `supplement` if it lacks anything a move into `target` needs.
    pub fn validate(&self, target: Status, supplement: &Supplement) -> CrmResult<()> {
        let missing = self.missing(supplement);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CrmError::MissingSupplement {
                status: target.as_str().to_string(),
                missing,
            })
        }
    }
}

/// Members of the funnel group named `label`.
/// Empty for ungrouped or literal labels: match that status exactly.
pub fn group_members(label: &str) -> Vec<Status> {
    match FunnelGroup::from_label(label) {
        Some(group) => Status::all().filter(|s| s.group() == Some(group)).collect(),
        None => Vec::new(),
    }
}

/// Does `status` satisfy a filter given as a group label or a literal?
pub fn matches_filter(status: Status, filter: &str) -> bool {
    let members = group_members(filter);
    if members.is_empty() {
        status.as_str() == filter
    } else {
        members.contains(&status)
    }
}

/// Headcount per funnel bucket. Ungrouped statuses count under their literal.
pub fn funnel_counts<I>(statuses: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = Status>,
{
    let mut counts = BTreeMap::new();
    for status in statuses {
        let key = status
            .group()
            .map(|g| g.label())
            .unwrap_or_else(|| status.as_str());
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
    counts
}
