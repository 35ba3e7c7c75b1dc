use crate::{
    customer::FinancialPatch,
    lifecycle::TransitionRequest,
    score::RankingScope,
    types::{Actor, CustomerId, ManagerId, SettlementMonth, TeamId},
};
use serde::{Deserialize, Serialize};

/// Commands accepted by the runner, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum CrmCommand {
    // ── Directory & registration ─────────────────
    RegisterCustomer {
        customer_id: CustomerId,
        name: String,
        #[serde(default)]
        manager_id: Option<ManagerId>,
        actor: Actor,
    },
    UpsertManager {
        manager_id: ManagerId,
        manager_name: String,
        team_id: TeamId,
        team_name: String,
    },

    // ── Lifecycle ────────────────────────────────
    Transition(TransitionRequest),
    UpdateFinancials {
        customer_id: CustomerId,
        patch: FinancialPatch,
        actor: Actor,
    },
    Reassign {
        customer_id: CustomerId,
        manager_id: ManagerId,
        team_id: TeamId,
        actor: Actor,
    },
    AddMemo {
        customer_id: CustomerId,
        memo: String,
        actor: Actor,
    },
    UploadDocument {
        customer_id: CustomerId,
        file_name: String,
        actor: Actor,
    },

    // ── Settlement ───────────────────────────────
    SyncSettlement {
        customer_id: CustomerId,
    },
    Clawback {
        customer_id: CustomerId,
        month: SettlementMonth,
    },

    // ── Reporting ────────────────────────────────
    Rank {
        /// `YYYY`, `YYYY-H1|H2` or `YYYY-MM`.
        period: String,
        scope: RankingScope,
    },
    History {
        customer_id: CustomerId,
    },
    FunnelCounts,

    Quit,
}
