//! Audit logger — the append-only history of every customer mutation.
//!
//! RULE: nothing here updates or deletes. The tables carry triggers that
//! abort any attempt to.
//!
//! In best-effort mode a failed write is reported and dropped: it never
//! fails the mutation that produced it.

use crate::{
    clock::Clock,
    error::{CrmError, CrmResult},
    status::Status,
    store::CrmStore,
    types::{Actor, CustomerId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    StatusChange,
    ManagerChange,
    InfoUpdate,
    DocumentUpload,
    MemoAdded,
    OrgChange,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusChange => "status_change",
            Self::ManagerChange => "manager_change",
            Self::InfoUpdate => "info_update",
            Self::DocumentUpload => "document_upload",
            Self::MemoAdded => "memo_added",
            Self::OrgChange => "org_change",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "status_change" => Self::StatusChange,
            "manager_change" => Self::ManagerChange,
            "info_update" => Self::InfoUpdate,
            "document_upload" => Self::DocumentUpload,
            "memo_added" => Self::MemoAdded,
            "org_change" => Self::OrgChange,
            other => {
                return Err(CrmError::CorruptRow {
                    table: "customer_history",
                    detail: format!("unknown action_type '{other}'"),
                })
            }
        })
    }
}

/// One row of the status feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub id: Option<i64>,
    pub customer_id: CustomerId,
    pub previous_status: Status,
    pub new_status: Status,
    pub changed_by: Actor,
    pub changed_at: DateTime<Utc>,
}

/// One row of the customer history feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Option<i64>,
    pub customer_id: CustomerId,
    pub action_type: ActionType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub description: String,
    pub changed_by: Actor,
    pub changed_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        customer_id: &str,
        action_type: ActionType,
        description: impl Into<String>,
        changed_by: &str,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            customer_id: customer_id.to_string(),
            action_type,
            old_value: None,
            new_value: None,
            description: description.into(),
            changed_by: changed_by.to_string(),
            changed_at,
        }
    }

    pub fn values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    pub fn status_change(log: &StatusLogEntry) -> Self {
        Self::new(
            &log.customer_id,
            ActionType::StatusChange,
            format!("status {} -> {}", log.previous_status, log.new_status),
            &log.changed_by,
            log.changed_at,
        )
        .values(
            Some(log.previous_status.to_string()),
            Some(log.new_status.to_string()),
        )
    }
}

pub struct AuditLogger<'a> {
    store: &'a CrmStore,
    clock: &'a dyn Clock,
}

impl<'a> AuditLogger<'a> {
    pub fn new(store: &'a CrmStore, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Append one entry. Failures are logged, never returned.
    pub fn record(&self, entry: &HistoryEntry) {
        if let Err(e) = self.store.append_history(entry) {
            log::warn!(
                "audit write failed for {} ({}): {e}",
                entry.customer_id,
                entry.action_type
            );
        }
    }

    pub fn record_all(&self, entries: &[HistoryEntry]) {
        for entry in entries {
            self.record(entry);
        }
    }

    pub fn document_uploaded(&self, customer_id: &str, file_name: &str, actor: &str) {
        let entry = HistoryEntry::new(
            customer_id,
            ActionType::DocumentUpload,
            format!("document '{file_name}' uploaded"),
            actor,
            self.clock.now(),
        )
        .values(None, Some(file_name.to_string()));
        self.record(&entry);
    }

    pub fn memo_added(&self, customer_id: &str, memo: &str, actor: &str) {
        let entry = HistoryEntry::new(
            customer_id,
            ActionType::MemoAdded,
            "memo added",
            actor,
            self.clock.now(),
        )
        .values(None, Some(memo.to_string()));
        self.record(&entry);
    }

    /// History feed, newest first.
    pub fn history(&self, customer_id: &str) -> CrmResult<Vec<HistoryEntry>> {
        self.store.history_for(customer_id)
    }

    /// Status feed, newest first.
    pub fn status_log(&self, customer_id: &str) -> CrmResult<Vec<StatusLogEntry>> {
        self.store.status_log_for(customer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::NaiveDate;

    fn store() -> CrmStore {
        let store = CrmStore::in_memory().unwrap();
        store.migrate().unwrap();
        store
    }

    #[test]
    fn history_is_newest_first() {
        let store = store();
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        let audit = AuditLogger::new(&store, &clock);

        audit.memo_added("c-1", "first call", "kim");
        clock.advance(chrono::Duration::hours(1));
        audit.document_uploaded("c-1", "bizreg.pdf", "kim");
        audit.memo_added("c-2", "other customer", "lee");

        let feed = audit.history("c-1").unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].action_type, ActionType::DocumentUpload);
        assert_eq!(feed[1].action_type, ActionType::MemoAdded);
        assert_eq!(feed[1].new_value.as_deref(), Some("first call"));
    }

    #[test]
    fn failed_write_is_swallowed() {
        let store = store();
        store
            .conn()
            .execute_batch("DROP TABLE customer_history;")
            .unwrap();
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        let audit = AuditLogger::new(&store, &clock);

        // Must not panic or surface the error.
        audit.memo_added("c-1", "lost", "kim");
        assert!(audit.history("c-1").is_err());
    }

    #[test]
    fn history_rows_cannot_be_rewritten() {
        let store = store();
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        AuditLogger::new(&store, &clock).memo_added("c-1", "memo", "kim");

        let update = store
            .conn()
            .execute("UPDATE customer_history SET description = 'x'", []);
        assert!(update.is_err());
        let delete = store.conn().execute("DELETE FROM customer_history", []);
        assert!(delete.is_err());
    }

    #[test]
    fn action_type_literals_round_trip() {
        for a in [
            ActionType::StatusChange,
            ActionType::ManagerChange,
            ActionType::InfoUpdate,
            ActionType::DocumentUpload,
            ActionType::MemoAdded,
            ActionType::OrgChange,
        ] {
            assert_eq!(a.as_str().parse::<ActionType>().unwrap(), a);
        }
        assert!("deleted".parse::<ActionType>().is_err());
    }
}
