use super::{CrmStore, StoreTx};
use crate::{
    audit::{HistoryEntry, StatusLogEntry},
    error::CrmResult,
};
use rusqlite::{params, Connection};

fn insert_history(conn: &Connection, e: &HistoryEntry) -> CrmResult<i64> {
    conn.execute(
        "INSERT INTO customer_history
         (customer_id, action_type, old_value, new_value, description, changed_by, changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &e.customer_id,
            e.action_type,
            &e.old_value,
            &e.new_value,
            &e.description,
            &e.changed_by,
            e.changed_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl CrmStore {
    // ── Audit trail ───────────────────────────────────────────────

    /// Autocommitted append, outside any unit of work.
    pub fn append_history(&self, entry: &HistoryEntry) -> CrmResult<i64> {
        insert_history(&self.conn, entry)
    }

    pub fn history_for(&self, customer_id: &str) -> CrmResult<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, customer_id, action_type, old_value, new_value,
                    description, changed_by, changed_at
             FROM customer_history WHERE customer_id = ?1
             ORDER BY changed_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![customer_id], |row| {
                Ok(HistoryEntry {
                    id: Some(row.get(0)?),
                    customer_id: row.get(1)?,
                    action_type: row.get(2)?,
                    old_value: row.get(3)?,
                    new_value: row.get(4)?,
                    description: row.get(5)?,
                    changed_by: row.get(6)?,
                    changed_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn status_log_for(&self, customer_id: &str) -> CrmResult<Vec<StatusLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, customer_id, previous_status, new_status, changed_by, changed_at
             FROM status_log WHERE customer_id = ?1
             ORDER BY changed_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![customer_id], |row| {
                Ok(StatusLogEntry {
                    id: Some(row.get(0)?),
                    customer_id: row.get(1)?,
                    previous_status: row.get(2)?,
                    new_status: row.get(3)?,
                    changed_by: row.get(4)?,
                    changed_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn status_log_count(&self, customer_id: &str) -> CrmResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM status_log WHERE customer_id = ?1",
            params![customer_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl StoreTx<'_> {
    pub fn insert_status_log(&self, e: &StatusLogEntry) -> CrmResult<i64> {
        self.tx.execute(
            "INSERT INTO status_log
             (customer_id, previous_status, new_status, changed_by, changed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &e.customer_id,
                e.previous_status,
                e.new_status,
                &e.changed_by,
                e.changed_at,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Append inside the unit of work; used when audit is atomic.
    pub fn append_history(&self, entry: &HistoryEntry) -> CrmResult<i64> {
        insert_history(&self.tx, entry)
    }
}
