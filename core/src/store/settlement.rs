use super::{CrmStore, StoreTx};
use crate::{
    customer::Manager,
    error::CrmResult,
    settlement::SettlementItem,
    types::{SettlementMonth, Won},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

const ITEM_COLUMNS: &str = "item_id, customer_id, settlement_month, kind, processing_org,
    amount, manager_id, team_id, manager_name, team_name, is_clawback,
    reverses_item_id, category_bonus, amount_bonus, created_at, updated_at";

fn map_item(row: &Row<'_>) -> rusqlite::Result<SettlementItem> {
    Ok(SettlementItem {
        item_id: row.get(0)?,
        customer_id: row.get(1)?,
        settlement_month: row.get(2)?,
        kind: row.get(3)?,
        processing_org: row.get(4)?,
        amount: row.get(5)?,
        manager_id: row.get(6)?,
        team_id: row.get(7)?,
        manager_name: row.get(8)?,
        team_name: row.get(9)?,
        is_clawback: row.get::<_, i32>(10)? != 0,
        reverses_item_id: row.get(11)?,
        category_bonus: row.get(12)?,
        amount_bonus: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn items_for(conn: &Connection, customer_id: &str) -> CrmResult<Vec<SettlementItem>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM settlement_item
         WHERE customer_id = ?1 ORDER BY seq ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![customer_id], map_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl CrmStore {
    // ── Settlement ledger ─────────────────────────────────────────

    /// Every ledger row for a customer, oldest first.
    pub fn settlement_items_for(&self, customer_id: &str) -> CrmResult<Vec<SettlementItem>> {
        items_for(&self.conn, customer_id)
    }

    /// Rows attributed to one settlement month, for period reporting.
    pub fn settlement_items_in_month(
        &self,
        month: SettlementMonth,
    ) -> CrmResult<Vec<SettlementItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM settlement_item
             WHERE settlement_month = ?1 ORDER BY seq ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![month], map_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Signed sum of every ledger row for a customer.
    pub fn ledger_total(&self, customer_id: &str) -> CrmResult<Won> {
        let total: Won = self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM settlement_item WHERE customer_id = ?1",
            params![customer_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

impl StoreTx<'_> {
    pub fn settlement_items_for(&self, customer_id: &str) -> CrmResult<Vec<SettlementItem>> {
        items_for(&self.tx, customer_id)
    }

    pub fn insert_settlement_item(&self, item: &SettlementItem) -> CrmResult<()> {
        self.tx.execute(
            "INSERT INTO settlement_item
             (item_id, customer_id, settlement_month, kind, processing_org, amount,
              manager_id, team_id, manager_name, team_name, is_clawback,
              reverses_item_id, category_bonus, amount_bonus, seq, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     (SELECT COALESCE(MAX(seq), 0) + 1 FROM settlement_item), ?15, ?16)",
            params![
                &item.item_id,
                &item.customer_id,
                item.settlement_month,
                item.kind,
                &item.processing_org,
                item.amount,
                &item.manager_id,
                &item.team_id,
                &item.manager_name,
                &item.team_name,
                if item.is_clawback { 1 } else { 0 },
                &item.reverses_item_id,
                item.category_bonus,
                item.amount_bonus,
                item.created_at,
                item.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Overwrite the computed values of an existing recognition row.
    pub fn update_settlement_item(&self, item: &SettlementItem) -> CrmResult<()> {
        self.tx.execute(
            "UPDATE settlement_item SET
                settlement_month = ?1, amount = ?2, manager_id = ?3, team_id = ?4,
                manager_name = ?5, team_name = ?6, category_bonus = ?7,
                amount_bonus = ?8, updated_at = ?9
             WHERE item_id = ?10 AND reverses_item_id IS NULL",
            params![
                item.settlement_month,
                item.amount,
                &item.manager_id,
                &item.team_id,
                &item.manager_name,
                &item.team_name,
                item.category_bonus,
                item.amount_bonus,
                item.updated_at,
                &item.item_id,
            ],
        )?;
        Ok(())
    }

    /// Point every ledger row of a customer at a new manager/team.
    pub fn reassign_settlement_items(
        &self,
        customer_id: &str,
        manager: &Manager,
        at: DateTime<Utc>,
    ) -> CrmResult<usize> {
        let updated = self.tx.execute(
            "UPDATE settlement_item SET
                manager_id = ?1, team_id = ?2, manager_name = ?3, team_name = ?4,
                updated_at = ?5
             WHERE customer_id = ?6",
            params![
                &manager.manager_id,
                &manager.team_id,
                &manager.manager_name,
                &manager.team_name,
                at,
                customer_id,
            ],
        )?;
        Ok(updated)
    }
}
