use super::{orgs_column, orgs_to_json, CrmStore, StoreTx};
use crate::{
    customer::Customer,
    error::{CrmError, CrmResult},
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const CUSTOMER_COLUMNS: &str = "customer_id, name, status_code, manager_id, team_id,
    manager_name, team_name, contract_amount, commission_rate, execution_amount,
    contract_date, execution_date, contract_completion_date, processing_orgs,
    clawed_back_at, version, created_at, updated_at";

fn map_customer(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        customer_id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        manager_id: row.get(3)?,
        team_id: row.get(4)?,
        manager_name: row.get(5)?,
        team_name: row.get(6)?,
        contract_amount: row.get(7)?,
        commission_rate: row.get(8)?,
        execution_amount: row.get(9)?,
        contract_date: row.get(10)?,
        execution_date: row.get(11)?,
        contract_completion_date: row.get(12)?,
        processing_orgs: orgs_column(row, 13)?,
        clawed_back_at: row.get(14)?,
        version: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn load_customer(conn: &Connection, customer_id: &str) -> CrmResult<Option<Customer>> {
    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customer WHERE customer_id = ?1");
    let customer = conn
        .query_row(&sql, params![customer_id], map_customer)
        .optional()?;
    Ok(customer)
}

impl CrmStore {
    // ── Customer ──────────────────────────────────────────────────

    pub fn insert_customer(&self, c: &Customer) -> CrmResult<()> {
        if load_customer(&self.conn, &c.customer_id)?.is_some() {
            return Err(CrmError::CustomerExists {
                customer_id: c.customer_id.clone(),
            });
        }
        self.conn.execute(
            "INSERT INTO customer (
                customer_id, name, status_code, manager_id, team_id, manager_name,
                team_name, contract_amount, commission_rate, execution_amount,
                contract_date, execution_date, contract_completion_date,
                processing_orgs, clawed_back_at, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                &c.customer_id,
                &c.name,
                c.status,
                &c.manager_id,
                &c.team_id,
                &c.manager_name,
                &c.team_name,
                c.contract_amount,
                c.commission_rate,
                c.execution_amount,
                c.contract_date,
                c.execution_date,
                c.contract_completion_date,
                orgs_to_json(&c.processing_orgs)?,
                c.clawed_back_at,
                c.version,
                c.created_at,
                c.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn load_customer(&self, customer_id: &str) -> CrmResult<Option<Customer>> {
        load_customer(&self.conn, customer_id)
    }

    /// Every customer, in id order. The ranking rescans this on each call.
    pub fn all_customers(&self) -> CrmResult<Vec<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customer ORDER BY customer_id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], map_customer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn customer_count(&self) -> CrmResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM customer", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl StoreTx<'_> {
    pub fn load_customer(&self, customer_id: &str) -> CrmResult<Option<Customer>> {
        load_customer(&self.tx, customer_id)
    }

    /// Write back every mutable field of `c`, provided the stored row is
    /// still at `expected_version`. Returns false when it is not.
    pub fn update_customer(&self, c: &Customer, expected_version: i64) -> CrmResult<bool> {
        let updated = self.tx.execute(
            "UPDATE customer SET
                name = ?1, status_code = ?2, manager_id = ?3, team_id = ?4,
                manager_name = ?5, team_name = ?6, contract_amount = ?7,
                commission_rate = ?8, execution_amount = ?9, contract_date = ?10,
                execution_date = ?11, contract_completion_date = ?12,
                processing_orgs = ?13, clawed_back_at = ?14, version = ?15,
                updated_at = ?16
             WHERE customer_id = ?17 AND version = ?18",
            params![
                &c.name,
                c.status,
                &c.manager_id,
                &c.team_id,
                &c.manager_name,
                &c.team_name,
                c.contract_amount,
                c.commission_rate,
                c.execution_amount,
                c.contract_date,
                c.execution_date,
                c.contract_completion_date,
                orgs_to_json(&c.processing_orgs)?,
                c.clawed_back_at,
                c.version,
                c.updated_at,
                &c.customer_id,
                expected_version,
            ],
        )?;
        Ok(updated == 1)
    }
}
