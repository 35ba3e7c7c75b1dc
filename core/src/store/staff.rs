use super::{CrmStore, StoreTx};
use crate::{customer::Manager, error::CrmResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

fn load_manager(conn: &Connection, manager_id: &str) -> CrmResult<Option<Manager>> {
    let manager = conn
        .query_row(
            "SELECT manager_id, manager_name, team_id, team_name
             FROM manager WHERE manager_id = ?1",
            params![manager_id],
            |row| {
                Ok(Manager {
                    manager_id: row.get(0)?,
                    manager_name: row.get(1)?,
                    team_id: row.get(2)?,
                    team_name: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(manager)
}

impl CrmStore {
    // ── Staff directory ───────────────────────────────────────────

    pub fn load_manager(&self, manager_id: &str) -> CrmResult<Option<Manager>> {
        load_manager(&self.conn, manager_id)
    }

    pub fn all_managers(&self) -> CrmResult<Vec<Manager>> {
        let mut stmt = self.conn.prepare(
            "SELECT manager_id, manager_name, team_id, team_name
             FROM manager ORDER BY manager_id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Manager {
                    manager_id: row.get(0)?,
                    manager_name: row.get(1)?,
                    team_id: row.get(2)?,
                    team_name: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl StoreTx<'_> {
    pub fn load_manager(&self, manager_id: &str) -> CrmResult<Option<Manager>> {
        load_manager(&self.tx, manager_id)
    }

    pub fn upsert_manager(&self, m: &Manager) -> CrmResult<()> {
        self.tx.execute(
            "INSERT INTO manager (manager_id, manager_name, team_id, team_name)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(manager_id) DO UPDATE SET
                manager_name = excluded.manager_name,
                team_id = excluded.team_id,
                team_name = excluded.team_name",
            params![&m.manager_id, &m.manager_name, &m.team_id, &m.team_name],
        )?;
        Ok(())
    }

    /// Rewrite the denormalized name/team copies on every customer and
    /// ledger row attributed to `m`. Returns (customers, ledger rows).
    pub fn refresh_manager_attribution(
        &self,
        m: &Manager,
        at: DateTime<Utc>,
    ) -> CrmResult<(usize, usize)> {
        let customers = self.tx.execute(
            "UPDATE customer SET manager_name = ?1, team_id = ?2, team_name = ?3,
                updated_at = ?4
             WHERE manager_id = ?5
               AND (manager_name IS NOT ?1 OR team_id IS NOT ?2 OR team_name IS NOT ?3)",
            params![&m.manager_name, &m.team_id, &m.team_name, at, &m.manager_id],
        )?;
        let items = self.tx.execute(
            "UPDATE settlement_item SET manager_name = ?1, team_id = ?2, team_name = ?3,
                updated_at = ?4
             WHERE manager_id = ?5
               AND (manager_name IS NOT ?1 OR team_id IS NOT ?2 OR team_name IS NOT ?3)",
            params![&m.manager_name, &m.team_id, &m.team_name, at, &m.manager_id],
        )?;
        Ok((customers, items))
    }
}
