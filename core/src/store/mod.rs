//! SQLite persistence layer.
//!
//! RULE: Only the store module talks to the database.
//! Components call store methods — they never execute SQL directly.
//!
//! Reads and single-row appends go through `CrmStore`. Anything that must
//! land as one unit goes through a `StoreTx` from `begin()`, which rolls
//! back on drop unless `commit()` is called.

use crate::{
    audit::ActionType,
    error::CrmResult,
    settlement::SettlementKind,
    status::Status,
    types::SettlementMonth,
};
use rusqlite::{
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
    Connection, Transaction,
};

mod audit_log;
mod customer;
mod settlement;
mod staff;

pub struct CrmStore {
    conn: Connection,
}

impl CrmStore {
    pub fn open(path: &str) -> CrmResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> CrmResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> CrmResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_customers.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_audit_log.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_settlement.sql"))?;
        Ok(())
    }

    /// Start a unit of work.
    pub fn begin(&self) -> CrmResult<StoreTx<'_>> {
        Ok(StoreTx {
            tx: self.conn.unchecked_transaction()?,
        })
    }

    /// Raw connection, for tests that need to sabotage the schema.
    #[doc(hidden)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// An open unit of work. Dropped without `commit()` it rolls back.
pub struct StoreTx<'a> {
    tx: Transaction<'a>,
}

impl StoreTx<'_> {
    pub fn commit(self) -> CrmResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}

// ── Column conversions ───────────────────────────────────────────

fn text_column<T>(value: ValueRef<'_>) -> FromSqlResult<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .as_str()?
        .parse()
        .map_err(|e| FromSqlError::Other(Box::new(e)))
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value)
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ActionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value)
    }
}

impl ToSql for ActionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SettlementKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value)
    }
}

impl ToSql for SettlementKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SettlementMonth {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for SettlementMonth {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

fn orgs_to_json(orgs: &[String]) -> CrmResult<String> {
    Ok(serde_json::to_string(orgs)?)
}

fn orgs_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
