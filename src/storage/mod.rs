//! SQLite storage for saved block attributions (per-block coverage and per-dapp gas).

use crate::config::SourceMode;
use crate::model::{BlockAttribution, DappGasAggregate};
use rusqlite::Connection;
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS block_attribution (
    block_number INTEGER NOT NULL,
    mode TEXT NOT NULL,
    tx_count INTEGER NOT NULL,
    total_gas INTEGER NOT NULL,
    simple_transfer_gas INTEGER NOT NULL,
    dapp_gas INTEGER NOT NULL,
    base_fee_per_gas INTEGER,
    collected_at TEXT NOT NULL,
    PRIMARY KEY (block_number)
);

CREATE TABLE IF NOT EXISTS block_dapp_gas (
    block_number INTEGER NOT NULL,
    dapp TEXT NOT NULL,
    gas_used INTEGER NOT NULL,
    tx_count INTEGER NOT NULL,
    PRIMARY KEY (block_number, dapp)
);
";

/// A stored block row (dapp rows are read separately).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    pub block_number: u64,
    pub mode: String,
    pub tx_count: u64,
    pub total_gas: u64,
    pub simple_transfer_gas: u64,
    pub dapp_gas: u64,
    pub base_fee_per_gas: Option<u64>,
    pub collected_at: String,
}

/// Gas sums over a range of stored blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageTotals {
    pub blocks: u64,
    pub tx_count: u64,
    pub total_gas: u64,
    pub simple_transfer_gas: u64,
    pub dapp_gas: u64,
}

pub fn open_db(path: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// Upsert a block's attribution; its dapp rows are replaced atomically.
pub fn save_attribution(
    conn: &mut Connection,
    attribution: &BlockAttribution,
    mode: SourceMode,
) -> anyhow::Result<()> {
    let collected_at = chrono::Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO block_attribution (block_number, mode, tx_count, total_gas, simple_transfer_gas, dapp_gas, base_fee_per_gas, collected_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(block_number) DO UPDATE SET
         mode=excluded.mode, tx_count=excluded.tx_count, total_gas=excluded.total_gas,
         simple_transfer_gas=excluded.simple_transfer_gas, dapp_gas=excluded.dapp_gas,
         base_fee_per_gas=excluded.base_fee_per_gas, collected_at=excluded.collected_at",
        rusqlite::params![
            attribution.block_number as i64,
            mode.as_str(),
            attribution.tx_count as i64,
            attribution.coverage.total_gas as i64,
            attribution.coverage.simple_transfer_gas as i64,
            attribution.coverage.dapp_gas as i64,
            attribution.base_fee_per_gas.map(|f| f as i64),
            collected_at,
        ],
    )?;
    tx.execute(
        "DELETE FROM block_dapp_gas WHERE block_number = ?1",
        [attribution.block_number as i64],
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO block_dapp_gas (block_number, dapp, gas_used, tx_count) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for d in &attribution.by_dapp {
            stmt.execute(rusqlite::params![
                attribution.block_number as i64,
                d.dapp,
                d.gas_used as i64,
                d.count as i64,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn get_attribution(conn: &Connection, block_number: u64) -> anyhow::Result<Option<StoredBlock>> {
    let mut stmt = conn.prepare(
        "SELECT block_number, mode, tx_count, total_gas, simple_transfer_gas, dapp_gas, base_fee_per_gas, collected_at
         FROM block_attribution WHERE block_number = ?1",
    )?;
    let mut rows = stmt.query([block_number as i64])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(StoredBlock {
            block_number: row.get::<_, i64>(0)? as u64,
            mode: row.get(1)?,
            tx_count: row.get::<_, i64>(2)? as u64,
            total_gas: row.get::<_, i64>(3)? as u64,
            simple_transfer_gas: row.get::<_, i64>(4)? as u64,
            dapp_gas: row.get::<_, i64>(5)? as u64,
            base_fee_per_gas: row.get::<_, Option<i64>>(6)?.map(|f| f as u64),
            collected_at: row.get(7)?,
        }));
    }
    Ok(None)
}

pub fn get_dapp_gas(conn: &Connection, block_number: u64) -> anyhow::Result<Vec<DappGasAggregate>> {
    dapp_totals_in_range(conn, block_number, block_number.saturating_add(1))
}

pub fn block_numbers_in_range(conn: &Connection, low: u64, high: u64) -> anyhow::Result<Vec<u64>> {
    let mut stmt = conn.prepare(
        "SELECT block_number FROM block_attribution WHERE block_number >= ?1 AND block_number < ?2 ORDER BY block_number",
    )?;
    let rows = stmt.query_map(rusqlite::params![low as i64, high as i64], |r| {
        r.get::<_, i64>(0)
    })?;
    let mut out = Vec::new();
    for n in rows {
        out.push(n? as u64);
    }
    Ok(out)
}

/// Per-dapp gas summed over stored blocks in `[low, high)`, largest first.
pub fn dapp_totals_in_range(
    conn: &Connection,
    low: u64,
    high: u64,
) -> anyhow::Result<Vec<DappGasAggregate>> {
    let mut stmt = conn.prepare(
        "SELECT dapp, SUM(gas_used), SUM(tx_count) FROM block_dapp_gas
         WHERE block_number >= ?1 AND block_number < ?2
         GROUP BY dapp ORDER BY SUM(gas_used) DESC, dapp",
    )?;
    let rows = stmt.query_map(rusqlite::params![low as i64, high as i64], |row| {
        Ok(DappGasAggregate {
            dapp: row.get(0)?,
            gas_used: row.get::<_, i64>(1)? as u64,
            count: row.get::<_, i64>(2)? as u64,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn coverage_totals_in_range(
    conn: &Connection,
    low: u64,
    high: u64,
) -> anyhow::Result<CoverageTotals> {
    let mut stmt = conn.prepare(
        "SELECT COUNT(*), COALESCE(SUM(tx_count), 0), COALESCE(SUM(total_gas), 0),
                COALESCE(SUM(simple_transfer_gas), 0), COALESCE(SUM(dapp_gas), 0)
         FROM block_attribution WHERE block_number >= ?1 AND block_number < ?2",
    )?;
    let totals = stmt.query_row(rusqlite::params![low as i64, high as i64], |row| {
        Ok(CoverageTotals {
            blocks: row.get::<_, i64>(0)? as u64,
            tx_count: row.get::<_, i64>(1)? as u64,
            total_gas: row.get::<_, i64>(2)? as u64,
            simple_transfer_gas: row.get::<_, i64>(3)? as u64,
            dapp_gas: row.get::<_, i64>(4)? as u64,
        })
    })?;
    Ok(totals)
}
