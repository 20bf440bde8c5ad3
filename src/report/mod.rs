//! Reporting: per-block attribution output and summaries over saved blocks.

use crate::collector::BlockOutcome;
use crate::labels::LabelTable;
use crate::model::{BlockAttribution, DappGasAggregate, Ratio};
use crate::storage::{self, CoverageTotals};
use rusqlite::Connection;
use std::fmt;

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Print the outcome of an `attribute` run.
pub fn print_outcome(outcome: &BlockOutcome, labels: &LabelTable, top: usize) {
    print!("{}", OutcomeReport { outcome, labels, top });
}

pub fn render_outcome(outcome: &BlockOutcome, labels: &LabelTable, top: usize) -> String {
    OutcomeReport { outcome, labels, top }.to_string()
}

/// Tables and coverage lines for one block. `top` limits the per-address table.
pub fn render_attribution(a: &BlockAttribution, labels: &LabelTable, top: usize) -> String {
    AttributionReport {
        attribution: a,
        labels,
        top,
    }
    .to_string()
}

struct OutcomeReport<'a> {
    outcome: &'a BlockOutcome,
    labels: &'a LabelTable,
    top: usize,
}

impl fmt::Display for OutcomeReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            BlockOutcome::Syncing(status) => writeln!(f, "Node is syncing: {}", status),
            BlockOutcome::NoTransactions { block_number } => {
                writeln!(f, "Block {}: no transactions", block_number)
            }
            BlockOutcome::Attributed {
                attribution,
                mode,
                fetch_elapsed,
            } => {
                let report = AttributionReport {
                    attribution,
                    labels: self.labels,
                    top: self.top,
                };
                write!(f, "{}", report)?;
                writeln!(
                    f,
                    "fetch ({}): {:.3}s",
                    mode.as_str(),
                    fetch_elapsed.as_secs_f64()
                )
            }
        }
    }
}

struct AttributionReport<'a> {
    attribution: &'a BlockAttribution,
    labels: &'a LabelTable,
    top: usize,
}

impl fmt::Display for AttributionReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.attribution;
        let c = &a.coverage;
        writeln!(f, "--- Block {} ---", a.block_number)?;
        writeln!(f, "n_txs: {}", a.tx_count)?;
        if a.record_count != a.tx_count {
            writeln!(f, "n_records: {} (transactions without gas figures are left out)", a.record_count)?;
        }
        writeln!(f, "gas_used: {}", c.total_gas)?;
        if let Some(fee) = a.base_fee_per_gas {
            writeln!(f, "base_fee: {} gwei", format_gwei(u128::from(fee)))?;
        }

        let shown = self.top.min(a.by_address.len());
        writeln!(f, "\nBy address (top {} of {}):", shown, a.by_address.len())?;
        writeln!(f, "{:<44} {:>12} {:>6}  {}", "to", "gas_used", "count", "label")?;
        for agg in a.by_address.iter().take(self.top) {
            let label = self
                .labels
                .get(&agg.to)
                .map(|l| l.contract.as_str())
                .unwrap_or("-");
            writeln!(f, "{:<44} {:>12} {:>6}  {}", agg.to, agg.gas_used, agg.count, label)?;
        }

        writeln!(f, "\nBy dapp:")?;
        writeln!(f, "{:<32} {:>12} {:>6} {:>8}", "dapp", "gas_used", "count", "share")?;
        for d in &a.by_dapp {
            writeln!(
                f,
                "{:<32} {:>12} {:>6} {:>8}",
                d.dapp,
                d.gas_used,
                d.count,
                Ratio::of(d.gas_used, c.total_gas).to_string()
            )?;
        }

        writeln!(f, "\nCoverage:")?;
        writeln!(
            f,
            "simple transfers: {} ({} txs, {} gas)",
            c.simple_transfer, a.simple_transfer_count, c.simple_transfer_gas
        )?;
        writeln!(f, "dapps: {} ({} gas)", c.dapp, c.dapp_gas)?;
        writeln!(f, "combined: {} ({} gas)", c.combined, c.attributed_gas())?;
        writeln!(f, "unattributed gas: {}", c.unattributed_gas())?;

        if let (Some(total), Some(transfers), Some(dapps)) = (
            a.burned_wei(c.total_gas),
            a.burned_wei(c.simple_transfer_gas),
            a.burned_wei(c.dapp_gas),
        ) {
            writeln!(
                f,
                "burned: {} gwei total, {} gwei transfers, {} gwei dapps",
                format_gwei(total),
                format_gwei(transfers),
                format_gwei(dapps)
            )?;
        }
        Ok(())
    }
}

/// Dapp totals and coverage over saved blocks in `[low, high)`.
pub fn range_summary(conn: &Connection, low: u64, high: u64) -> anyhow::Result<()> {
    print!("{}", render_range_summary(conn, low, high)?);
    Ok(())
}

pub fn render_range_summary(conn: &Connection, low: u64, high: u64) -> anyhow::Result<String> {
    let totals = storage::coverage_totals_in_range(conn, low, high)?;
    if totals.blocks == 0 {
        return Ok("No saved blocks in range.\n".to_string());
    }
    let dapps = storage::dapp_totals_in_range(conn, low, high)?;
    Ok(RangeReport {
        low,
        high,
        totals: &totals,
        dapps: &dapps,
    }
    .to_string())
}

struct RangeReport<'a> {
    low: u64,
    high: u64,
    totals: &'a CoverageTotals,
    dapps: &'a [DappGasAggregate],
}

impl fmt::Display for RangeReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.totals;
        writeln!(f, "--- Blocks [{}, {}) ---", self.low, self.high)?;
        writeln!(f, "blocks: {}", t.blocks)?;
        writeln!(f, "n_txs: {}", t.tx_count)?;
        writeln!(f, "gas_used: {}", t.total_gas)?;
        writeln!(f, "{:<32} {:>14} {:>8} {:>8}", "dapp", "gas_used", "count", "share")?;
        for d in self.dapps {
            writeln!(
                f,
                "{:<32} {:>14} {:>8} {:>8}",
                d.dapp,
                d.gas_used,
                d.count,
                Ratio::of(d.gas_used, t.total_gas).to_string()
            )?;
        }
        let attributed = t.simple_transfer_gas + t.dapp_gas;
        writeln!(f, "simple transfers: {}", Ratio::of(t.simple_transfer_gas, t.total_gas))?;
        writeln!(f, "dapps: {}", Ratio::of(t.dapp_gas, t.total_gas))?;
        writeln!(f, "combined: {}", Ratio::of(attributed, t.total_gas))
    }
}

fn format_gwei(wei: u128) -> String {
    let whole = wei / WEI_PER_GWEI;
    let frac = (wei % WEI_PER_GWEI) / 1_000_000;
    format!("{}.{:03}", whole, frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution;
    use crate::model::{TransactionGasRecord, SIMPLE_TRANSFER_GAS};

    #[test]
    fn test_format_gwei() {
        assert_eq!(format_gwei(0), "0.000");
        assert_eq!(format_gwei(1_000_000_000), "1.000");
        assert_eq!(format_gwei(12_345_678_901), "12.345");
    }

    #[test]
    fn test_render_non_attributed_outcomes() {
        let labels = LabelTable::new();
        let syncing = BlockOutcome::Syncing(serde_json::json!({ "currentBlock": "0x1" }));
        assert!(render_outcome(&syncing, &labels, 10).starts_with("Node is syncing: "));
        let empty = BlockOutcome::NoTransactions { block_number: 5 };
        assert_eq!(render_outcome(&empty, &labels, 10), "Block 5: no transactions\n");
    }

    #[test]
    fn test_render_shows_missing_records() {
        let labels = LabelTable::new();
        let records = [TransactionGasRecord::new(Some("0xaa"), 21_000)];
        let a = attribution::attribute(9, 2, 50_000, None, &records, &labels, SIMPLE_TRANSFER_GAS)
            .unwrap()
            .unwrap();
        let out = render_attribution(&a, &labels, 10);
        assert!(out.contains("n_txs: 2\n"));
        assert!(out.contains("n_records: 1 "));
        assert!(!out.contains("burned:"));

        let complete = attribution::attribute(9, 1, 50_000, None, &records, &labels, SIMPLE_TRANSFER_GAS)
            .unwrap()
            .unwrap();
        assert!(!render_attribution(&complete, &labels, 10).contains("n_records"));
    }
}
