//! Block gas collection (read-only): sync gate, per-transaction gas sourcing, attribution.

use crate::attribution;
use crate::config::{Config, SourceMode};
use crate::labels::LabelTable;
use crate::model::{BlockAttribution, TransactionGasRecord};
use crate::rpc::{Block, BlockId, NodeClient, SyncStatus};
use anyhow::Context;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Source of per-transaction gas figures for one block.
#[allow(async_fn_in_trait)]
pub trait GasSource {
    fn mode(&self) -> SourceMode;

    async fn records(&self, block: &Block) -> anyhow::Result<Vec<TransactionGasRecord>>;
}

/// Top-level call frames from a single `debug_traceBlockByNumber` call.
pub struct TraceSource<'a> {
    client: &'a NodeClient,
}

impl<'a> TraceSource<'a> {
    pub fn new(client: &'a NodeClient) -> Self {
        TraceSource { client }
    }
}

impl GasSource for TraceSource<'_> {
    fn mode(&self) -> SourceMode {
        SourceMode::Trace
    }

    async fn records(&self, block: &Block) -> anyhow::Result<Vec<TransactionGasRecord>> {
        let entries = self
            .client
            .trace_block(block.number)
            .await
            .with_context(|| format!("trace block {}", block.number))?;
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.result {
                Some(frame) if frame.is_create() => {
                    records.push(TransactionGasRecord::contract_creation(frame.gas_used))
                }
                Some(frame) => {
                    records.push(TransactionGasRecord::new(frame.to.as_deref(), frame.gas_used))
                }
                None => warn!(
                    block = block.number,
                    tx = entry.tx_hash.as_deref().unwrap_or("?"),
                    "trace entry without result: {}",
                    entry.error.as_deref().unwrap_or("no error given")
                ),
            }
        }
        Ok(records)
    }
}

/// One `eth_getTransactionReceipt` call per transaction, in block order.
pub struct ReceiptSource<'a> {
    client: &'a NodeClient,
}

impl<'a> ReceiptSource<'a> {
    pub fn new(client: &'a NodeClient) -> Self {
        ReceiptSource { client }
    }
}

impl GasSource for ReceiptSource<'_> {
    fn mode(&self) -> SourceMode {
        SourceMode::Receipt
    }

    async fn records(&self, block: &Block) -> anyhow::Result<Vec<TransactionGasRecord>> {
        let mut records = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            let receipt = self
                .client
                .get_receipt(&tx.hash)
                .await
                .with_context(|| format!("receipt for {}", tx.hash))?
                .ok_or_else(|| anyhow::anyhow!("missing receipt for {}", tx.hash))?;
            // Receipts carry `to: null` for creations; fall back to the transaction's own field.
            let to = if receipt.contract_address.is_some() {
                None
            } else {
                receipt.to.as_deref().or(tx.to.as_deref())
            };
            records.push(TransactionGasRecord::new(to, receipt.gas_used));
        }
        Ok(records)
    }
}

/// Result of one attribution run.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockOutcome {
    /// The node is still syncing; nothing was fetched.
    Syncing(serde_json::Value),
    NoTransactions { block_number: u64 },
    Attributed {
        attribution: BlockAttribution,
        mode: SourceMode,
        fetch_elapsed: Duration,
    },
}

/// Gate on sync status, fetch the block, source its gas records and attribute them.
pub async fn run_attribute(
    config: &Config,
    client: &NodeClient,
    labels: &LabelTable,
    block_id: BlockId,
    mode: SourceMode,
) -> anyhow::Result<BlockOutcome> {
    if block_id == BlockId::Latest {
        if let SyncStatus::Syncing(status) = client.syncing().await.context("eth_syncing")? {
            info!(%status, "node is syncing, skipping attribution");
            return Ok(BlockOutcome::Syncing(status));
        }
    }

    let started = Instant::now();
    let block = client
        .get_block(block_id)
        .await
        .with_context(|| format!("get block {}", block_id))?
        .ok_or_else(|| anyhow::anyhow!("block {} not found", block_id))?;

    let records = match mode {
        SourceMode::Trace => collect_records(&TraceSource::new(client), &block).await?,
        SourceMode::Receipt => collect_records(&ReceiptSource::new(client), &block).await?,
    };
    let fetch_elapsed = started.elapsed();

    let attribution = attribution::attribute(
        block.number,
        block.transactions.len() as u64,
        block.gas_used,
        block.base_fee_per_gas,
        &records,
        labels,
        config.attribution.simple_transfer_gas,
    )
    .with_context(|| format!("attribute block {}", block.number))?;

    match attribution {
        None => {
            info!(block = block.number, "block has no transactions");
            Ok(BlockOutcome::NoTransactions {
                block_number: block.number,
            })
        }
        Some(attribution) => {
            info!(
                block = block.number,
                mode = mode.as_str(),
                n_txs = attribution.tx_count,
                n_records = attribution.record_count,
                elapsed_ms = fetch_elapsed.as_millis() as u64,
                "attribution done"
            );
            Ok(BlockOutcome::Attributed {
                attribution,
                mode,
                fetch_elapsed,
            })
        }
    }
}

async fn collect_records<S: GasSource>(
    source: &S,
    block: &Block,
) -> anyhow::Result<Vec<TransactionGasRecord>> {
    let records = source.records(block).await?;
    tracing::debug!(
        block = block.number,
        mode = source.mode().as_str(),
        n_records = records.len(),
        n_txs = block.transactions.len(),
        "gas records fetched"
    );
    Ok(records)
}
