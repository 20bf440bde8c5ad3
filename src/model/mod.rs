//! Gas attribution model: labels, per-transaction records and aggregates.

use serde::{Deserialize, Serialize};

/// Destination used for transactions that create a contract.
pub const CONTRACT_CREATION: &str = "contract creation";

/// Dapp/contract name used when the lookup page carries no specific title.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Gas cost of a plain value transfer.
pub const SIMPLE_TRANSFER_GAS: u64 = 21_000;

/// Lowercase, trimmed form of an address. All joins and lookups go through this.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Human-readable label of a contract address, one row of the label table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLabel {
    pub dapp: String,
    pub contract: String,
    pub address: String,
}

impl AddressLabel {
    pub fn new(address: &str, dapp: impl Into<String>, contract: impl Into<String>) -> Self {
        AddressLabel {
            dapp: dapp.into(),
            contract: contract.into(),
            address: normalize_address(address),
        }
    }

    /// Whether this label names a dapp (as opposed to the `Unknown` placeholder).
    pub fn is_known(&self) -> bool {
        self.dapp != UNKNOWN_LABEL
    }
}

/// Gas used by a single transaction, keyed by destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionGasRecord {
    /// Normalized destination, or [`CONTRACT_CREATION`].
    pub to: String,
    pub gas_used: u64,
}

impl TransactionGasRecord {
    /// Build a record from a raw `to` field; an absent `to` is a contract creation.
    pub fn new(to: Option<&str>, gas_used: u64) -> Self {
        let to = match to {
            Some(addr) if !addr.trim().is_empty() => normalize_address(addr),
            _ => CONTRACT_CREATION.to_string(),
        };
        TransactionGasRecord { to, gas_used }
    }

    pub fn contract_creation(gas_used: u64) -> Self {
        Self::new(None, gas_used)
    }

    pub fn is_contract_creation(&self) -> bool {
        self.to == CONTRACT_CREATION
    }
}

/// Gas and transaction count per destination address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressGasAggregate {
    pub to: String,
    pub gas_used: u64,
    pub count: u64,
}

/// An address aggregate joined to its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledAggregate {
    pub to: String,
    pub dapp: String,
    pub contract: String,
    pub gas_used: u64,
    pub count: u64,
}

/// Gas and transaction count per dapp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DappGasAggregate {
    pub dapp: String,
    pub gas_used: u64,
    pub count: u64,
}

/// Share of total block gas. `Undefined` when the block used no gas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Ratio {
    Defined(f64),
    Undefined,
}

impl Ratio {
    pub fn of(part: u64, total: u64) -> Ratio {
        if total == 0 {
            Ratio::Undefined
        } else {
            Ratio::Defined(part as f64 / total as f64)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Ratio::Defined(v) => Some(*v),
            Ratio::Undefined => None,
        }
    }
}

impl std::fmt::Display for Ratio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ratio::Defined(v) => write!(f, "{:.2}%", v * 100.0),
            Ratio::Undefined => write!(f, "undefined"),
        }
    }
}

/// Gas attribution of one block against its total gas used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub total_gas: u64,
    pub simple_transfer_gas: u64,
    pub dapp_gas: u64,
    pub simple_transfer: Ratio,
    pub dapp: Ratio,
    pub combined: Ratio,
}

impl Coverage {
    pub fn attributed_gas(&self) -> u64 {
        self.simple_transfer_gas + self.dapp_gas
    }

    /// Block gas not covered by either bucket.
    pub fn unattributed_gas(&self) -> u64 {
        self.total_gas.saturating_sub(self.attributed_gas())
    }
}

/// Full attribution result for one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockAttribution {
    pub block_number: u64,
    /// Transactions in the block.
    pub tx_count: u64,
    /// Gas records the source returned; lower than `tx_count` when traces failed.
    pub record_count: u64,
    pub base_fee_per_gas: Option<u64>,
    pub by_address: Vec<AddressGasAggregate>,
    pub by_dapp: Vec<DappGasAggregate>,
    pub simple_transfer_count: u64,
    pub coverage: Coverage,
}

impl BlockAttribution {
    /// Wei burned by `gas` at this block's base fee, when known.
    pub fn burned_wei(&self, gas: u64) -> Option<u128> {
        self.base_fee_per_gas
            .map(|fee| u128::from(gas) * u128::from(fee))
    }
}
