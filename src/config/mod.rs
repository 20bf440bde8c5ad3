//! Configuration load and validation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::model::SIMPLE_TRANSFER_GAS;
use crate::util::RetryPolicy;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub labeler: LabelerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Ethereum JSON-RPC URL (e.g. http://127.0.0.1:8545).
    pub rpc_url: String,
    /// Optional RPC username (for HTTP basic auth).
    pub rpc_user: Option<String>,
    /// Optional RPC password.
    pub rpc_password: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl NodeConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_base_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelerConfig {
    /// Address page prefix; the address is appended as the last path segment.
    #[serde(default = "default_lookup_base_url")]
    pub base_url: String,
    /// Pause between successive lookups, in milliseconds.
    #[serde(default = "default_lookup_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_lookup_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// User-Agent rotation set.
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

impl LabelerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_base_delay_ms)
    }
}

impl Default for LabelerConfig {
    fn default() -> Self {
        LabelerConfig {
            base_url: default_lookup_base_url(),
            delay_ms: default_lookup_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_lookup_retry_base_delay_ms(),
            user_agents: default_user_agents(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Label table CSV (`dapp,contract,address`).
    #[serde(default = "default_labels_path")]
    pub labels_path: PathBuf,
    /// SQLite database for saved block attributions.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            labels_path: default_labels_path(),
            db_path: default_db_path(),
        }
    }
}

/// Where per-transaction gas figures come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// One `debug_traceBlockByNumber` call with the call tracer.
    Trace,
    /// One `eth_getTransactionReceipt` call per transaction.
    Receipt,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Trace => "trace",
            SourceMode::Receipt => "receipt",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributionConfig {
    #[serde(default = "default_mode")]
    pub mode: SourceMode,
    /// Gas used by a plain value transfer.
    #[serde(default = "default_simple_transfer_gas")]
    pub simple_transfer_gas: u64,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        AttributionConfig {
            mode: default_mode(),
            simple_transfer_gas: default_simple_transfer_gas(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_lookup_base_url() -> String {
    "https://etherscan.io/address".to_string()
}

fn default_lookup_delay_ms() -> u64 {
    2000
}

fn default_lookup_retry_base_delay_ms() -> u64 {
    2000
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_labels_path() -> PathBuf {
    PathBuf::from("labels.csv")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("dapp_gas.db")
}

fn default_mode() -> SourceMode {
    SourceMode::Trace
}

fn default_simple_transfer_gas() -> u64 {
    SIMPLE_TRANSFER_GAS
}

impl Config {
    /// Load and validate config from a TOML file.
    pub fn load(path: &Path) -> Result<Config> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Config::from_toml(&data)
    }

    pub fn from_toml(data: &str) -> Result<Config> {
        let config: Config = toml::from_str(data).context("invalid config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.node.rpc_url.is_empty() {
            anyhow::bail!("node.rpc_url must be non-empty");
        }
        if self.labeler.base_url.is_empty() {
            anyhow::bail!("labeler.base_url must be non-empty");
        }
        if self.labeler.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            anyhow::bail!("labeler.user_agents must contain at least one entry");
        }
        Ok(())
    }
}

/// Default config, printed by the `config` subcommand.
pub fn default_config_toml() -> &'static str {
    r#"
# Ethereum execution node JSON-RPC. Trace mode needs the debug namespace enabled.
[node]
rpc_url = "http://127.0.0.1:8545"
# rpc_user = "user"
# rpc_password = "pass"
timeout_secs = 30
max_retries = 3
retry_base_delay_ms = 500

# Block explorer address pages used to label contracts.
[labeler]
base_url = "https://etherscan.io/address"
delay_ms = 2000
timeout_secs = 30
max_retries = 3
retry_base_delay_ms = 2000
# user_agents = ["Mozilla/5.0 ..."]

[storage]
labels_path = "labels.csv"
db_path = "dapp_gas.db"

[attribution]
# "trace" (debug_traceBlockByNumber) or "receipt" (one receipt per transaction)
mode = "trace"
simple_transfer_gas = 21000
"#
}
