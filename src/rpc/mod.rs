//! Ethereum JSON-RPC client (read-only): sync status, blocks, traces and receipts.

use crate::config::NodeConfig;
use crate::error::RpcError;
use crate::util::{de_opt_quantity, de_quantity, to_quantity, RetryPolicy};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Block selector for `eth_getBlockByNumber`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    Latest,
    Number(u64),
}

impl BlockId {
    /// Parse `latest`, a decimal number, or a `0x` quantity.
    pub fn parse(s: &str) -> Option<BlockId> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Some(BlockId::Latest);
        }
        crate::util::parse_quantity(s).map(BlockId::Number)
    }

    fn param(&self) -> String {
        match self {
            BlockId::Latest => "latest".to_string(),
            BlockId::Number(n) => to_quantity(*n),
        }
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockId::Latest => write!(f, "latest"),
            BlockId::Number(n) => write!(f, "{}", n),
        }
    }
}

/// `eth_syncing` result: `false`, or a progress object passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Synced,
    Syncing(serde_json::Value),
}

/// `eth_getBlockByNumber` with full transactions (subset we need).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(deserialize_with = "de_quantity")]
    pub number: u64,
    #[serde(deserialize_with = "de_quantity")]
    pub gas_used: u64,
    #[serde(default, deserialize_with = "de_opt_quantity")]
    pub base_fee_per_gas: Option<u64>,
    #[serde(default)]
    pub transactions: Vec<BlockTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockTransaction {
    pub hash: String,
    #[serde(default)]
    pub to: Option<String>,
}

/// `eth_getTransactionReceipt` (subset we need).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(deserialize_with = "de_quantity")]
    pub gas_used: u64,
    #[serde(default)]
    pub contract_address: Option<String>,
}

/// One entry of a `debug_traceBlockByNumber` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub result: Option<CallFrame>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Top-level call frame from the call tracer. Nested calls are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    #[serde(rename = "type", default)]
    pub call_type: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(deserialize_with = "de_quantity")]
    pub gas_used: u64,
}

impl CallFrame {
    pub fn is_create(&self) -> bool {
        matches!(self.call_type.as_deref(), Some("CREATE") | Some("CREATE2"))
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// JSON-RPC client for one node endpoint.
pub struct NodeClient {
    client: reqwest::Client,
    rpc_url: String,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl NodeClient {
    pub fn new(config: &NodeConfig) -> anyhow::Result<Self> {
        Ok(NodeClient {
            client: build_http_client(config)?,
            rpc_url: config.rpc_url.clone(),
            retry: config.retry_policy(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Node sync status.
    pub async fn syncing(&self) -> Result<SyncStatus, RpcError> {
        let value: serde_json::Value = self.request("eth_syncing", serde_json::json!([])).await?;
        Ok(match value {
            serde_json::Value::Bool(false) | serde_json::Value::Null => SyncStatus::Synced,
            other => SyncStatus::Syncing(other),
        })
    }

    /// Block with full transaction objects; `None` when the node does not know it.
    pub async fn get_block(&self, id: BlockId) -> Result<Option<Block>, RpcError> {
        self.request_opt("eth_getBlockByNumber", serde_json::json!([id.param(), true]))
            .await
    }

    /// Call-tracer trace of every transaction in a block.
    pub async fn trace_block(&self, number: u64) -> Result<Vec<TraceEntry>, RpcError> {
        self.request(
            "debug_traceBlockByNumber",
            serde_json::json!([to_quantity(number), { "tracer": "callTracer" }]),
        )
        .await
    }

    pub async fn get_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, RpcError> {
        self.request_opt("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, RpcError> {
        self.request_opt(method, params)
            .await?
            .ok_or_else(|| RpcError::MissingResult(method.to_string()))
    }

    /// Call `method`, treating a `null` result as `None`.
    async fn request_opt<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, RpcError> {
        let value = self
            .retry
            .run(method, RpcError::is_transient, || self.call_once(method, &params))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| RpcError::InvalidResponse {
                method: method.to_string(),
                reason: e.to_string(),
            })
    }

    async fn call_once(
        &self,
        method: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        tracing::trace!(method, id, "rpc request");
        let resp = self.client.post(&self.rpc_url).json(&body).send().await?;
        let status = resp.status();
        let body_bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(RpcError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body_bytes).trim().to_string(),
            });
        }
        let json: JsonRpcResponse =
            serde_json::from_slice(&body_bytes).map_err(|e| RpcError::InvalidResponse {
                method: method.to_string(),
                reason: e.to_string(),
            })?;
        if let Some(err) = json.error {
            return Err(RpcError::Rpc {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            });
        }
        Ok(json.result.unwrap_or(serde_json::Value::Null))
    }
}

fn build_http_client(config: &NodeConfig) -> anyhow::Result<reqwest::Client> {
    let mut builder =
        reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
    if config.rpc_user.is_some() || config.rpc_password.is_some() {
        let u = config.rpc_user.as_deref().unwrap_or("");
        let p = config.rpc_password.as_deref().unwrap_or("");
        let auth = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", u, p));
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Basic {}", auth))?,
        );
        builder = builder.default_headers(headers);
    }
    Ok(builder.build()?)
}
