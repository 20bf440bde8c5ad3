//! Error types for the library modules.
//!
//! Library code returns these `thiserror` types; the collector, storage and
//! CLI layers propagate them through `anyhow`.

use thiserror::Error;

/// Errors talking to the node's JSON-RPC endpoint.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("RPC status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("RPC error {code} from {method}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("invalid RPC response for {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("missing result for {0}")]
    MissingResult(String),
}

impl RpcError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::RequestFailed(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            RpcError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Errors fetching an address page from the lookup service.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("lookup request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("lookup returned status {0}")]
    Status(u16),

    #[error("lookup service rate limited the request")]
    RateLimited,
}

impl LookupError {
    pub fn is_transient(&self) -> bool {
        match self {
            LookupError::RequestFailed(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LookupError::Status(status) => *status == 429 || *status == 403 || *status >= 500,
            LookupError::RateLimited => true,
        }
    }
}

/// Errors reading or appending the label table.
#[derive(Error, Debug)]
pub enum LabelError {
    #[error("label table I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("label table CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Attribution produced a state that cannot come from a consistent block.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AttributionError {
    #[error("attributed gas {attributed} exceeds block gas used {total}")]
    GasExceedsTotal { attributed: u64, total: u64 },
}
