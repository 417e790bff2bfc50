// Keypool — Top-level error types
//
// Aggregates the module errors into a single enum for the application
// boundary (CLI and gateway construction).

use thiserror::Error;

/// Top-level error type for all Keypool operations.
#[derive(Debug, Error)]
pub enum KeypoolError {
    #[error("Pool error: {0}")]
    Pool(#[from] crate::pool::PoolError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] crate::upstream::UpstreamError),

    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("RPC error: {0}")]
    Rpc(#[from] crate::rpc::RpcError),

    #[error("Request failed: {0}")]
    Gateway(#[from] crate::gateway::GatewayFailure),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, KeypoolError>;
