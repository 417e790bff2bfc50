// Keypool — RPC Error Types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode response: {0}")]
    Json(#[from] serde_json::Error),
}
