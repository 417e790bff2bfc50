// Keypool — RPC Module
//
// Exposes a shared `Gateway` to local processes as newline-delimited
// JSON-RPC 2.0 over a Unix domain socket.

mod error;
pub mod protocol;
mod uds;

pub use error::RpcError;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use uds::{process_request, RpcServer};
