// Keypool — Library root
//
// Credential pool gateway for rate-limited chat-completion APIs. Re-exports
// the pool, upstream, gateway, RPC, config, and CLI modules.

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod pool;
pub mod rpc;
pub mod upstream;

pub use config::GatewayConfig;
pub use error::{KeypoolError, Result};
pub use gateway::{Gateway, GatewayFailure, GatewayStatus, RequestOptions};
