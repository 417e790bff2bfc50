// Keypool — Upstream Module
//
// Everything that touches the chat-completion provider: the wire types, the
// HTTP transport seam, and the executor that turns one call into an Outcome
// and applies it to the credential that made it.

mod error;
mod executor;
mod protocol;
mod transport;

pub use error::UpstreamError;
pub use executor::{classify, parse_reset_hint, Outcome, RequestExecutor};
pub use protocol::{extract_structured, ChatMessage, ChatRequest};
pub use transport::{HttpReply, HttpTransport, Transport};

#[cfg(test)]
pub(crate) use transport::mock;
