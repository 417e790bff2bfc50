// Keypool — Gateway Module
//
// The public entry point. Combines credential selection and single-attempt
// execution in a retry loop with exponential backoff, keeps aggregate
// telemetry, and optionally fails over to a secondary provider.

mod failure;
mod options;
mod orchestrator;
mod telemetry;

pub use failure::GatewayFailure;
pub use options::RequestOptions;
pub use orchestrator::{FallbackRoute, Gateway};
pub use telemetry::{GatewayStats, GatewayStatus};
