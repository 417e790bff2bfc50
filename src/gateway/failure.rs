// Keypool — Gateway failure
//
// The only error a caller ever sees from `Gateway::request`. Individual
// attempt failures are absorbed into credential state; this is reported
// once the whole retry budget is spent.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayFailure {
    #[error("No credential became available within {attempts} attempts")]
    NoCredentialAvailable { attempts: u32 },

    #[error("All attempts failed ({attempts} allowed); last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl GatewayFailure {
    /// The attempt ceiling that was spent.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::NoCredentialAvailable { attempts } | Self::RetriesExhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}
