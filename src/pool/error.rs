// Keypool — Pool error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("No credentials configured: set at least one credential slot environment variable")]
    NoCredentialsConfigured,

    #[error("Duplicate credential identity: {0}")]
    DuplicateIdentity(String),
}
