// Keypool — Upstream error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else {
            // without_url() keeps the endpoint out of stored error text
            UpstreamError::Network(e.without_url().to_string())
        }
    }
}
