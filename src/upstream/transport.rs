// Keypool — Upstream Transport
//
// The only place outbound HTTP happens. The executor talks to the provider
// through the `Transport` trait so tests can script replies per credential
// without a network, the same way the key provider is mocked for tests.

use std::time::Duration;

use async_trait::async_trait;

use super::protocol::ChatRequest;
use super::UpstreamError;

/// The raw pieces of an HTTP reply the executor classifies.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    /// Value of the provider's rate-limit reset header, if sent.
    pub reset_hint: Option<String>,
    pub body: String,
}

/// Abstraction over one outbound chat-completion call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `request` authorized with `secret` as a bearer token.
    async fn send(&self, secret: &str, request: &ChatRequest) -> Result<HttpReply, UpstreamError>;
}

// ─── reqwest Implementation ──────────────────────────────────────────────────

/// Production transport backed by a shared `reqwest::Client`.
/// Every call is bounded by the client-wide timeout.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    reset_header: String,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        reset_header: impl Into<String>,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::ClientBuild(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            reset_header: reset_header.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, secret: &str, request: &ChatRequest) -> Result<HttpReply, UpstreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(secret)
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let reset_hint = response
            .headers()
            .get(self.reset_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        Ok(HttpReply {
            status,
            reset_hint,
            body,
        })
    }
}

// ─── Scripted Mock for Testing ───────────────────────────────────────────────


// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;

    #[test]
    fn test_http_transport_builds() {
        let transport = HttpTransport::new(
            "https://api.groq.com/openai/v1/chat/completions",
            Duration::from_secs(30),
            "x-ratelimit-reset-requests",
        )
        .unwrap();
        assert!(transport.endpoint().ends_with("/chat/completions"));
    }

    #[tokio::test]
    async fn test_scripted_queue_then_standing_reply() {
        let transport = ScriptedTransport::new()
            .then("k", status(500))
            .always("k", completion("{}"));
        let req = ChatRequest::new("p", "m", 0.7, 100);

        assert_eq!(transport.send("k", &req).await.unwrap().status, 500);
        assert_eq!(transport.send("k", &req).await.unwrap().status, 200);
        assert_eq!(transport.send("k", &req).await.unwrap().status, 200);
        assert!(transport.send("unknown", &req).await.is_err());
        assert_eq!(transport.secrets_called().len(), 4);
    }
}
