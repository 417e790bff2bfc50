// Keypool — HTTP transport integration tests
//
// Drives the real reqwest transport against a local wiremock server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use keypool::config::GatewayConfig;
use keypool::gateway::{Gateway, RequestOptions};
use keypool::pool::{CredentialRecord, CredentialState, CredentialStore};
use keypool::upstream::{ChatRequest, HttpTransport, Transport, UpstreamError};

const RESET_HEADER: &str = "x-ratelimit-reset-requests";

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

fn transport(server: &MockServer, timeout: Duration) -> HttpTransport {
    HttpTransport::new(
        format!("{}/openai/v1/chat/completions", server.uri()),
        timeout,
        RESET_HEADER,
    )
    .unwrap()
}

#[tokio::test]
async fn test_sends_bearer_and_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "llama-3.3-70b-versatile",
            "max_tokens": 2000,
            "messages": [{ "role": "system", "content": "Explain tides" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(r#"{"ok": true}"#)))
        .expect(1)
        .mount(&server)
        .await;

    let request = ChatRequest::new("Explain tides", "llama-3.3-70b-versatile", 0.7, 2000);
    let reply = transport(&server, Duration::from_secs(5))
        .send("sk-test", &request)
        .await
        .unwrap();

    assert_eq!(reply.status, 200);
    assert!(reply.reset_hint.is_none());
    assert!(reply.body.contains("chatcmpl-1"));
}

#[tokio::test]
async fn test_rate_limit_reply_carries_reset_hint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header(RESET_HEADER, "2m59.56s")
                .set_body_string("Rate limit reached"),
        )
        .mount(&server)
        .await;

    let request = ChatRequest::new("p", "m", 0.7, 10);
    let reply = transport(&server, Duration::from_secs(5))
        .send("sk-test", &request)
        .await
        .unwrap();

    assert_eq!(reply.status, 429);
    assert_eq!(reply.reset_hint.as_deref(), Some("2m59.56s"));
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("{}"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let request = ChatRequest::new("p", "m", 0.7, 10);
    let result = transport(&server, Duration::from_millis(200))
        .send("sk-test", &request)
        .await;

    assert!(
        matches!(result, Err(UpstreamError::Timeout)),
        "expected timeout, got {:?}",
        result
    );
}

#[tokio::test]
async fn test_gateway_rotates_past_rate_limited_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer sk-one"))
        .respond_with(ResponseTemplate::new(429).insert_header(RESET_HEADER, "90s"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer sk-two"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion(r#"{"title": "Tides", "points": 3}"#)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = CredentialStore::new(vec![
        CredentialRecord::new("GROQ_API_KEY", "sk-one"),
        CredentialRecord::new("GROQ_API_KEY2", "sk-two"),
    ])
    .unwrap();
    let gateway = Gateway::with_parts(
        GatewayConfig::default(),
        store,
        Arc::new(transport(&server, Duration::from_secs(5))),
        None,
    );

    let reply = gateway.request("Explain tides", &RequestOptions::new()).await.unwrap();
    assert_eq!(reply["title"], "Tides");
    assert_eq!(reply["points"], 3);

    let status = gateway.status();
    assert_eq!(status.stats.rate_limit_hits, 1);
    assert_eq!(status.stats.key_switches, 1);
    assert_eq!(status.credentials[0].state, CredentialState::RateLimited);

    let reset_at = status.credentials[0].rate_limit_reset_at.unwrap();
    let wait = reset_at - status.timestamp;
    assert!(
        wait > chrono::Duration::seconds(80) && wait <= chrono::Duration::seconds(90),
        "Reset hint should be honored, got {:?}",
        wait
    );
}
