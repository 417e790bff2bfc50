// Keypool — Request Executor
//
// Performs exactly one outbound call with one checked-out credential,
// classifies the result into an `Outcome`, and applies that outcome to the
// credential's record. The orchestrator branches on the returned Outcome;
// nothing here retries.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

use crate::pool::{deadline, Checkout, CredentialStore, FailurePolicy};

use super::protocol::{extract_structured, ChatRequest};
use super::transport::{HttpReply, Transport};
use super::UpstreamError;

/// HTTP status the provider uses for rate limiting.
const RATE_LIMIT_STATUS: u16 = 429;

/// Result of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 2xx and the model's content parsed into a JSON object.
    Success(Map<String, Value>),
    /// 429; the credential is unusable until `reset_at`.
    RateLimited { reset_at: DateTime<Utc> },
    /// Any other status, a network failure, or an unusable body.
    TransientError(String),
}

/// Map a transport result onto an Outcome. Pure; does not touch any record.
pub fn classify(
    reply: Result<HttpReply, UpstreamError>,
    now: DateTime<Utc>,
    policy: &FailurePolicy,
) -> Outcome {
    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => return Outcome::TransientError(format!("Request exception: {}", e)),
    };

    if reply.status == RATE_LIMIT_STATUS {
        let reset_at = reply
            .reset_hint
            .as_deref()
            .and_then(|hint| parse_reset_hint(hint, now))
            .unwrap_or_else(|| deadline(now, policy.rate_limit_cooldown));
        return Outcome::RateLimited { reset_at };
    }

    if (200..300).contains(&reply.status) {
        return match extract_structured(&reply.body) {
            Ok(map) => Outcome::Success(map),
            Err(detail) => Outcome::TransientError(detail),
        };
    }

    Outcome::TransientError(format!("HTTP {}: {}", reply.status, reply.body))
}

/// Interpret a provider reset hint.
///
/// Accepts an integer Unix timestamp in seconds, or a relative duration in
/// the provider's `1h2m3.5s` / `250ms` style. Returns `None` when the hint is
/// unparseable or does not lie in the future.
pub fn parse_reset_hint(hint: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let hint = hint.trim();
    if hint.is_empty() {
        return None;
    }

    let reset_at = if hint.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = hint.parse().ok()?;
        DateTime::from_timestamp(secs, 0)?
    } else {
        now.checked_add_signed(parse_relative(hint)?)?
    };

    (reset_at > now).then_some(reset_at)
}

fn parse_relative(s: &str) -> Option<Duration> {
    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut rest = s;
    let mut total_ms = 0f64;

    while !rest.is_empty() {
        let num_end = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if num_end == 0 {
            return None;
        }
        let value: f64 = rest[..num_end].parse().ok()?;
        rest = &rest[num_end..];

        let unit_end = rest.find(is_number).unwrap_or(rest.len());
        let factor = match &rest[..unit_end] {
            "h" => 3_600_000.0,
            "m" => 60_000.0,
            "s" => 1_000.0,
            "ms" => 1.0,
            _ => return None,
        };
        rest = &rest[unit_end..];
        total_ms += value * factor;
    }

    if !total_ms.is_finite() || total_ms > i64::MAX as f64 {
        return None;
    }
    Some(Duration::milliseconds(total_ms.round() as i64))
}

/// Runs single attempts and feeds their outcome back into the pool.
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    policy: FailurePolicy,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, policy: FailurePolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &FailurePolicy {
        &self.policy
    }

    /// Make one call with `checkout` and record what happened.
    pub async fn execute(
        &self,
        store: &CredentialStore,
        checkout: &Checkout,
        request: &ChatRequest,
    ) -> Outcome {
        let reply = self.transport.send(checkout.secret(), request).await;
        let now = Utc::now();
        let outcome = classify(reply, now, &self.policy);
        self.apply(store, checkout, &outcome, now);
        outcome
    }

    fn apply(&self, store: &CredentialStore, checkout: &Checkout, outcome: &Outcome, now: DateTime<Utc>) {
        let credential = checkout.identity();
        match outcome {
            Outcome::Success(_) => {
                store.update(checkout.index(), |r| r.record_success(now));
                tracing::info!(credential = %credential, "Successful upstream call");
            }
            Outcome::RateLimited { reset_at } => {
                store.update(checkout.index(), |r| r.record_rate_limit(*reset_at));
                tracing::warn!(credential = %credential, reset_at = %reset_at, "Rate limit hit");
            }
            Outcome::TransientError(detail) => {
                let (entered_cooldown, errors) = store.update(checkout.index(), |r| {
                    (r.record_error(detail, now, &self.policy), r.consecutive_errors)
                });
                tracing::error!(credential = %credential, errors, "Upstream call failed: {}", detail);
                if entered_cooldown {
                    tracing::warn!(
                        credential = %credential,
                        errors,
                        cooldown_secs = self.policy.error_cooldown.num_seconds(),
                        "Credential put on cooldown"
                    );
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
