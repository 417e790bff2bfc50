// Keypool — Gateway Orchestrator
//
// `Gateway::request` is the single public call. Each request optionally gets
// one sticky attempt on its assigned credential, then runs the rotation loop:
//
//   1. Check out the best available credential (nothing available: back off,
//      retry until the ceiling is spent).
//   2. Make one attempt through the executor.
//   3. Success returns immediately. A rate limit switches credentials with
//      no delay and no attempt consumed. Any other failure backs off
//      `base * 2^attempt` and consumes an attempt.
//
// When the loop gives up, the secondary provider (if configured) gets one
// try. It never touches pool records.
//
// No lock is held across an await: checkouts are owned copies and record
// updates go through short `CredentialStore::update` sections.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::Instrument;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::{ConfigError, FallbackConfig, GatewayConfig};
use crate::pool::{truncate_detail, CredentialStore};
use crate::upstream::{classify, ChatRequest, HttpTransport, Outcome, RequestExecutor, Transport};

use super::failure::GatewayFailure;
use super::options::RequestOptions;
use super::telemetry::{bump, GatewayStatus, Telemetry};

/// Secondary provider used once per request after the pool gives up.
pub struct FallbackRoute {
    transport: Arc<dyn Transport>,
    secret: Zeroizing<String>,
    model: String,
}

impl FallbackRoute {
    pub fn new(transport: Arc<dyn Transport>, secret: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            transport,
            secret: Zeroizing::new(secret.into()),
            model: model.into(),
        }
    }

    /// Build from config, reading the credential from the named variable.
    pub fn from_config(config: &FallbackConfig, reset_header: &str) -> crate::Result<Self> {
        let secret = std::env::var(&config.credential_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingFallbackCredential(config.credential_env.clone()))?;
        let transport = HttpTransport::new(
            config.endpoint.as_str(),
            Duration::from_secs(config.timeout_seconds),
            reset_header,
        )?;
        Ok(Self::new(Arc::new(transport), secret, config.model.as_str()))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for FallbackRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRoute")
            .field("model", &self.model)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// The credential pool gateway. Share it behind an `Arc`; every method
/// takes `&self`.
pub struct Gateway {
    config: GatewayConfig,
    store: CredentialStore,
    executor: RequestExecutor,
    fallback: Option<FallbackRoute>,
    telemetry: Telemetry,
}

impl Gateway {
    /// Production wiring: credentials from the environment, reqwest
    /// transports for the primary and (optional) secondary provider.
    pub fn new(config: GatewayConfig) -> crate::Result<Self> {
        config.validate()?;
        let store = CredentialStore::from_env(&config.credential_slots)?;
        let transport = HttpTransport::new(
            config.endpoint.as_str(),
            config.timeout(),
            config.reset_header.as_str(),
        )?;
        let fallback = match &config.fallback {
            Some(fb) => Some(FallbackRoute::from_config(fb, &config.reset_header)?),
            None => None,
        };

        tracing::info!(
            credentials = store.len(),
            fallback = fallback.is_some(),
            "Gateway initialized"
        );
        Ok(Self::with_parts(config, store, Arc::new(transport), fallback))
    }

    /// Assemble a gateway from already-built parts.
    pub fn with_parts(
        config: GatewayConfig,
        store: CredentialStore,
        transport: Arc<dyn Transport>,
        fallback: Option<FallbackRoute>,
    ) -> Self {
        let executor = RequestExecutor::new(transport, config.failure_policy());
        Self {
            config,
            store,
            executor,
            fallback,
            telemetry: Telemetry::default(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Send `prompt` and return the model's structured (JSON object) reply.
    pub async fn request(
        &self,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<Map<String, Value>, GatewayFailure> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("request", %request_id, tag = ?options.sequence_tag);
        self.run(prompt, options).instrument(span).await
    }

    async fn run(
        &self,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<Map<String, Value>, GatewayFailure> {
        bump(&self.telemetry.total_requests);
        let call = options.resolve(&self.config);
        let chat = ChatRequest::new(prompt, call.model.as_str(), call.temperature, call.max_tokens);

        if let Some(body) = self.try_sticky(options, &chat).await {
            return Ok(self.succeed(body));
        }

        let ceiling = call.retry_ceiling;
        // Rate-limit switches are free, but only pool_size times per attempt.
        let mut switches_left = self.store.len().saturating_mul(ceiling as usize);
        let mut attempt: u32 = 0;
        let mut last_error: Option<String> = None;

        while attempt < ceiling {
            let Some(checkout) = self.store.checkout(Utc::now()) else {
                tracing::warn!(attempt = attempt + 1, ceiling, "No credential available");
                if attempt + 1 >= ceiling {
                    break;
                }
                self.backoff(attempt).await;
                attempt += 1;
                continue;
            };

            match self.attempt(&checkout, &chat).await {
                Outcome::Success(body) => return Ok(self.succeed(body)),
                Outcome::RateLimited { .. } => {
                    bump(&self.telemetry.key_switches);
                    tracing::info!(credential = %checkout.identity(), "Switching credential after rate limit");
                    switches_left = switches_left.saturating_sub(1);
                    if switches_left == 0 {
                        attempt += 1;
                    }
                }
                Outcome::TransientError(detail) => {
                    let max_len = self.executor.policy().last_error_max_len;
                    last_error = Some(truncate_detail(&detail, max_len));
                    if attempt + 1 < ceiling {
                        self.backoff(attempt).await;
                    }
                    attempt += 1;
                }
            }
        }

        let failure = match last_error {
            Some(last_error) => GatewayFailure::RetriesExhausted {
                attempts: ceiling,
                last_error,
            },
            None => GatewayFailure::NoCredentialAvailable { attempts: ceiling },
        };

        if let Some(body) = self.try_fallback(&chat).await {
            return Ok(self.succeed(body));
        }

        bump(&self.telemetry.total_failures);
        tracing::error!(error = %failure, "Request failed");
        Err(failure)
    }

    /// One free attempt on the tag's assigned credential, when enabled.
    async fn try_sticky(&self, options: &RequestOptions, chat: &ChatRequest) -> Option<Map<String, Value>> {
        if !self.config.sticky_assignment {
            return None;
        }
        let tag = options.sequence_tag?;
        let checkout = self.store.checkout_sticky(tag, Utc::now())?;
        tracing::debug!(credential = %checkout.identity(), tag, "Sticky attempt");

        match self.attempt(&checkout, chat).await {
            Outcome::Success(body) => Some(body),
            _ => {
                tracing::info!(credential = %checkout.identity(), "Sticky attempt failed, rotating");
                None
            }
        }
    }

    async fn attempt(&self, checkout: &crate::pool::Checkout, chat: &ChatRequest) -> Outcome {
        bump(&self.telemetry.total_attempts);
        let outcome = self.executor.execute(&self.store, checkout, chat).await;
        if matches!(outcome, Outcome::RateLimited { .. }) {
            bump(&self.telemetry.rate_limit_hits);
        }
        outcome
    }

    async fn try_fallback(&self, chat: &ChatRequest) -> Option<Map<String, Value>> {
        let fallback = self.fallback.as_ref()?;
        bump(&self.telemetry.fallback_attempts);
        tracing::warn!(model = %fallback.model, "Pool exhausted, trying secondary provider");

        let request = chat.for_model(fallback.model.as_str());
        let reply = fallback.transport.send(&fallback.secret, &request).await;
        match classify(reply, Utc::now(), self.executor.policy()) {
            Outcome::Success(body) => {
                bump(&self.telemetry.fallback_successes);
                tracing::info!(model = %fallback.model, "Secondary provider succeeded");
                Some(body)
            }
            Outcome::RateLimited { .. } => {
                tracing::warn!(model = %fallback.model, "Secondary provider rate limited");
                None
            }
            Outcome::TransientError(detail) => {
                tracing::warn!(model = %fallback.model, "Secondary provider failed: {}", detail);
                None
            }
        }
    }

    fn succeed(&self, body: Map<String, Value>) -> Map<String, Value> {
        bump(&self.telemetry.total_successes);
        body
    }

    async fn backoff(&self, attempt: u32) {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.config.base_retry_delay().saturating_mul(factor);
        tracing::info!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
        tokio::time::sleep(delay).await;
    }

    /// Counters plus every credential's status. Never includes secrets.
    pub fn status(&self) -> GatewayStatus {
        let now = Utc::now();
        GatewayStatus {
            timestamp: now,
            stats: self.telemetry.snapshot(),
            credentials: self.store.statuses(now),
        }
    }

    /// Reset one credential by identity, or all when `identity` is `None`.
    /// Returns false only for an unknown identity.
    pub fn reset(&self, identity: Option<&str>) -> bool {
        match identity {
            Some(id) => self.store.reset(id),
            None => {
                self.store.reset_all();
                true
            }
        }
    }

    /// Take a credential out of rotation until it is reset.
    pub fn disable(&self, identity: &str) -> bool {
        self.store.disable(identity)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
