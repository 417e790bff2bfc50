// Keypool — Credential data models
//
// SECURITY: The `secret` field is intentionally private. It is never
// included in Debug output, log messages, or the status snapshot.
// The gateway reads it only through `Checkout` when building a request.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Health state of a single credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    Active,
    RateLimited,
    ErrorCooldown,
    /// Manually retired; only an explicit reset brings it back.
    Exhausted,
}

impl fmt::Display for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CredentialState::Active => "active",
            CredentialState::RateLimited => "rate_limited",
            CredentialState::ErrorCooldown => "error_cooldown",
            CredentialState::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

/// How outcomes translate into state transitions.
#[derive(Debug, Clone)]
pub struct FailurePolicy {
    /// Cooldown applied after a rate limit when the provider gives no usable hint.
    pub rate_limit_cooldown: Duration,
    /// Cooldown applied once `error_threshold` consecutive errors accumulate.
    pub error_cooldown: Duration,
    pub error_threshold: u32,
    /// Maximum number of characters kept in `last_error`.
    pub last_error_max_len: usize,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            rate_limit_cooldown: Duration::seconds(60),
            error_cooldown: Duration::seconds(30),
            error_threshold: 3,
            last_error_max_len: 200,
        }
    }
}

/// One upstream credential and its health state.
#[derive(Clone)]
pub struct CredentialRecord {
    identity: String,
    /// The bearer token. Never printed, logged, or shown by Debug.
    secret: Zeroizing<String>,
    pub state: CredentialState,
    pub last_used_at: Option<DateTime<Utc>>,
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub last_error: Option<String>,
}

impl CredentialRecord {
    /// Create a fresh ACTIVE record.
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: Zeroizing::new(secret.into()),
            state: CredentialState::Active,
            last_used_at: None,
            rate_limit_reset_at: None,
            cooldown_until: None,
            consecutive_errors: 0,
            total_attempts: 0,
            total_successes: 0,
            last_error: None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Access the raw bearer token.
    pub(crate) fn secret(&self) -> &Zeroizing<String> {
        &self.secret
    }

    /// Successes over attempts, 0.0 before the first attempt.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.total_successes as f64 / self.total_attempts as f64
        }
    }

    /// ACTIVE with no pending cooldown or reset timestamp in the future.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.state == CredentialState::Active
            && self.cooldown_until.map_or(true, |t| t <= now)
            && self.rate_limit_reset_at.map_or(true, |t| t <= now)
    }

    pub fn mark_attempt(&mut self, now: DateTime<Utc>) {
        self.last_used_at = Some(now);
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.total_attempts += 1;
        self.total_successes += 1;
        self.consecutive_errors = 0;
        self.last_used_at = Some(now);
    }

    /// Move to RATE_LIMITED until `reset_at`. Clears any error cooldown.
    pub fn record_rate_limit(&mut self, reset_at: DateTime<Utc>) {
        self.total_attempts += 1;
        if self.state == CredentialState::Exhausted {
            return;
        }
        self.state = CredentialState::RateLimited;
        self.rate_limit_reset_at = Some(reset_at);
        self.cooldown_until = None;
    }

    /// Count a failed call. Returns true when this error put the record
    /// into ERROR_COOLDOWN.
    ///
    /// Only an ACTIVE record can enter cooldown, so errors from calls that
    /// were already in flight never reschedule it and a rate limit is never
    /// overwritten by an error cooldown.
    pub fn record_error(
        &mut self,
        detail: &str,
        now: DateTime<Utc>,
        policy: &FailurePolicy,
    ) -> bool {
        self.total_attempts += 1;
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.last_error = Some(truncate_detail(detail, policy.last_error_max_len));

        if self.consecutive_errors >= policy.error_threshold
            && self.state == CredentialState::Active
        {
            self.state = CredentialState::ErrorCooldown;
            self.cooldown_until = Some(deadline(now, policy.error_cooldown));
            self.rate_limit_reset_at = None;
            return true;
        }
        false
    }

    pub(crate) fn recover_from_rate_limit(&mut self) {
        self.state = CredentialState::Active;
        self.rate_limit_reset_at = None;
    }

    pub(crate) fn recover_from_cooldown(&mut self) {
        self.state = CredentialState::Active;
        self.cooldown_until = None;
        self.consecutive_errors = 0;
    }

    /// Force back to ACTIVE, clearing error count, timestamps and last error.
    pub fn reset(&mut self) {
        self.state = CredentialState::Active;
        self.consecutive_errors = 0;
        self.cooldown_until = None;
        self.rate_limit_reset_at = None;
        self.last_error = None;
    }

    /// Take the record out of rotation until the next reset.
    pub fn disable(&mut self) {
        self.state = CredentialState::Exhausted;
        self.cooldown_until = None;
        self.rate_limit_reset_at = None;
    }

    /// Build the secret-free status view.
    pub fn status(&self, now: DateTime<Utc>) -> CredentialStatus {
        CredentialStatus {
            identity: self.identity.clone(),
            state: self.state,
            success_rate: self.success_rate(),
            total_attempts: self.total_attempts,
            total_successes: self.total_successes,
            consecutive_errors: self.consecutive_errors,
            last_used_at: self.last_used_at,
            rate_limit_reset_at: self.rate_limit_reset_at,
            cooldown_until: self.cooldown_until,
            last_error: self.last_error.clone(),
            available: self.is_available(now),
        }
    }
}

/// Custom Debug implementation that NEVER reveals the secret.
impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("identity", &self.identity)
            .field("secret", &"[REDACTED]")
            .field("state", &self.state)
            .field("last_used_at", &self.last_used_at)
            .field("rate_limit_reset_at", &self.rate_limit_reset_at)
            .field("cooldown_until", &self.cooldown_until)
            .field("consecutive_errors", &self.consecutive_errors)
            .field("total_attempts", &self.total_attempts)
            .field("total_successes", &self.total_successes)
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Per-credential view for the status surface. Never contains the secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub identity: String,
    pub state: CredentialState,
    pub success_rate: f64,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub consecutive_errors: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub available: bool,
}

/// `now + delta`, saturating at the latest representable instant.
pub(crate) fn deadline(now: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) fn truncate_detail(detail: &str, max_len: usize) -> String {
    detail.chars().take(max_len).collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_debug_redacts_secret() {
        let record = CredentialRecord::new("GROQ_API_KEY", "gsk_super_secret_12345");
        let debug_output = format!("{:?}", record);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(
            !debug_output.contains("gsk_super_secret_12345"),
            "Debug output must NEVER contain the raw secret"
        );
    }

    #[test]
    fn test_status_json_has_no_secret() {
        let record = CredentialRecord::new("GROQ_API_KEY", "gsk_hidden");
        let json = serde_json::to_string(&record.status(Utc::now())).unwrap();
        assert!(!json.contains("gsk_hidden"));
        assert!(!json.contains("secret"), "Status JSON must not carry a secret field");
    }

    #[test]
    fn test_success_rate() {
        let mut record = CredentialRecord::new("a", "s");
        assert_eq!(record.success_rate(), 0.0, "Zero attempts must report 0.0");

        let now = Utc::now();
        record.record_success(now);
        record.record_error("HTTP 500", now, &FailurePolicy::default());
        record.record_success(now);
        record.record_success(now);
        assert_eq!(record.total_attempts, 4);
        assert!((record.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_resets_consecutive_errors() {
        let policy = FailurePolicy {
            error_threshold: 10,
            ..FailurePolicy::default()
        };
        let now = Utc::now();
        let mut record = CredentialRecord::new("a", "s");
        for _ in 0..7 {
            record.record_error("boom", now, &policy);
        }
        assert_eq!(record.consecutive_errors, 7);

        record.record_success(now);
        assert_eq!(record.consecutive_errors, 0);
        assert_eq!(record.last_used_at, Some(now));
    }

    #[test]
    fn test_cooldown_entered_exactly_once() {
        let policy = FailurePolicy::default();
        let now = Utc::now();
        let mut record = CredentialRecord::new("a", "s");

        assert!(!record.record_error("e1", now, &policy));
        assert!(!record.record_error("e2", now, &policy));
        assert!(record.record_error("e3", now, &policy), "Third error enters cooldown");
        let scheduled = record.cooldown_until;
        assert_eq!(scheduled, Some(now + policy.error_cooldown));

        let later = now + Duration::seconds(5);
        assert!(!record.record_error("e4", later, &policy), "Cooldown is not rescheduled");
        assert_eq!(record.cooldown_until, scheduled);
        assert_eq!(record.state, CredentialState::ErrorCooldown);
    }

    #[test]
    fn test_rate_limit_clears_cooldown_and_takes_precedence() {
        let policy = FailurePolicy::default();
        let now = Utc::now();
        let mut record = CredentialRecord::new("a", "s");
        record.record_error("e1", now, &policy);
        record.record_error("e2", now, &policy);

        let reset_at = now + Duration::seconds(60);
        record.record_rate_limit(reset_at);
        assert_eq!(record.state, CredentialState::RateLimited);
        assert_eq!(record.rate_limit_reset_at, Some(reset_at));

        // An in-flight error landing afterwards must not flip it to cooldown
        record.record_error("late", now, &policy);
        assert_eq!(record.state, CredentialState::RateLimited);
        assert!(record.cooldown_until.is_none());
    }

    #[test]
    fn test_last_error_is_bounded() {
        let policy = FailurePolicy {
            last_error_max_len: 16,
            ..FailurePolicy::default()
        };
        let mut record = CredentialRecord::new("a", "s");
        record.record_error(&"x".repeat(500), Utc::now(), &policy);
        assert_eq!(record.last_error.as_deref().map(|e| e.chars().count()), Some(16));
    }

    #[test]
    fn test_reset_clears_everything() {
        let policy = FailurePolicy::default();
        let now = Utc::now();
        let mut record = CredentialRecord::new("a", "s");
        for _ in 0..3 {
            record.record_error("boom", now, &policy);
        }
        assert!(!record.is_available(now));

        record.reset();
        assert_eq!(record.state, CredentialState::Active);
        assert_eq!(record.consecutive_errors, 0);
        assert!(record.cooldown_until.is_none());
        assert!(record.rate_limit_reset_at.is_none());
        assert!(record.last_error.is_none());
        assert!(record.is_available(now));
    }

    #[test]
    fn test_disabled_record_stays_exhausted_on_rate_limit() {
        let mut record = CredentialRecord::new("a", "s");
        record.disable();
        record.record_rate_limit(Utc::now() + Duration::seconds(10));
        assert_eq!(record.state, CredentialState::Exhausted);
        assert_eq!(record.total_attempts, 1);
    }

    #[test]
    fn test_huge_error_cooldown_saturates_instead_of_overflowing() {
        let policy = FailurePolicy {
            error_cooldown: Duration::MAX,
            error_threshold: 1,
            ..FailurePolicy::default()
        };
        let mut record = CredentialRecord::new("K", "s");

        assert!(record.record_error("HTTP 500", Utc::now(), &policy));
        assert_eq!(record.state, CredentialState::ErrorCooldown);
        assert_eq!(record.cooldown_until, Some(DateTime::<Utc>::MAX_UTC));
        assert!(!record.is_available(Utc::now()));
    }
}
