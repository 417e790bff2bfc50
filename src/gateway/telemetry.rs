// Keypool — Gateway telemetry
//
// Process-wide counters plus the read-only status snapshot. Nothing here
// ever sees a credential secret.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pool::CredentialStatus;

/// Lock-free aggregate counters.
#[derive(Debug, Default)]
pub(crate) struct Telemetry {
    pub total_requests: AtomicU64,
    pub total_successes: AtomicU64,
    pub total_failures: AtomicU64,
    pub total_attempts: AtomicU64,
    pub key_switches: AtomicU64,
    pub rate_limit_hits: AtomicU64,
    pub fallback_attempts: AtomicU64,
    pub fallback_successes: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Telemetry {
    pub fn snapshot(&self) -> GatewayStats {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        GatewayStats {
            total_requests: read(&self.total_requests),
            total_successes: read(&self.total_successes),
            total_failures: read(&self.total_failures),
            total_attempts: read(&self.total_attempts),
            key_switches: read(&self.key_switches),
            rate_limit_hits: read(&self.rate_limit_hits),
            fallback_attempts: read(&self.fallback_attempts),
            fallback_successes: read(&self.fallback_successes),
        }
    }
}

/// Aggregate counters at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayStats {
    /// Logical `request()` calls.
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Outbound calls to the primary provider, sticky attempts included.
    pub total_attempts: u64,
    /// Times the gateway moved on after a rate limit.
    pub key_switches: u64,
    pub rate_limit_hits: u64,
    pub fallback_attempts: u64,
    pub fallback_successes: u64,
}

/// Full status surface: counters plus one entry per credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayStatus {
    pub timestamp: DateTime<Utc>,
    pub stats: GatewayStats,
    pub credentials: Vec<CredentialStatus>,
}
