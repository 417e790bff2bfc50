// Keypool — Selection Policy
//
// Picks the credential the next call should use. Timer-based recovery is
// evaluated lazily here rather than by a background task: a RATE_LIMITED or
// ERROR_COOLDOWN record whose deadline has passed is moved back to ACTIVE at
// the moment it is selected.
//
// Preference, each tier scanned in registration order:
//   1. ACTIVE with no pending deadline
//   2. RATE_LIMITED whose reset time has passed
//   3. ERROR_COOLDOWN whose cooldown has passed

use chrono::{DateTime, Utc};

use super::models::{CredentialRecord, CredentialState};

/// Choose the best eligible record, recovering it if needed.
/// Returns the record's index, or `None` when nothing is usable right now.
pub fn choose(records: &mut [CredentialRecord], now: DateTime<Utc>) -> Option<usize> {
    if let Some(index) = records.iter().position(|r| r.is_available(now)) {
        return Some(index);
    }

    if let Some(index) = records.iter().position(|r| {
        r.state == CredentialState::RateLimited && r.rate_limit_reset_at.map_or(true, |t| t <= now)
    }) {
        let record = &mut records[index];
        record.recover_from_rate_limit();
        tracing::info!(credential = %record.identity(), "Credential recovered from rate limit");
        return Some(index);
    }

    if let Some(index) = records.iter().position(|r| {
        r.state == CredentialState::ErrorCooldown && r.cooldown_until.map_or(true, |t| t <= now)
    }) {
        let record = &mut records[index];
        record.recover_from_cooldown();
        tracing::info!(credential = %record.identity(), "Credential recovered from error cooldown");
        return Some(index);
    }

    None
}

/// Map an external sequence tag onto a pool slot.
pub fn sticky_index(tag: u64, pool_size: usize) -> usize {
    (tag % pool_size as u64) as usize
}

/// Prefer the record assigned to `tag`; fall back to [`choose`] when it is
/// not available right now.
pub fn choose_sticky(
    records: &mut [CredentialRecord],
    tag: u64,
    now: DateTime<Utc>,
) -> Option<usize> {
    if records.is_empty() {
        return None;
    }
    let assigned = sticky_index(tag, records.len());
    if records[assigned].is_available(now) {
        return Some(assigned);
    }
    choose(records, now)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::FailurePolicy;
    use chrono::Duration;

    fn pool(n: usize) -> Vec<CredentialRecord> {
        (0..n)
            .map(|i| CredentialRecord::new(format!("KEY_{}", i), format!("secret-{}", i)))
            .collect()
    }

    fn put_in_cooldown(record: &mut CredentialRecord, now: DateTime<Utc>) {
        let policy = FailurePolicy::default();
        while record.state != CredentialState::ErrorCooldown {
            record.record_error("HTTP 500", now, &policy);
        }
    }

    #[test]
    fn test_first_registered_active_wins() {
        let mut records = pool(3);
        assert_eq!(choose(&mut records, Utc::now()), Some(0));
    }

    #[test]
    fn test_skips_unavailable_records_in_order() {
        let now = Utc::now();
        let mut records = pool(3);
        records[0].record_rate_limit(now + Duration::seconds(60));
        put_in_cooldown(&mut records[1], now);
        assert_eq!(choose(&mut records, now), Some(2));
    }

    #[test]
    fn test_rate_limited_excluded_until_reset() {
        let now = Utc::now();
        let reset_at = now + Duration::seconds(60);
        let mut records = pool(1);
        records[0].record_rate_limit(reset_at);

        assert_eq!(choose(&mut records, reset_at - Duration::milliseconds(1)), None);
        assert_eq!(records[0].state, CredentialState::RateLimited);

        assert_eq!(choose(&mut records, reset_at), Some(0));
        assert_eq!(records[0].state, CredentialState::Active);
        assert!(records[0].rate_limit_reset_at.is_none());
    }

    #[test]
    fn test_rate_limit_recovery_preferred_over_cooldown_recovery() {
        let now = Utc::now();
        let mut records = pool(2);
        put_in_cooldown(&mut records[0], now);
        records[1].record_rate_limit(now + Duration::seconds(1));

        let later = now + Duration::seconds(120);
        assert_eq!(choose(&mut records, later), Some(1));
        assert_eq!(records[0].state, CredentialState::ErrorCooldown);
    }

    #[test]
    fn test_cooldown_recovery_clears_error_count() {
        let now = Utc::now();
        let mut records = pool(1);
        put_in_cooldown(&mut records[0], now);
        assert_eq!(choose(&mut records, now), None);

        let later = now + Duration::seconds(31);
        assert_eq!(choose(&mut records, later), Some(0));
        assert_eq!(records[0].state, CredentialState::Active);
        assert_eq!(records[0].consecutive_errors, 0);
        assert!(records[0].cooldown_until.is_none());
    }

    #[test]
    fn test_exhausted_never_selected() {
        let mut records = pool(1);
        records[0].disable();
        let far_future = Utc::now() + Duration::days(365);
        assert_eq!(choose(&mut records, far_future), None);
    }

    #[test]
    fn test_sticky_index_is_modulo_pool_size() {
        assert_eq!(sticky_index(0, 4), 0);
        assert_eq!(sticky_index(5, 4), 1);
        assert_eq!(sticky_index(7, 3), 1);
    }

    #[test]
    fn test_sticky_uses_assigned_record() {
        let mut records = pool(3);
        assert_eq!(choose_sticky(&mut records, 2, Utc::now()), Some(2));
    }

    #[test]
    fn test_sticky_falls_back_when_assigned_unavailable() {
        let now = Utc::now();
        let mut records = pool(3);
        records[2].record_rate_limit(now + Duration::seconds(60));
        assert_eq!(choose_sticky(&mut records, 2, now), Some(0));
    }
}
