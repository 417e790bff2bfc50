// Keypool — Credential Store
//
// Holds every CredentialRecord behind a single lock. The pool is small (a
// handful of credentials), so one mutex keeps selection and outcome updates
// consistent without per-record locking. The lock is never held across an
// outbound call: `checkout()` hands back an owned copy of what the call needs.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use zeroize::Zeroizing;

use super::models::{CredentialRecord, CredentialStatus};
use super::selection;
use super::PoolError;

/// What a single attempt needs from the chosen record.
pub struct Checkout {
    index: usize,
    identity: String,
    secret: Zeroizing<String>,
}

impl Checkout {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub(crate) fn secret(&self) -> &str {
        self.secret.as_str()
    }
}

impl fmt::Debug for Checkout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkout")
            .field("index", &self.index)
            .field("identity", &self.identity)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// The fixed set of credentials. Identities never change after construction.
pub struct CredentialStore {
    records: Mutex<Vec<CredentialRecord>>,
}

impl CredentialStore {
    /// Build a store from already-constructed records.
    pub fn new(records: Vec<CredentialRecord>) -> Result<Self, PoolError> {
        if records.is_empty() {
            return Err(PoolError::NoCredentialsConfigured);
        }
        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.identity().to_string()) {
                return Err(PoolError::DuplicateIdentity(record.identity().to_string()));
            }
        }
        Ok(Self {
            records: Mutex::new(records),
        })
    }

    /// Load one record per populated slot, reading values from the process environment.
    pub fn from_env(slots: &[String]) -> Result<Self, PoolError> {
        Self::from_lookup(slots, |name| std::env::var(name).ok())
    }

    /// Load one record per populated slot using `lookup` to resolve values.
    /// Blank values count as absent.
    pub fn from_lookup<F>(slots: &[String], lookup: F) -> Result<Self, PoolError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut records = Vec::new();
        for slot in slots {
            match lookup(slot).filter(|v| !v.trim().is_empty()) {
                Some(value) => {
                    tracing::info!(credential = %slot, "Loaded credential");
                    records.push(CredentialRecord::new(slot.clone(), value.trim()));
                }
                None => tracing::warn!(credential = %slot, "Credential slot not set"),
            }
        }
        Self::new(records)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Always false: construction rejects an empty pool.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Read-only snapshot of every record, in registration order.
    pub fn all_records(&self) -> Vec<CredentialRecord> {
        self.records.lock().clone()
    }

    /// Secret-free view of every record.
    pub fn statuses(&self, now: DateTime<Utc>) -> Vec<CredentialStatus> {
        self.records.lock().iter().map(|r| r.status(now)).collect()
    }

    /// Select a record for the next attempt and stamp it as used.
    pub fn checkout(&self, now: DateTime<Utc>) -> Option<Checkout> {
        let mut records = self.records.lock();
        let index = selection::choose(&mut records, now)?;
        Some(Self::checkout_at(&mut records, index, now))
    }

    /// Like [`checkout`](Self::checkout) but prefers the record assigned to `tag`.
    pub fn checkout_sticky(&self, tag: u64, now: DateTime<Utc>) -> Option<Checkout> {
        let mut records = self.records.lock();
        let index = selection::choose_sticky(&mut records, tag, now)?;
        Some(Self::checkout_at(&mut records, index, now))
    }

    fn checkout_at(records: &mut [CredentialRecord], index: usize, now: DateTime<Utc>) -> Checkout {
        let record = &mut records[index];
        record.mark_attempt(now);
        Checkout {
            index,
            identity: record.identity().to_string(),
            secret: record.secret().clone(),
        }
    }

    /// Mutate one record under the store lock.
    pub(crate) fn update<R>(&self, index: usize, f: impl FnOnce(&mut CredentialRecord) -> R) -> R {
        let mut records = self.records.lock();
        f(&mut records[index])
    }

    /// Force every record back to ACTIVE.
    pub fn reset_all(&self) {
        for record in self.records.lock().iter_mut() {
            record.reset();
        }
        tracing::info!("Reset status for all credentials");
    }

    /// Force one record back to ACTIVE. Returns false if `identity` is unknown.
    pub fn reset(&self, identity: &str) -> bool {
        let found = self.with_identity(identity, CredentialRecord::reset);
        if found {
            tracing::info!(credential = %identity, "Reset credential status");
        }
        found
    }

    /// Retire one record until the next reset. Returns false if `identity` is unknown.
    pub fn disable(&self, identity: &str) -> bool {
        let found = self.with_identity(identity, CredentialRecord::disable);
        if found {
            tracing::warn!(credential = %identity, "Credential disabled");
        }
        found
    }

    fn with_identity(&self, identity: &str, f: impl FnOnce(&mut CredentialRecord)) -> bool {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.identity() == identity) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
