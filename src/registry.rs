//! Registry of per-caller limiters.
//!
//! Limiters are created the first time a caller is seen and kept for the lifetime of the
//! registry. The rate a limiter was created with is never changed afterwards.

use crate::clock::{Clock, MonotonicClock};
use crate::identity::CallerIdentity;
use crate::rate::Rate;
use crate::token_bucket::TokenBucket;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The request may proceed.
    Allowed,
    /// The caller has no capacity left right now.
    Rejected,
}

impl AdmissionDecision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allowed)
    }
}

/// Limiter owned by one caller.
#[derive(Debug)]
pub struct LimiterEntry {
    bucket: TokenBucket,
    rate: Rate,
}

impl LimiterEntry {
    fn new(rate: Rate, clock: Arc<dyn Clock>) -> Self {
        Self { bucket: TokenBucket::new(rate, clock), rate }
    }

    /// Rate in effect when the entry was created.
    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// Permits available right now.
    pub fn available(&self) -> u64 {
        self.bucket.available()
    }
}

type CreationHook = Arc<dyn Fn(&CallerIdentity, Rate) + Send + Sync>;

/// Concurrent map from caller to limiter.
///
/// Lookups take a shard read lock; creating an entry takes the shard write lock for the
/// duration of the insert, so concurrent first checks for a key build exactly one limiter.
/// Entries are never evicted.
pub struct LimiterRegistry {
    limiters: DashMap<CallerIdentity, Arc<LimiterEntry>>,
    clock: Arc<dyn Clock>,
    on_create: Option<CreationHook>,
}

impl Default for LimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LimiterRegistry {
    /// Empty registry reading time from a [`MonotonicClock`].
    pub fn new() -> Self {
        Self {
            limiters: DashMap::new(),
            clock: Arc::new(MonotonicClock::default()),
            on_create: None,
        }
    }

    /// Override the clock (useful for deterministic tests).
    ///
    /// Only affects limiters created afterwards.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Run `hook` once for every limiter the registry creates.
    ///
    /// The hook runs while the shard holding the new key is locked and must not call back into
    /// the registry.
    pub fn with_creation_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CallerIdentity, Rate) + Send + Sync + 'static,
    {
        self.on_create = Some(Arc::new(hook));
        self
    }

    /// Take one permit from `key`'s limiter, creating the limiter for `rate` on first use.
    ///
    /// Never waits: an exhausted limiter yields [`AdmissionDecision::Rejected`] at once. When
    /// the limiter already exists, `rate` is ignored in favour of the rate it was created with.
    pub fn check_admission(&self, key: &CallerIdentity, rate: Rate) -> AdmissionDecision {
        let entry = self.get_or_create(key, rate);
        if entry.rate != rate {
            debug!(
                key = %key,
                requested = %rate,
                effective = %entry.rate,
                "limiter keeps the rate it was created with"
            );
        }

        if entry.bucket.try_acquire() {
            AdmissionDecision::Allowed
        } else {
            debug!(key = %key, rate = %entry.rate, "rate limit exceeded");
            AdmissionDecision::Rejected
        }
    }

    /// Rate of `key`'s limiter, if one exists.
    pub fn rate_for(&self, key: &str) -> Option<Rate> {
        self.limiters.get(key).map(|entry| entry.rate)
    }

    /// Entry for `key`, if one exists.
    pub fn get(&self, key: &str) -> Option<Arc<LimiterEntry>> {
        self.limiters.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.limiters.contains_key(key)
    }

    /// Number of callers seen so far.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    fn get_or_create(&self, key: &CallerIdentity, rate: Rate) -> Arc<LimiterEntry> {
        // The read guard must be released before `entry` locks the same shard for writing.
        let existing = self.limiters.get(key).map(|entry| Arc::clone(entry.value()));
        if let Some(entry) = existing {
            return entry;
        }

        let entry = self.limiters.entry(key.clone()).or_insert_with(|| {
            if let Some(hook) = &self.on_create {
                hook(key, rate);
            }
            debug!(key = %key, rate = %rate, "limiter created");
            Arc::new(LimiterEntry::new(rate, Arc::clone(&self.clock)))
        });
        Arc::clone(entry.value())
    }
}

impl std::fmt::Debug for LimiterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterRegistry")
            .field("limiters", &self.limiters.len())
            .field("clock", &self.clock)
            .field("on_create", &self.on_create.is_some())
            .finish()
    }
}
