//! Keyed limiter registry.
//!
//! Maps an opaque key (`ip:...`, `acct:tier:...`, `ep:METHOD:path:ip`) to a
//! lazily created [`LimiterEntry`]. Each entry has its own lock, so checks
//! against different keys never contend; the underlying storage is only
//! touched long enough to find or insert the entry.

use crate::application::ports::Storage;
use crate::domain::bucket::{Quota, TokenBucket};
use crate::infrastructure::storage::ShardedStorage;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How long an entry may sit idle before a sweep removes it.
pub const IDLE_RETENTION: Duration = Duration::from_secs(10 * 60);

/// State for one key.
#[derive(Debug)]
pub struct LimiterEntry {
    buckets: Vec<TokenBucket>,
    last_access_at: Instant,
    violation_count: u32,
}

impl LimiterEntry {
    fn new(quotas: &[Quota], now: Instant) -> Self {
        Self {
            buckets: quotas.iter().map(|q| TokenBucket::new(*q, now)).collect(),
            last_access_at: now,
            violation_count: 0,
        }
    }

    /// Bring the bucket set in line with `quotas`, keeping current fill.
    fn sync_quotas(&mut self, quotas: &[Quota], now: Instant) {
        if self.buckets.len() != quotas.len() {
            self.buckets = quotas.iter().map(|q| TokenBucket::new(*q, now)).collect();
            return;
        }
        for (bucket, quota) in self.buckets.iter_mut().zip(quotas) {
            bucket.reconfigure(*quota, now);
        }
    }

    /// Take one token from every bucket, or from none.
    fn try_consume_all(&mut self, now: Instant) -> bool {
        let mut all_ready = true;
        for bucket in &mut self.buckets {
            all_ready &= bucket.has_token(now);
        }
        if !all_ready {
            return false;
        }
        for bucket in &mut self.buckets {
            bucket.try_consume(now);
        }
        true
    }

    /// Whole tokens left in the emptiest bucket.
    fn remaining(&self) -> u64 {
        self.buckets.iter().map(TokenBucket::remaining).min().unwrap_or(0)
    }

    /// Time until every bucket holds a token again.
    ///
    /// Only buckets below one token contribute, so the slowest of them
    /// decides when a retry can pass.
    fn retry_after(&self) -> Duration {
        self.buckets
            .iter()
            .map(TokenBucket::retry_after)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Time until every bucket is full.
    fn reset_after(&self) -> Duration {
        self.buckets
            .iter()
            .map(TokenBucket::reset_after)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Last time this entry was checked.
    pub fn last_access_at(&self) -> Instant {
        self.last_access_at
    }

    /// Violations recorded since the last reset.
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    fn is_idle(&self, idle_threshold: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_access_at) > idle_threshold
    }
}

/// Shared handle to an entry, as stored in the registry.
pub type SharedEntry = Arc<Mutex<LimiterEntry>>;

/// Default registry storage.
pub type EntryStorage = ShardedStorage<String, SharedEntry>;

/// Result of checking one key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckResult {
    /// Whether a token was taken
    pub allowed: bool,
    /// Whole tokens left in the emptiest bucket
    pub remaining: u64,
    /// Wait until every bucket has a token, zero if admitted
    pub retry_after: Duration,
    /// Wait until every bucket is full
    pub reset_after: Duration,
}

/// Registry of limiter entries for one family of keys.
///
/// This type is generic over the storage implementation. In production,
/// use [`EntryStorage`].
#[derive(Debug)]
pub struct LimiterRegistry<S = EntryStorage>
where
    S: Storage<String, SharedEntry>,
{
    storage: S,
}

impl LimiterRegistry<EntryStorage> {
    /// Create a registry backed by sharded storage.
    pub fn new() -> Self {
        Self::with_storage(EntryStorage::new())
    }
}

impl Default for LimiterRegistry<EntryStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> LimiterRegistry<S>
where
    S: Storage<String, SharedEntry>,
{
    /// Create a registry over the given storage.
    pub fn with_storage(storage: S) -> Self {
        Self { storage }
    }

    /// Get the entry for `key`, creating it with full buckets if absent.
    ///
    /// Creation is an atomic get-or-insert: concurrent first requests for
    /// the same key all observe the same entry.
    pub fn get_or_create(&self, key: &str, quotas: &[Quota], now: Instant) -> SharedEntry {
        if let Some(entry) = self.storage.get_cloned(&key.to_string()) {
            return entry;
        }
        self.storage.with_entry_mut(
            key.to_string(),
            || Arc::new(Mutex::new(LimiterEntry::new(quotas, now))),
            |entry| Arc::clone(entry),
        )
    }

    /// Consume one token for `key` from every bucket described by `quotas`.
    ///
    /// Quotas may change between calls (for example when an account's
    /// multiplier moves); existing buckets are resized in place.
    pub fn check(&self, key: &str, quotas: &[Quota], now: Instant) -> CheckResult {
        let entry = self.get_or_create(key, quotas, now);
        let mut entry = lock(&entry);

        entry.sync_quotas(quotas, now);
        entry.last_access_at = entry.last_access_at.max(now);
        let allowed = entry.try_consume_all(now);

        let retry_after = if allowed || entry.buckets.is_empty() {
            Duration::ZERO
        } else {
            entry.retry_after().max(Duration::from_secs(1))
        };
        CheckResult {
            allowed,
            remaining: entry.remaining(),
            retry_after,
            reset_after: entry.reset_after(),
        }
    }

    /// Increment the violation counter of `key`, creating the entry if needed.
    ///
    /// # Returns
    /// The counter value after the increment
    pub fn record_violation(&self, key: &str, quotas: &[Quota], now: Instant) -> u32 {
        let entry = self.get_or_create(key, quotas, now);
        let mut entry = lock(&entry);
        entry.violation_count = entry.violation_count.saturating_add(1);
        entry.violation_count
    }

    /// Increment the violation counter and reset it once it reaches `threshold`.
    ///
    /// Increment, comparison and reset happen under the entry's lock, so only
    /// one caller ever observes the crossing.
    ///
    /// # Returns
    /// `Some(count)` exactly once per crossing, `None` otherwise
    pub fn record_violation_until(
        &self,
        key: &str,
        quotas: &[Quota],
        threshold: u32,
        now: Instant,
    ) -> Option<u32> {
        let entry = self.get_or_create(key, quotas, now);
        let mut entry = lock(&entry);
        entry.violation_count = entry.violation_count.saturating_add(1);
        if threshold > 0 && entry.violation_count >= threshold {
            let reached = entry.violation_count;
            entry.violation_count = 0;
            return Some(reached);
        }
        None
    }

    /// Reset the violation counter of `key` if the entry exists.
    pub fn clear_violations(&self, key: &str) {
        if let Some(entry) = self.storage.get_cloned(&key.to_string()) {
            lock(&entry).violation_count = 0;
        }
    }

    /// Current violation count for `key`.
    pub fn violations(&self, key: &str) -> u32 {
        self.storage
            .get_cloned(&key.to_string())
            .map_or(0, |entry| lock(&entry).violation_count)
    }

    /// Remove entries idle for longer than `idle_threshold`.
    ///
    /// Keys are snapshotted first, then each candidate is removed under its
    /// own lock after re-checking idleness, so a check racing with the sweep
    /// keeps its entry. Entries currently locked, or still referenced by a
    /// caller holding a handle, are skipped.
    ///
    /// # Returns
    /// Number of entries removed
    pub fn sweep(&self, idle_threshold: Duration, now: Instant) -> usize {
        let mut removed = 0;
        for key in self.storage.keys() {
            let evicted = self.storage.remove_if(&key, |_, entry| {
                Arc::strong_count(entry) == 1
                    && matches!(entry.try_lock(), Ok(guard) if guard.is_idle(idle_threshold, now))
            });
            if evicted {
                removed += 1;
            }
        }
        removed
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.storage.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.storage.clear();
    }
}

/// Lock an entry, recovering the data if a previous holder panicked.
///
/// Bucket state stays within its invariants at every step, so a poisoned
/// lock never leaves a half-updated entry behind.
fn lock(entry: &Mutex<LimiterEntry>) -> MutexGuard<'_, LimiterEntry> {
    entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
