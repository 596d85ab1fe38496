//! Per-account in-flight request accounting.
//!
//! Admission under a tier cap acquires a [`ConcurrencySlot`]; the slot
//! releases its count exactly once, when dropped or explicitly released.
//! A detached slot hands that obligation to
//! [`ConcurrencyLimiter::decrement`].

use crate::application::ports::Storage;
use crate::domain::error::AdmissionError;
use crate::infrastructure::storage::ShardedStorage;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::error;

/// Default counter storage.
pub type CounterStorage = ShardedStorage<String, Arc<AtomicU32>>;

/// In-flight counters for every account under a concurrency cap.
#[derive(Debug)]
pub struct ConcurrencyLimiter<S = CounterStorage>
where
    S: Storage<String, Arc<AtomicU32>>,
{
    counters: S,
}

impl ConcurrencyLimiter<CounterStorage> {
    /// Create a limiter backed by sharded storage.
    pub fn new() -> Self {
        Self::with_storage(CounterStorage::new())
    }
}

impl Default for ConcurrencyLimiter<CounterStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ConcurrencyLimiter<S>
where
    S: Storage<String, Arc<AtomicU32>>,
{
    /// Create a limiter over the given storage.
    pub fn with_storage(counters: S) -> Self {
        Self { counters }
    }

    fn counter(&self, account: &str) -> Arc<AtomicU32> {
        if let Some(counter) = self.counters.get_cloned(&account.to_string()) {
            return counter;
        }
        self.counters.with_entry_mut(
            account.to_string(),
            || Arc::new(AtomicU32::new(0)),
            |counter| Arc::clone(counter),
        )
    }

    /// Try to take one in-flight slot for `account`.
    ///
    /// A `max` of zero means no cap; no slot is returned in that case.
    ///
    /// # Returns
    /// `Ok(None)` when uncapped, `Ok(Some(slot))` when a slot was taken,
    /// `Err(in_flight)` when the cap is reached
    pub fn try_acquire(&self, account: &str, max: u32) -> Result<Option<ConcurrencySlot>, u32> {
        if max == 0 {
            return Ok(None);
        }
        let counter = self.counter(account);
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .map(|_| {
                Some(ConcurrencySlot {
                    counter: Some(counter),
                })
            })
    }

    /// Release one in-flight request for `account` reported by the caller.
    ///
    /// Used for slots that were [`detached`](ConcurrencySlot::detach).
    ///
    /// # Errors
    /// Returns `InternalInconsistency` if the counter is already zero; the
    /// counter stays at zero.
    pub fn decrement(&self, account: &str) -> Result<(), AdmissionError> {
        let released = self
            .counters
            .get_cloned(&account.to_string())
            .is_some_and(|counter| release(&counter));
        if released {
            Ok(())
        } else {
            error!(%account, "concurrency counter decremented below zero");
            Err(AdmissionError::InternalInconsistency(format!(
                "concurrency counter for account {} is already zero",
                account
            )))
        }
    }

    /// Requests currently in flight for `account`.
    pub fn in_flight(&self, account: &str) -> u32 {
        self.counters
            .get_cloned(&account.to_string())
            .map_or(0, |counter| counter.load(Ordering::Acquire))
    }

    /// Drop counters that are zero and not referenced by any live slot.
    ///
    /// # Returns
    /// Number of counters removed
    pub fn sweep(&self) -> usize {
        self.counters
            .keys()
            .iter()
            .filter(|key| {
                self.counters.remove_if(key, |_, counter| {
                    Arc::strong_count(counter) == 1 && counter.load(Ordering::Acquire) == 0
                })
            })
            .count()
    }

    /// Number of tracked accounts.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Check if no account is tracked.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// Decrement without going below zero.
fn release(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            current.checked_sub(1)
        })
        .is_ok()
}

/// One admitted in-flight request.
///
/// Releases its count when dropped, on every exit path of the caller.
#[derive(Debug)]
#[must_use = "dropping the slot releases it immediately"]
pub struct ConcurrencySlot {
    counter: Option<Arc<AtomicU32>>,
}

impl ConcurrencySlot {
    /// Release the slot now.
    pub fn release(mut self) {
        self.release_inner();
    }

    /// Keep the count without releasing it on drop.
    ///
    /// The caller becomes responsible for exactly one call to
    /// `decrement_concurrent` for this account.
    pub fn detach(mut self) {
        self.counter = None;
    }

    fn release_inner(&mut self) {
        if let Some(counter) = self.counter.take() {
            if !release(&counter) {
                error!("concurrency slot released with zero in-flight count");
            }
        }
    }
}

impl Drop for ConcurrencySlot {
    fn drop(&mut self) {
        self.release_inner();
    }
}
