//! Per-account behavior tracking.
//!
//! Wraps [`BehaviorState`] in concurrent storage and applies the adaptive
//! configuration. All operations are no-ops while adaptive scoring is
//! disabled.

use crate::application::ports::Storage;
use crate::domain::behavior::BehaviorState;
use crate::domain::policy::AdaptiveConfig;
use crate::infrastructure::storage::ShardedStorage;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default tracker storage.
pub type BehaviorStorage = ShardedStorage<String, BehaviorState>;

/// Tracks trust and suspicion for every account seen.
#[derive(Debug)]
pub struct BehaviorTracker<S = BehaviorStorage>
where
    S: Storage<String, BehaviorState>,
{
    storage: S,
    config: AdaptiveConfig,
}

impl BehaviorTracker<BehaviorStorage> {
    /// Create a tracker backed by sharded storage.
    pub fn new(config: AdaptiveConfig) -> Self {
        Self::with_storage(BehaviorStorage::new(), config)
    }
}

impl<S> BehaviorTracker<S>
where
    S: Storage<String, BehaviorState>,
{
    /// Create a tracker over the given storage.
    pub fn with_storage(storage: S, config: AdaptiveConfig) -> Self {
        Self { storage, config }
    }

    /// Record a successful request for `account`.
    ///
    /// # Returns
    /// The new trust level if it increased
    pub fn record_success(&self, account: &str, now: Instant) -> Option<u32> {
        if !self.config.enabled {
            return None;
        }
        self.storage.with_entry_mut(
            account.to_string(),
            || BehaviorState::new(now),
            |state| state.record_success(&self.config, now),
        )
    }

    /// Record a failed request for `account`.
    ///
    /// # Returns
    /// The new suspicion level if it increased
    pub fn record_failure(&self, account: &str, now: Instant) -> Option<u32> {
        if !self.config.enabled {
            return None;
        }
        self.storage.with_entry_mut(
            account.to_string(),
            || BehaviorState::new(now),
            |state| state.record_failure(&self.config, now),
        )
    }

    /// Rate multiplier for `account`; `1.0` for unknown accounts.
    pub fn multiplier(&self, account: &str) -> f64 {
        if !self.config.enabled {
            return 1.0;
        }
        self.storage
            .get_cloned(&account.to_string())
            .map_or(1.0, |state| state.multiplier(&self.config))
    }

    /// Current state of `account`, if tracked.
    pub fn state(&self, account: &str) -> Option<BehaviorState> {
        self.storage.get_cloned(&account.to_string())
    }

    /// Apply one decay tick to every tracked account.
    ///
    /// Keys are snapshotted first and each account is updated under its own
    /// lock, so concurrent success and failure reports are never stalled.
    ///
    /// # Returns
    /// Number of accounts whose state changed
    pub fn decay(&self, now: Instant) -> usize {
        if !self.config.enabled {
            return 0;
        }
        let decayed = self
            .storage
            .keys()
            .iter()
            .filter(|key| {
                self.storage
                    .update(key, |state| state.decay(&self.config, now))
                    .unwrap_or(false)
            })
            .count();
        if decayed > 0 {
            debug!(decayed, "behavior decay applied");
        }
        decayed
    }

    /// Drop idle accounts that carry no suspicion.
    ///
    /// # Returns
    /// Number of accounts removed
    pub fn sweep(&self, retention: Duration, now: Instant) -> usize {
        self.storage
            .keys()
            .iter()
            .filter(|key| {
                self.storage
                    .remove_if(key, |_, state| state.is_evictable(retention, now))
            })
            .count()
    }

    /// Number of tracked accounts.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if no account is tracked.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Adaptive configuration in use.
    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }
}
