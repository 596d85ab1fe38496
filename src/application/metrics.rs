//! Observability metrics for admission decisions.
//!
//! Provides counters for monitoring how the engine treats traffic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking admission statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Requests admitted
    admitted: AtomicU64,
    /// Requests rejected by a bucket or concurrency cap
    rate_limited: AtomicU64,
    /// Requests rejected by a block
    blocked: AtomicU64,
    /// Automatic IP blocks placed
    auto_blocks: AtomicU64,
    /// Idle entries removed by sweeps
    evicted: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_admitted(&self) {
        self.inner.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rate_limited(&self) {
        self.inner.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_blocked(&self) {
        self.inner.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_auto_block(&self) {
        self.inner.auto_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, count: usize) {
        self.inner
            .evicted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get the total number of admitted requests.
    pub fn admitted(&self) -> u64 {
        self.inner.admitted.load(Ordering::Relaxed)
    }

    /// Get the total number of rate limited requests.
    pub fn rate_limited(&self) -> u64 {
        self.inner.rate_limited.load(Ordering::Relaxed)
    }

    /// Get the total number of blocked requests.
    pub fn blocked(&self) -> u64 {
        self.inner.blocked.load(Ordering::Relaxed)
    }

    /// Get the total number of automatic IP blocks placed.
    pub fn auto_blocks(&self) -> u64 {
        self.inner.auto_blocks.load(Ordering::Relaxed)
    }

    /// Get the total number of entries evicted by sweeps.
    pub fn evicted(&self) -> u64 {
        self.inner.evicted.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.admitted(),
            rate_limited: self.rate_limited(),
            blocked: self.blocked(),
            auto_blocks: self.auto_blocks(),
            evicted: self.evicted(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.admitted.store(0, Ordering::Relaxed);
        self.inner.rate_limited.store(0, Ordering::Relaxed);
        self.inner.blocked.store(0, Ordering::Relaxed);
        self.inner.auto_blocks.store(0, Ordering::Relaxed);
        self.inner.evicted.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub admitted: u64,
    pub rate_limited: u64,
    pub blocked: u64,
    pub auto_blocks: u64,
    pub evicted: u64,
}

impl MetricsSnapshot {
    /// Total decisions made (admitted + rejected).
    pub fn total_requests(&self) -> u64 {
        self.admitted
            .saturating_add(self.rate_limited)
            .saturating_add(self.blocked)
    }

    /// Fraction of requests rejected for any reason (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been seen.
    pub fn rejection_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            (self.rate_limited + self.blocked) as f64 / total as f64
        }
    }
}
