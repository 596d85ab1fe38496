//! Standard rate limit response headers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Rate limit metadata returned with every decision that consulted a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RateLimitHeaders {
    /// Configured rate of the deciding limiter
    pub limit: u64,
    /// Whole tokens left in the deciding bucket
    pub remaining: u64,
    /// Unix timestamp, in seconds, at which the bucket is full again
    pub reset_at: u64,
    /// Seconds the caller should wait; zero when admitted
    pub retry_after: u64,
}

impl RateLimitHeaders {
    /// Build headers from relative wait times.
    ///
    /// # Arguments
    /// * `limit` - Configured rate of the deciding limiter
    /// * `remaining` - Whole tokens left
    /// * `reset_after` - Time until the bucket is full
    /// * `retry_after` - Time until the next request can be admitted
    /// * `now` - Current wall-clock time
    pub fn new(
        limit: u64,
        remaining: u64,
        reset_after: Duration,
        retry_after: Duration,
        now: SystemTime,
    ) -> Self {
        let reset_after = reset_after.max(retry_after);
        let reset_at = now
            .checked_add(reset_after)
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(u64::MAX, |d| d.as_secs());
        Self {
            limit,
            remaining,
            reset_at,
            retry_after: retry_after.as_secs(),
        }
    }

    /// Render as `(name, value)` header pairs.
    ///
    /// `Retry-After` is only present when non-zero.
    pub fn to_header_pairs(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, self.remaining.to_string()),
            (HEADER_RESET, self.reset_at.to_string()),
        ];
        if self.retry_after > 0 {
            headers.push((HEADER_RETRY_AFTER, self.retry_after.to_string()));
        }
        headers
    }
}
