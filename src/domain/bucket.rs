//! Token bucket with continuous refill.
//!
//! A bucket holds up to `capacity` tokens and refills at a fixed rate per
//! second. Each admitted request takes one token. Refill is continuous, so
//! the bucket never resets on window boundaries.

use std::time::{Duration, Instant};

/// Size and refill rate of a bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quota {
    /// Tokens added per second
    pub rate_per_second: f64,
    /// Maximum tokens held (the burst size)
    pub capacity: f64,
}

impl Quota {
    /// Create a quota from a per-second rate and a burst size.
    pub fn per_second(rate: f64, burst: f64) -> Self {
        Self {
            rate_per_second: rate,
            capacity: burst,
        }
    }

    /// Create a quota that admits `count` requests per `period`.
    ///
    /// The bucket capacity equals `count`, so a full period can be spent at once.
    pub fn per_period(count: u32, period: Duration) -> Self {
        let count = f64::from(count);
        Self {
            rate_per_second: count / period.as_secs_f64(),
            capacity: count,
        }
    }

    /// Scale both rate and capacity by `multiplier`.
    ///
    /// Capacity never drops below one token, so a scaled-down bucket still
    /// admits a request once it refills.
    pub fn scaled(self, multiplier: f64) -> Self {
        Self {
            rate_per_second: self.rate_per_second * multiplier,
            capacity: (self.capacity * multiplier).max(1.0),
        }
    }
}

/// A single token bucket.
///
/// Invariant: `0 <= tokens <= capacity`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill_at: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(quota: Quota, now: Instant) -> Self {
        let capacity = quota.capacity.max(0.0);
        Self {
            capacity,
            tokens: capacity,
            refill_rate: quota.rate_per_second.max(0.0),
            last_refill_at: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill_at);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        self.last_refill_at = self.last_refill_at.max(now);
    }

    /// Refill, then take one token if available.
    ///
    /// # Returns
    /// `true` if a token was taken and the request is admitted.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Refill and report whether a token is available, without taking it.
    pub fn has_token(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.tokens >= 1.0
    }

    /// Apply a new quota, keeping the current fill.
    ///
    /// Tokens are refilled at the old rate up to `now` first, then clamped to
    /// the new capacity.
    pub fn reconfigure(&mut self, quota: Quota, now: Instant) {
        self.refill(now);
        self.capacity = quota.capacity.max(0.0);
        self.refill_rate = quota.rate_per_second.max(0.0);
        self.tokens = self.tokens.min(self.capacity);
    }

    /// Whole tokens currently available.
    pub fn remaining(&self) -> u64 {
        self.tokens.floor() as u64
    }

    /// Time until one token is available, rounded up to whole seconds.
    ///
    /// Zero when a token is available now.
    pub fn retry_after(&self) -> Duration {
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        Duration::from_secs(ceil_secs((1.0 - self.tokens) / self.refill_rate))
    }

    /// Time until the bucket is full again, rounded up to whole seconds.
    pub fn reset_after(&self) -> Duration {
        if self.tokens >= self.capacity {
            return Duration::ZERO;
        }
        Duration::from_secs(ceil_secs((self.capacity - self.tokens) / self.refill_rate))
    }

    /// Bucket capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Exact token count, including fractions.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

/// Round a positive number of seconds up. NaN maps to zero, infinity saturates.
fn ceil_secs(secs: f64) -> u64 {
    if secs.is_nan() || secs <= 0.0 {
        0
    } else {
        secs.ceil() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_bucket_is_full() {
        let now = Instant::now();
        let bucket = TokenBucket::new(Quota::per_second(1.0, 5.0), now);

        assert_eq!(bucket.remaining(), 5);
        assert_eq!(bucket.retry_after(), Duration::ZERO);
        assert_eq!(bucket.reset_after(), Duration::ZERO);
    }

    #[test]
    fn test_capacity_then_reject() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(Quota::per_second(1.0, 3.0), now);

        assert!(bucket.try_consume(now));
        assert!(bucket.try_consume(now));
        assert!(bucket.try_consume(now));
        assert!(!bucket.try_consume(now));
        assert_eq!(bucket.remaining(), 0);
    }

    #[test]
    fn test_one_token_after_refill_period() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(Quota::per_second(2.0, 2.0), now);

        assert!(bucket.try_consume(now));
        assert!(bucket.try_consume(now));
        assert!(!bucket.try_consume(now));

        let later = now + Duration::from_millis(500);
        assert!(bucket.try_consume(later));
        assert!(!bucket.try_consume(later));
    }

    #[test]
    fn test_refill_is_continuous() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(Quota::per_second(1.0, 10.0), now);
        for _ in 0..10 {
            assert!(bucket.try_consume(now));
        }

        // Half a token accrues, not enough to admit
        let half = now + Duration::from_millis(500);
        assert!(!bucket.try_consume(half));
        assert!((bucket.tokens() - 0.5).abs() < 1e-9);

        let full = half + Duration::from_millis(500);
        assert!(bucket.try_consume(full));
    }

    #[test]
    fn test_refill_never_exceeds_capacity() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(Quota::per_second(100.0, 5.0), now);
        assert!(bucket.try_consume(now));

        let much_later = now + Duration::from_secs(3600);
        assert!(bucket.has_token(much_later));
        assert_eq!(bucket.remaining(), 5);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(Quota::per_second(0.5, 1.0), now);
        assert!(bucket.try_consume(now));
        assert!(!bucket.try_consume(now));

        // One token at 0.5/s needs two seconds
        assert_eq!(bucket.retry_after(), Duration::from_secs(2));

        let mut slow = TokenBucket::new(Quota::per_second(3.0, 1.0), now);
        assert!(slow.try_consume(now));
        // 1/3 s rounds up to one second
        assert_eq!(slow.retry_after(), Duration::from_secs(1));
    }

    #[test]
    fn test_reset_after() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(Quota::per_second(1.0, 4.0), now);
        for _ in 0..4 {
            assert!(bucket.try_consume(now));
        }
        assert_eq!(bucket.reset_after(), Duration::from_secs(4));
    }

    #[test]
    fn test_reconfigure_clamps_tokens() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(Quota::per_second(10.0, 10.0), now);

        bucket.reconfigure(Quota::per_second(5.0, 5.0), now);
        assert_eq!(bucket.remaining(), 5);
        assert_eq!(bucket.capacity(), 5.0);

        // Growing the capacity does not mint tokens
        bucket.reconfigure(Quota::per_second(20.0, 20.0), now);
        assert_eq!(bucket.remaining(), 5);
    }

    #[test]
    fn test_clock_going_backwards_is_ignored() {
        let now = Instant::now();
        let later = now + Duration::from_secs(1);
        let mut bucket = TokenBucket::new(Quota::per_second(1.0, 1.0), later);
        assert!(bucket.try_consume(later));
        assert!(!bucket.try_consume(now));
        assert!(bucket.try_consume(later + Duration::from_secs(1)));
    }

    #[test]
    fn test_per_period_quota() {
        let quota = Quota::per_period(3600, Duration::from_secs(3600));
        assert!((quota.rate_per_second - 1.0).abs() < 1e-9);
        assert_eq!(quota.capacity, 3600.0);

        let scaled = quota.scaled(0.5);
        assert!((scaled.rate_per_second - 0.5).abs() < 1e-9);
        assert_eq!(scaled.capacity, 1800.0);
    }

    #[test]
    fn test_ceil_secs_edge_cases() {
        assert_eq!(ceil_secs(f64::NAN), 0);
        assert_eq!(ceil_secs(-1.0), 0);
        assert_eq!(ceil_secs(0.1), 1);
        assert_eq!(ceil_secs(f64::INFINITY), u64::MAX);
    }

    #[test]
    fn test_scaled_capacity_keeps_one_token() {
        let now = Instant::now();
        let quota = Quota::per_second(1.0, 1.0).scaled(0.5);
        assert_eq!(quota.capacity, 1.0);

        let mut bucket = TokenBucket::new(quota, now);
        assert!(bucket.try_consume(now));
        assert!(!bucket.try_consume(now));
        assert_eq!(bucket.retry_after(), Duration::from_secs(2));
        assert!(bucket.try_consume(now + Duration::from_secs(2)));
    }
}
