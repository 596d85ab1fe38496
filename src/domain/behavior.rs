//! Per-account trust and suspicion scoring.
//!
//! Success and failure streaks raise bounded trust and suspicion levels,
//! which combine into a multiplier applied to an account's rate and burst.
//! Trust and suspicion accumulate independently: a failure streak does not
//! erase trust, and a success streak does not erase suspicion.

use crate::domain::policy::AdaptiveConfig;
use std::time::{Duration, Instant};

/// Suspicion level at and above which an account is reported as suspicious.
pub const SUSPICIOUS_LEVEL: u32 = 3;

/// Whether a suspicion level should be reported.
pub fn is_suspicious_level(level: u32) -> bool {
    level >= SUSPICIOUS_LEVEL
}

/// Behavior state of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehaviorState {
    pub consecutive_successes: u64,
    pub consecutive_failures: u64,
    pub trust_level: u32,
    pub suspicion_level: u32,
    pub last_good_at: Instant,
    pub last_decay_at: Instant,
    pub last_seen_at: Instant,
}

impl BehaviorState {
    /// Create a neutral state.
    pub fn new(now: Instant) -> Self {
        Self {
            consecutive_successes: 0,
            consecutive_failures: 0,
            trust_level: 0,
            suspicion_level: 0,
            last_good_at: now,
            last_decay_at: now,
            last_seen_at: now,
        }
    }

    /// Record a successful request.
    ///
    /// # Returns
    /// The new trust level if this success raised it.
    pub fn record_success(&mut self, config: &AdaptiveConfig, now: Instant) -> Option<u32> {
        self.consecutive_failures = 0;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.last_good_at = now;
        self.last_seen_at = now;

        let threshold = u64::from(config.trust_threshold.max(1));
        if self.consecutive_successes % threshold == 0 && self.trust_level < config.max_trust_level
        {
            self.trust_level += 1;
            return Some(self.trust_level);
        }
        None
    }

    /// Record a failed request.
    ///
    /// # Returns
    /// The new suspicion level if this failure raised it.
    pub fn record_failure(&mut self, config: &AdaptiveConfig, now: Instant) -> Option<u32> {
        self.consecutive_successes = 0;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_seen_at = now;

        let threshold = u64::from(config.suspicion_threshold.max(1));
        if self.consecutive_failures % threshold == 0
            && self.suspicion_level < config.max_suspicion_level
        {
            self.suspicion_level += 1;
            return Some(self.suspicion_level);
        }
        None
    }

    /// Rate multiplier derived from the current levels.
    ///
    /// `1 + trust bonus - suspicion penalty`, clamped to
    /// `[suspicion_multiplier, trust_multiplier]`.
    pub fn multiplier(&self, config: &AdaptiveConfig) -> f64 {
        if !config.enabled {
            return 1.0;
        }

        let trust_bonus = ratio(self.trust_level, config.max_trust_level)
            * (config.trust_multiplier - 1.0);
        let suspicion_penalty = ratio(self.suspicion_level, config.max_suspicion_level)
            * (1.0 - config.suspicion_multiplier);
        let effective = 1.0 + trust_bonus - suspicion_penalty;

        let (low, high) = if config.suspicion_multiplier <= config.trust_multiplier {
            (config.suspicion_multiplier, config.trust_multiplier)
        } else {
            (config.trust_multiplier, config.suspicion_multiplier)
        };
        effective.clamp(low, high)
    }

    /// Apply one decay tick if a full decay interval has passed.
    ///
    /// Suspicion drops by one level and the failure streak resets when the
    /// account has gone longer than `reset_after_good_period` since its last
    /// success.
    ///
    /// # Returns
    /// `true` if the state changed.
    pub fn decay(&mut self, config: &AdaptiveConfig, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_decay_at) < config.decay_interval {
            return false;
        }
        self.last_decay_at = now;

        if now.saturating_duration_since(self.last_good_at) <= config.reset_after_good_period {
            return false;
        }

        let changed = self.suspicion_level > 0 || self.consecutive_failures > 0;
        self.suspicion_level = self.suspicion_level.saturating_sub(1);
        self.consecutive_failures = 0;
        changed
    }

    /// Whether the state can be dropped without losing a penalty.
    pub fn is_evictable(&self, retention: Duration, now: Instant) -> bool {
        self.suspicion_level == 0 && now.saturating_duration_since(self.last_seen_at) > retention
    }
}

fn ratio(level: u32, max: u32) -> f64 {
    if max == 0 {
        0.0
    } else {
        f64::from(level.min(max)) / f64::from(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AdaptiveConfig {
        AdaptiveConfig {
            trust_threshold: 3,
            suspicion_threshold: 2,
            ..AdaptiveConfig::default()
        }
    }

    #[test]
    fn test_neutral_multiplier() {
        let state = BehaviorState::new(Instant::now());
        assert_eq!(state.multiplier(&config()), 1.0);
    }

    #[test]
    fn test_trust_rises_every_threshold() {
        let cfg = config();
        let now = Instant::now();
        let mut state = BehaviorState::new(now);

        assert_eq!(state.record_success(&cfg, now), None);
        assert_eq!(state.record_success(&cfg, now), None);
        assert_eq!(state.record_success(&cfg, now), Some(1));
        assert_eq!(state.record_success(&cfg, now), None);
        assert_eq!(state.record_success(&cfg, now), None);
        assert_eq!(state.record_success(&cfg, now), Some(2));
        assert!(state.multiplier(&cfg) > 1.0);
    }

    #[test]
    fn test_trust_capped() {
        let cfg = config();
        let now = Instant::now();
        let mut state = BehaviorState::new(now);

        for _ in 0..100 {
            state.record_success(&cfg, now);
        }
        assert_eq!(state.trust_level, cfg.max_trust_level);
        assert_eq!(state.multiplier(&cfg), cfg.trust_multiplier);
    }

    #[test]
    fn test_suspicion_rises_and_lowers_multiplier() {
        let cfg = config();
        let now = Instant::now();
        let mut state = BehaviorState::new(now);

        assert_eq!(state.record_failure(&cfg, now), None);
        assert_eq!(state.record_failure(&cfg, now), Some(1));
        assert!(state.multiplier(&cfg) < 1.0);

        for _ in 0..100 {
            state.record_failure(&cfg, now);
        }
        assert_eq!(state.suspicion_level, cfg.max_suspicion_level);
        assert_eq!(state.multiplier(&cfg), cfg.suspicion_multiplier);
    }

    #[test]
    fn test_streaks_reset_each_other() {
        let cfg = config();
        let now = Instant::now();
        let mut state = BehaviorState::new(now);

        state.record_failure(&cfg, now);
        state.record_success(&cfg, now);
        assert_eq!(state.consecutive_failures, 0);
        // The next failure starts a new streak, so no level change yet
        assert_eq!(state.record_failure(&cfg, now), None);
        assert_eq!(state.consecutive_successes, 0);
    }

    #[test]
    fn test_levels_accumulate_independently() {
        let cfg = config();
        let now = Instant::now();
        let mut state = BehaviorState::new(now);

        for _ in 0..3 {
            state.record_success(&cfg, now);
        }
        for _ in 0..2 {
            state.record_failure(&cfg, now);
        }
        assert_eq!(state.trust_level, 1);
        assert_eq!(state.suspicion_level, 1);

        // 1 + 0.2 * 1.0 - 0.2 * 0.5
        assert!((state.multiplier(&cfg) - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_multiplier_is_one() {
        let cfg = AdaptiveConfig {
            enabled: false,
            ..config()
        };
        let now = Instant::now();
        let mut state = BehaviorState::new(now);
        for _ in 0..10 {
            state.record_failure(&cfg, now);
        }
        assert_eq!(state.multiplier(&cfg), 1.0);
    }

    #[test]
    fn test_decay_requires_interval_and_quiet_period() {
        let cfg = AdaptiveConfig {
            decay_interval: Duration::from_secs(10),
            reset_after_good_period: Duration::from_secs(30),
            ..config()
        };
        let start = Instant::now();
        let mut state = BehaviorState::new(start);
        state.record_failure(&cfg, start);
        state.record_failure(&cfg, start);
        assert_eq!(state.suspicion_level, 1);

        // Interval not reached
        assert!(!state.decay(&cfg, start + Duration::from_secs(5)));
        // Interval reached, but last success is too recent
        assert!(!state.decay(&cfg, start + Duration::from_secs(10)));
        assert_eq!(state.suspicion_level, 1);

        assert!(state.decay(&cfg, start + Duration::from_secs(40)));
        assert_eq!(state.suspicion_level, 0);
        assert_eq!(state.consecutive_failures, 0);

        // Floor at zero
        assert!(!state.decay(&cfg, start + Duration::from_secs(60)));
        assert_eq!(state.suspicion_level, 0);
    }

    #[test]
    fn test_evictable_only_without_suspicion() {
        let cfg = config();
        let now = Instant::now();
        let retention = Duration::from_secs(600);
        let mut state = BehaviorState::new(now);
        let later = now + Duration::from_secs(601);

        assert!(state.is_evictable(retention, later));

        state.record_failure(&cfg, now);
        state.record_failure(&cfg, now);
        assert!(!state.is_evictable(retention, later));
    }

    #[test]
    fn test_suspicious_level() {
        assert!(!is_suspicious_level(0));
        assert!(!is_suspicious_level(SUSPICIOUS_LEVEL - 1));
        assert!(is_suspicious_level(SUSPICIOUS_LEVEL));
        assert!(is_suspicious_level(5));
    }
}
