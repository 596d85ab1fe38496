//! Admission policy: the validated, read-only configuration of the engine.
//!
//! A [`Policy`] is supplied once at construction time. It carries global
//! defaults, per-endpoint overrides, per-tier account limits, adaptive
//! scoring parameters and the IP allow/deny configuration.

use ipnet::IpNet;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tier used when an account's tier is missing or unknown.
pub const FALLBACK_TIER: &str = "free";

/// Cleanup interval used when the policy leaves it at zero.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Error returned when policy validation fails.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// Global default rate must be greater than zero
    ZeroDefaultRps,
    /// Global default burst must be greater than zero
    ZeroDefaultBurst,
    /// An enabled endpoint override has a zero rate or burst
    InvalidEndpointLimit {
        /// Path pattern of the offending override
        path: String,
        /// Name of the offending field
        field: &'static str,
    },
    /// A tier has a zero rate or burst
    InvalidTierLimit {
        /// Tier name
        tier: String,
        /// Name of the offending field
        field: &'static str,
    },
    /// The fallback tier is not configured
    MissingFallbackTier,
    /// Suspicion multiplier must lie in (0, 1]
    InvalidSuspicionMultiplier(f64),
    /// Trust multiplier must be greater than zero
    InvalidTrustMultiplier(f64),
    /// An adaptive scoring parameter is zero while scoring is enabled
    InvalidAdaptiveParameter(&'static str),
    /// An IP limiting parameter is zero while IP limiting is enabled
    InvalidIpParameter(&'static str),
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::ZeroDefaultRps => write!(f, "default_rps must be greater than 0"),
            PolicyError::ZeroDefaultBurst => write!(f, "default_burst must be greater than 0"),
            PolicyError::InvalidEndpointLimit { path, field } => {
                write!(f, "endpoint {}: {} must be greater than 0", path, field)
            }
            PolicyError::InvalidTierLimit { tier, field } => {
                write!(f, "tier {}: {} must be greater than 0", tier, field)
            }
            PolicyError::MissingFallbackTier => {
                write!(f, "account tiers must define the '{}' tier", FALLBACK_TIER)
            }
            PolicyError::InvalidSuspicionMultiplier(value) => {
                write!(f, "suspicion_multiplier must be in (0, 1], got {}", value)
            }
            PolicyError::InvalidTrustMultiplier(value) => {
                write!(f, "trust_multiplier must be greater than 0, got {}", value)
            }
            PolicyError::InvalidAdaptiveParameter(field) => {
                write!(f, "adaptive {} must be greater than 0", field)
            }
            PolicyError::InvalidIpParameter(field) => {
                write!(f, "ip {} must be greater than 0", field)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// Rate override for a single endpoint.
///
/// `method == None` matches any method. A `path` of `"*"` is the global
/// wildcard and matches every path.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EndpointLimit {
    /// HTTP method this override applies to, or `None` for any
    pub method: Option<String>,
    /// Exact path, or `"*"` for every path
    pub path: String,
    /// Sustained requests per second per caller
    pub rps: u32,
    /// Bucket capacity per caller
    pub burst: u32,
    /// Whether the endpoint bucket is consulted at all
    pub enabled: bool,
    /// Only limit callers with a resolved account identity
    pub require_auth: bool,
    /// Skip the per-IP bucket for this endpoint
    pub skip_ip_limit: bool,
    /// Message returned to rejected callers
    pub custom_message: Option<String>,
}

impl EndpointLimit {
    /// Create an enabled override for `method` and `path`.
    pub fn new(method: Option<&str>, path: impl Into<String>, rps: u32, burst: u32) -> Self {
        Self {
            method: method.map(str::to_owned),
            path: path.into(),
            rps,
            burst,
            enabled: true,
            require_auth: false,
            skip_ip_limit: false,
            custom_message: None,
        }
    }

    /// Only apply this override to authenticated callers.
    pub fn requiring_auth(mut self) -> Self {
        self.require_auth = true;
        self
    }

    /// Bypass the per-IP bucket on this endpoint.
    pub fn skipping_ip_limit(mut self) -> Self {
        self.skip_ip_limit = true;
        self
    }

    /// Set the message returned on rejection.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.custom_message = Some(message.into());
        self
    }

    /// Keep the override in the table but stop consulting its bucket.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Method component used in limiter keys.
    pub fn method_key(&self) -> &str {
        self.method.as_deref().unwrap_or("*")
    }
}

/// Limits for one account tier.
///
/// `requests_per_hour`, `requests_per_day` and `concurrent_requests` are
/// disabled when zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TierLimit {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub requests_per_day: u32,
    pub burst_size: u32,
    pub concurrent_requests: u32,
    pub priority: u32,
}

/// Parameters for adaptive trust and suspicion scoring.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdaptiveConfig {
    pub enabled: bool,
    /// Consecutive successes per trust level
    pub trust_threshold: u32,
    /// Consecutive failures per suspicion level
    pub suspicion_threshold: u32,
    /// Upper bound of the rate multiplier
    pub trust_multiplier: f64,
    /// Lower bound of the rate multiplier
    pub suspicion_multiplier: f64,
    pub decay_interval: Duration,
    pub max_trust_level: u32,
    pub max_suspicion_level: u32,
    pub reset_after_good_period: Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trust_threshold: 100,
            suspicion_threshold: 10,
            trust_multiplier: 2.0,
            suspicion_multiplier: 0.5,
            decay_interval: Duration::from_secs(60 * 60),
            max_trust_level: 5,
            max_suspicion_level: 5,
            reset_after_good_period: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Per-IP limiting and allow/deny configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IpConfig {
    pub enabled: bool,
    pub default_rps: u32,
    pub default_burst: u32,
    pub whitelist_ips: Vec<IpAddr>,
    pub whitelist_cidrs: Vec<IpNet>,
    pub blacklist_ips: Vec<IpAddr>,
    pub blacklist_cidrs: Vec<IpNet>,
    /// How long an automatic block lasts
    pub block_duration: Duration,
    /// Violations before an automatic block; zero disables auto-blocking
    pub auto_block_threshold: u32,
}

impl Default for IpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_rps: 100,
            default_burst: 200,
            whitelist_ips: Vec::new(),
            whitelist_cidrs: ["127.0.0.0/8", "::1/128"]
                .iter()
                .filter_map(|cidr| cidr.parse::<IpNet>().ok())
                .collect(),
            blacklist_ips: Vec::new(),
            blacklist_cidrs: Vec::new(),
            block_duration: Duration::from_secs(60 * 60),
            auto_block_threshold: 100,
        }
    }
}

/// Complete admission policy.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Policy {
    /// When false every request is admitted without consulting any bucket
    pub enabled: bool,
    pub default_rps: u32,
    pub default_burst: u32,
    /// Period of the background sweeps
    pub cleanup_interval: Duration,
    pub endpoint_limits: Vec<EndpointLimit>,
    pub account_tiers: HashMap<String, TierLimit>,
    pub adaptive: AdaptiveConfig,
    pub ip: IpConfig,
}

impl Default for Policy {
    fn default() -> Self {
        let endpoint_limits = vec![
            EndpointLimit::new(Some("POST"), "/api/auth/login", 5, 10)
                .with_message("Login rate limit exceeded. Please try again later."),
            EndpointLimit::new(Some("POST"), "/api/auth/register", 2, 5)
                .with_message("Registration rate limit exceeded."),
            EndpointLimit::new(Some("POST"), "/api/orders/create", 10, 20).requiring_auth(),
            EndpointLimit::new(Some("POST"), "/api/wallet/send", 5, 10).requiring_auth(),
            EndpointLimit::new(Some("GET"), "/api/market/stats", 100, 200),
            EndpointLimit::new(Some("GET"), "/health", 1000, 2000).disabled(),
        ];

        let mut account_tiers = HashMap::new();
        account_tiers.insert(
            FALLBACK_TIER.to_string(),
            TierLimit {
                requests_per_minute: 20,
                requests_per_hour: 1_000,
                requests_per_day: 10_000,
                burst_size: 50,
                concurrent_requests: 10,
                priority: 1,
            },
        );
        account_tiers.insert(
            "premium".to_string(),
            TierLimit {
                requests_per_minute: 100,
                requests_per_hour: 10_000,
                requests_per_day: 100_000,
                burst_size: 200,
                concurrent_requests: 50,
                priority: 5,
            },
        );
        account_tiers.insert(
            "enterprise".to_string(),
            TierLimit {
                requests_per_minute: 1_000,
                requests_per_hour: 100_000,
                requests_per_day: 1_000_000,
                burst_size: 2_000,
                concurrent_requests: 200,
                priority: 10,
            },
        );

        Self {
            enabled: true,
            default_rps: 50,
            default_burst: 100,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            endpoint_limits,
            account_tiers,
            adaptive: AdaptiveConfig::default(),
            ip: IpConfig::default(),
        }
    }
}

impl Policy {
    /// Check every invariant of the policy.
    ///
    /// # Errors
    /// Returns the first violated rule as a [`PolicyError`].
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.default_rps == 0 {
            return Err(PolicyError::ZeroDefaultRps);
        }
        if self.default_burst == 0 {
            return Err(PolicyError::ZeroDefaultBurst);
        }

        for limit in self.endpoint_limits.iter().filter(|l| l.enabled) {
            if limit.rps == 0 {
                return Err(PolicyError::InvalidEndpointLimit {
                    path: limit.path.clone(),
                    field: "rps",
                });
            }
            if limit.burst == 0 {
                return Err(PolicyError::InvalidEndpointLimit {
                    path: limit.path.clone(),
                    field: "burst",
                });
            }
        }

        if !self.account_tiers.contains_key(FALLBACK_TIER) {
            return Err(PolicyError::MissingFallbackTier);
        }
        for (tier, limit) in &self.account_tiers {
            if limit.requests_per_minute == 0 {
                return Err(PolicyError::InvalidTierLimit {
                    tier: tier.clone(),
                    field: "requests_per_minute",
                });
            }
            if limit.burst_size == 0 {
                return Err(PolicyError::InvalidTierLimit {
                    tier: tier.clone(),
                    field: "burst_size",
                });
            }
        }

        let adaptive = &self.adaptive;
        if !(adaptive.suspicion_multiplier > 0.0 && adaptive.suspicion_multiplier <= 1.0) {
            return Err(PolicyError::InvalidSuspicionMultiplier(
                adaptive.suspicion_multiplier,
            ));
        }
        if !(adaptive.trust_multiplier > 0.0) || !adaptive.trust_multiplier.is_finite() {
            return Err(PolicyError::InvalidTrustMultiplier(adaptive.trust_multiplier));
        }
        if adaptive.enabled {
            if adaptive.trust_threshold == 0 {
                return Err(PolicyError::InvalidAdaptiveParameter("trust_threshold"));
            }
            if adaptive.suspicion_threshold == 0 {
                return Err(PolicyError::InvalidAdaptiveParameter("suspicion_threshold"));
            }
            if adaptive.max_trust_level == 0 {
                return Err(PolicyError::InvalidAdaptiveParameter("max_trust_level"));
            }
            if adaptive.max_suspicion_level == 0 {
                return Err(PolicyError::InvalidAdaptiveParameter("max_suspicion_level"));
            }
            if adaptive.decay_interval.is_zero() {
                return Err(PolicyError::InvalidAdaptiveParameter("decay_interval"));
            }
        }

        let ip = &self.ip;
        if ip.enabled {
            if ip.default_rps == 0 {
                return Err(PolicyError::InvalidIpParameter("default_rps"));
            }
            if ip.default_burst == 0 {
                return Err(PolicyError::InvalidIpParameter("default_burst"));
            }
            if ip.auto_block_threshold > 0 && ip.block_duration.is_zero() {
                return Err(PolicyError::InvalidIpParameter("block_duration"));
            }
        }

        Ok(())
    }

    /// Look up a tier, falling back to the `"free"` tier for unknown names.
    ///
    /// Returns `None` only for a policy that has not been validated.
    pub fn tier_limit(&self, tier: &str) -> Option<&TierLimit> {
        self.account_tiers
            .get(tier)
            .or_else(|| self.account_tiers.get(FALLBACK_TIER))
    }

    /// Replace a zero cleanup interval with the default one.
    pub(crate) fn normalized(mut self) -> Self {
        if self.cleanup_interval.is_zero() {
            self.cleanup_interval = DEFAULT_CLEANUP_INTERVAL;
        }
        self
    }
}
