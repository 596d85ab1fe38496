//! Admission decision engine.
//!
//! Orchestrates the block list, allow list, endpoint, IP and account
//! limiters in a fixed order and reports the verdict with rate limit
//! headers. The first limiter that rejects decides the outcome.
//!
//! # Precedence
//!
//! 1. Static deny list and automatic blocks reject without consuming tokens.
//! 2. Allow-listed IPs are admitted without further checks.
//! 3. The endpoint override bucket, keyed by endpoint and IP.
//! 4. The per-IP bucket, unless the endpoint skips it.
//! 5. The per-account concurrency cap and bucket, scaled by behavior.
//!
//! Steps 1 to 4 are skipped when IP limiting is disabled.

use crate::application::access::{canonical_ip, ip_key, IpAccessControl};
use crate::application::behavior::BehaviorTracker;
use crate::application::concurrency::{ConcurrencyLimiter, ConcurrencySlot};
use crate::application::metrics::Metrics;
use crate::application::ports::{AuditSink, Clock};
use crate::application::registry::{CheckResult, LimiterRegistry, IDLE_RETENTION};
use crate::domain::audit::AuditEvent;
use crate::domain::behavior::is_suspicious_level;
use crate::domain::bucket::Quota;
use crate::domain::context::{AdmissionContext, Outcome};
use crate::domain::endpoint::{EndpointMatcher, EndpointTable};
use crate::domain::error::{AdmissionError, BlockReason, LimitScope};
use crate::domain::headers::RateLimitHeaders;
use crate::domain::policy::{Policy, PolicyError, TierLimit, FALLBACK_TIER};
use crate::infrastructure::audit::TracingAuditSink;
use crate::infrastructure::clock::SystemClock;
use std::fmt;
use std::net::IpAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
#[cfg(feature = "async")]
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Message used when a rejection has no endpoint-specific message.
pub const DEFAULT_REJECTION_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// Error code carried by every rejection body.
pub const REJECTION_CODE: &str = "RATE_LIMIT_EXCEEDED";

/// HTTP status used for every rejection.
pub const REJECTION_STATUS: u16 = 429;

/// Error returned when building an engine fails.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    /// The policy violates one of its invariants
    ConfigurationInvalid(PolicyError),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::ConfigurationInvalid(e) => write!(f, "invalid admission policy: {}", e),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::ConfigurationInvalid(e) => Some(e),
        }
    }
}

impl From<PolicyError> for BuildError {
    fn from(e: PolicyError) -> Self {
        BuildError::ConfigurationInvalid(e)
    }
}

/// Family of limiter keys, each kept in its own registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterFamily {
    Ip,
    Account,
    Endpoint,
}

impl LimiterFamily {
    /// All families, in sweep order.
    pub const ALL: [LimiterFamily; 3] = [
        LimiterFamily::Ip,
        LimiterFamily::Account,
        LimiterFamily::Endpoint,
    ];

    /// Stable name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterFamily::Ip => "ip",
            LimiterFamily::Account => "account",
            LimiterFamily::Endpoint => "endpoint",
        }
    }
}

/// A successful admission.
///
/// Holds the concurrency slot of capped accounts: keep it alive until the
/// request completes. Dropping it releases the slot.
#[derive(Debug)]
pub struct Admission {
    headers: Option<RateLimitHeaders>,
    slot: Option<ConcurrencySlot>,
}

impl Admission {
    fn unlimited() -> Self {
        Self {
            headers: None,
            slot: None,
        }
    }

    /// Headers of the most restrictive bucket consulted, if any.
    ///
    /// `None` when no bucket was consulted (limiting disabled or allow-listed IP).
    pub fn headers(&self) -> Option<&RateLimitHeaders> {
        self.headers.as_ref()
    }

    /// Whether this admission holds a concurrency slot.
    pub fn holds_slot(&self) -> bool {
        self.slot.is_some()
    }

    /// Take the concurrency slot out, to keep it alive independently.
    pub fn take_slot(&mut self) -> Option<ConcurrencySlot> {
        self.slot.take()
    }

    /// Keep the in-flight count without a guard.
    ///
    /// The caller must later call
    /// [`AdmissionEngine::decrement_concurrent`] exactly once for the account.
    pub fn detach_slot(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.detach();
        }
    }
}

/// A rejected request, ready to be rendered as a `429` response.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    error: AdmissionError,
    headers: Option<RateLimitHeaders>,
    message: Option<String>,
}

impl Rejection {
    /// Why the request was rejected.
    pub fn error(&self) -> &AdmissionError {
        &self.error
    }

    /// Headers of the bucket that caused the rejection.
    pub fn headers(&self) -> Option<&RateLimitHeaders> {
        self.headers.as_ref()
    }

    /// Response status; always `429`.
    pub fn status_code(&self) -> u16 {
        REJECTION_STATUS
    }

    /// Error code for the response body.
    pub fn code(&self) -> &'static str {
        REJECTION_CODE
    }

    /// Message for the response body.
    ///
    /// The endpoint's custom message for rate limit rejections, a generic
    /// message otherwise. Never reveals why a caller is blocked.
    pub fn message(&self) -> &str {
        match (&self.error, &self.message) {
            (AdmissionError::RateLimitExceeded { .. }, Some(message)) => message,
            _ => DEFAULT_REJECTION_MESSAGE,
        }
    }

    /// Suggested wait before retrying.
    pub fn retry_after(&self) -> Duration {
        self.error.retry_after()
    }

    /// Convert into the underlying error.
    pub fn into_error(self) -> AdmissionError {
        self.error
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for Rejection {}

/// Counts for an operational status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub ip_limiters: usize,
    pub account_limiters: usize,
    pub endpoint_limiters: usize,
    pub behavior_trackers: usize,
    pub blacklisted_ips: usize,
    pub enabled: bool,
}

/// What one maintenance pass removed or changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaintenanceReport {
    pub ip_evicted: usize,
    pub account_evicted: usize,
    pub endpoint_evicted: usize,
    pub behavior_evicted: usize,
    pub counters_evicted: usize,
    pub blocks_expired: usize,
    pub decayed: usize,
}

/// The admission decision engine.
///
/// All state is owned by the instance; separate engines never share
/// limiters.
pub struct AdmissionEngine {
    policy: Policy,
    endpoints: EndpointTable,
    fallback_tier: TierLimit,
    ip_limiters: Arc<LimiterRegistry>,
    account_limiters: LimiterRegistry,
    endpoint_limiters: LimiterRegistry,
    behavior: BehaviorTracker,
    access: IpAccessControl,
    concurrency: ConcurrencyLimiter,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<dyn AuditSink>>,
    metrics: Metrics,
    closed: AtomicBool,
    #[cfg(feature = "async")]
    close_signal: watch::Sender<bool>,
}

impl fmt::Debug for AdmissionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionEngine")
            .field("enabled", &self.policy.enabled)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl AdmissionEngine {
    /// Create a builder for configuring the engine.
    ///
    /// Defaults:
    /// - Policy: [`Policy::default`]
    /// - Clock: system clock
    /// - Audit: [`TracingAuditSink`]
    /// - Endpoint matchers: exact, path-only, wildcard
    pub fn builder() -> AdmissionEngineBuilder {
        AdmissionEngineBuilder {
            policy: Policy::default(),
            clock: None,
            audit: Some(Arc::new(TracingAuditSink::new())),
            matchers: None,
        }
    }

    /// Decide whether a request may proceed.
    ///
    /// Never panics: an internal failure is reported as an
    /// `InternalInconsistency` rejection. After [`close`](Self::close)
    /// every request is rejected as `Blocked`.
    ///
    /// # Errors
    /// Returns a [`Rejection`] carrying the reason, headers and response message.
    pub fn check_limit(&self, ctx: &AdmissionContext) -> Result<Admission, Rejection> {
        if self.is_closed() {
            self.metrics.record_blocked();
            return Err(self.blocked(BlockReason::ShuttingDown, Duration::from_secs(1)));
        }
        if !self.policy.enabled {
            self.metrics.record_admitted();
            return Ok(Admission::unlimited());
        }

        let decision = panic::catch_unwind(AssertUnwindSafe(|| self.decide(ctx)));

        match decision {
            Ok(Ok(admission)) => {
                self.metrics.record_admitted();
                Ok(admission)
            }
            Ok(Err(rejection)) => {
                if rejection.error.is_blocked() {
                    self.metrics.record_blocked();
                } else {
                    self.metrics.record_rate_limited();
                }
                Err(rejection)
            }
            Err(_) => {
                error!(ip = %ctx.ip, path = %ctx.path, "admission check panicked, denying request");
                self.metrics.record_blocked();
                Err(Rejection {
                    error: AdmissionError::InternalInconsistency(
                        "admission check panicked".to_string(),
                    ),
                    headers: None,
                    message: None,
                })
            }
        }
    }

    fn decide(&self, ctx: &AdmissionContext) -> Result<Admission, Rejection> {
        let now = self.clock.now();
        let ip = canonical_ip(ctx.ip);
        let rule = self.endpoints.resolve(&ctx.method, &ctx.path);
        let message = rule.and_then(|r| r.custom_message.clone());
        let mut tightest: Option<RateLimitHeaders> = None;

        if self.policy.ip.enabled {
            if self.access.is_blacklisted(&ip) {
                self.emit(AuditEvent::BlockedRequest {
                    ip,
                    reason: BlockReason::Blacklisted,
                    path: ctx.path.clone(),
                });
                return Err(self.blocked(BlockReason::Blacklisted, self.access.block_duration()));
            }
            if let Some(remaining) = self.access.auto_block_remaining(&ip, now) {
                self.emit(AuditEvent::BlockedRequest {
                    ip,
                    reason: BlockReason::AutoBlocked,
                    path: ctx.path.clone(),
                });
                return Err(self.blocked(BlockReason::AutoBlocked, remaining));
            }
            if self.access.is_whitelisted(&ip) {
                return Ok(Admission::unlimited());
            }

            if let Some(rule) = rule.filter(|r| r.enabled && (!r.require_auth || ctx.is_authenticated())) {
                let key = format!("ep:{}:{}:{}", rule.method_key(), rule.path, ip);
                let quota = Quota::per_second(f64::from(rule.rps), f64::from(rule.burst));
                let result = self.endpoint_limiters.check(&key, &[quota], now);
                let headers = self.headers(u64::from(rule.rps), &result);
                if !result.allowed {
                    self.record_ip_violation(ip, now);
                    let scope = LimitScope::Endpoint {
                        method: rule.method_key().to_string(),
                        path: rule.path.clone(),
                    };
                    return Err(self.rate_limited(ctx, scope, &result, headers, message));
                }
                tightest = tighter(tightest, headers);
            }

            if !rule.is_some_and(|r| r.skip_ip_limit) {
                let result = self.ip_limiters.check(&ip_key(&ip), &[self.ip_quota()], now);
                let headers = self.headers(u64::from(self.policy.ip.default_rps), &result);
                if !result.allowed {
                    self.record_ip_violation(ip, now);
                    return Err(self.rate_limited(ctx, LimitScope::Ip, &result, headers, message));
                }
                tightest = tighter(tightest, headers);
            }
        }

        let mut slot = None;
        if let Some(account) = ctx.account_id.as_deref() {
            let tier_name = ctx
                .tier
                .as_deref()
                .filter(|t| self.policy.account_tiers.contains_key(*t))
                .unwrap_or(FALLBACK_TIER);
            let tier = self.tier_limit(tier_name);

            slot = match self.concurrency.try_acquire(account, tier.concurrent_requests) {
                Ok(slot) => slot,
                Err(in_flight) => {
                    debug!(%account, in_flight, "concurrency cap reached");
                    let wait = Duration::from_secs(1);
                    let headers = RateLimitHeaders::new(
                        u64::from(tier.concurrent_requests),
                        0,
                        wait,
                        wait,
                        self.clock.system_now(),
                    );
                    let result = CheckResult {
                        allowed: false,
                        remaining: 0,
                        retry_after: wait,
                        reset_after: wait,
                    };
                    let scope = LimitScope::Concurrency {
                        tier: tier_name.to_string(),
                    };
                    return Err(self.rate_limited(ctx, scope, &result, headers, message));
                }
            };

            let multiplier = self.behavior.multiplier(account);
            let key = format!("acct:{}:{}", tier_name, account);
            let result = self
                .account_limiters
                .check(&key, &account_quotas(tier, multiplier), now);
            let limit = (f64::from(tier.requests_per_minute) * multiplier)
                .floor()
                .max(1.0) as u64;
            let headers = self.headers(limit, &result);
            if !result.allowed {
                // Releases the concurrency slot taken above
                drop(slot.take());
                let scope = LimitScope::Account {
                    tier: tier_name.to_string(),
                };
                return Err(self.rate_limited(ctx, scope, &result, headers, message));
            }
            tightest = tighter(tightest, headers);
        }

        Ok(Admission {
            headers: tightest,
            slot,
        })
    }

    fn ip_quota(&self) -> Quota {
        Quota::per_second(
            f64::from(self.policy.ip.default_rps),
            f64::from(self.policy.ip.default_burst),
        )
    }

    fn headers(&self, limit: u64, result: &CheckResult) -> RateLimitHeaders {
        RateLimitHeaders::new(
            limit,
            result.remaining,
            result.reset_after,
            result.retry_after,
            self.clock.system_now(),
        )
    }

    fn blocked(&self, reason: BlockReason, retry_after: Duration) -> Rejection {
        let retry_after = Duration::from_secs(ceil_secs(retry_after).max(1));
        Rejection {
            error: AdmissionError::Blocked {
                reason,
                retry_after,
            },
            headers: Some(RateLimitHeaders::new(
                0,
                0,
                retry_after,
                retry_after,
                self.clock.system_now(),
            )),
            message: None,
        }
    }

    fn rate_limited(
        &self,
        ctx: &AdmissionContext,
        scope: LimitScope,
        result: &CheckResult,
        headers: RateLimitHeaders,
        message: Option<String>,
    ) -> Rejection {
        self.emit(AuditEvent::RateLimitExceeded {
            ip: ctx.ip,
            account: ctx.account_id.clone(),
            scope: scope.clone(),
            method: ctx.method.clone(),
            path: ctx.path.clone(),
        });
        Rejection {
            error: AdmissionError::RateLimitExceeded {
                scope,
                retry_after: result.retry_after,
            },
            headers: Some(headers),
            message,
        }
    }

    fn record_ip_violation(&self, ip: IpAddr, now: Instant) {
        if self.access.record_violation(&ip, now) {
            self.metrics.record_auto_block();
            self.emit(AuditEvent::IpAutoBlocked {
                ip,
                violations: self.policy.ip.auto_block_threshold,
                block_duration: self.policy.ip.block_duration,
            });
        }
    }

    fn emit(&self, event: AuditEvent) {
        let Some(sink) = &self.audit else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| sink.record(&event))).is_err() {
            warn!(event = event.name(), "audit sink panicked, event dropped");
        }
    }

    /// Record a successful request for `account`.
    pub fn record_success(&self, account: &str) {
        if account.is_empty() {
            return;
        }
        self.behavior.record_success(account, self.clock.now());
    }

    /// Record a failed request for `account`.
    ///
    /// Emits `suspicious_activity` when the account's suspicion level
    /// rises to the reporting level or above.
    pub fn record_failure(&self, account: &str) {
        if account.is_empty() {
            return;
        }
        let Some(level) = self.behavior.record_failure(account, self.clock.now()) else {
            return;
        };
        if is_suspicious_level(level) {
            warn!(%account, suspicion_level = level, "account marked suspicious");
            self.emit(AuditEvent::SuspiciousActivity {
                account: account.to_string(),
                suspicion_level: level,
            });
        }
    }

    /// Report how an admitted request finished.
    ///
    /// Success resets the caller IP's violation counter. An authentication
    /// failure also counts as a violation for the caller IP, which may
    /// trigger an automatic block.
    pub fn record_outcome(&self, ctx: &AdmissionContext, outcome: Outcome) {
        let account = ctx.account_id.as_deref().unwrap_or("");
        let ip = canonical_ip(ctx.ip);
        match outcome {
            Outcome::Success => {
                self.record_success(account);
                if self.policy.ip.enabled {
                    self.access.clear_violations(&ip);
                }
            }
            Outcome::Failure => self.record_failure(account),
            Outcome::AuthFailure => {
                self.record_failure(account);
                if self.policy.ip.enabled && !self.access.is_whitelisted(&ip) {
                    self.record_ip_violation(ip, self.clock.now());
                }
            }
        }
    }

    /// Release one in-flight request for `account`.
    ///
    /// Only for admissions whose slot was detached; a held slot releases
    /// itself.
    ///
    /// # Errors
    /// Returns `InternalInconsistency` if the account has no request in
    /// flight. The counter never goes below zero.
    pub fn decrement_concurrent(&self, account: &str) -> Result<(), AdmissionError> {
        self.concurrency.decrement(account)
    }

    /// Requests currently in flight for `account`.
    pub fn in_flight(&self, account: &str) -> u32 {
        self.concurrency.in_flight(account)
    }

    /// Limits of `tier`, falling back to the `"free"` tier.
    pub fn tier_limit(&self, tier: &str) -> &TierLimit {
        self.policy
            .account_tiers
            .get(tier)
            .unwrap_or(&self.fallback_tier)
    }

    /// Current rate multiplier of `account`.
    pub fn multiplier(&self, account: &str) -> f64 {
        self.behavior.multiplier(account)
    }

    /// Current violation count of `ip`.
    pub fn violations(&self, ip: IpAddr) -> u32 {
        self.access.violations(&ip)
    }

    /// Counts for an operational status endpoint.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            ip_limiters: self.ip_limiters.count(),
            account_limiters: self.account_limiters.count(),
            endpoint_limiters: self.endpoint_limiters.count(),
            behavior_trackers: self.behavior.len(),
            blacklisted_ips: self.access.blocked_count(self.clock.now()),
            enabled: self.policy.enabled,
        }
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The validated policy in use.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Remove entries of one limiter family idle past the retention window.
    ///
    /// # Returns
    /// Number of entries removed
    pub fn sweep(&self, family: LimiterFamily) -> usize {
        let now = self.clock.now();
        let removed = match family {
            LimiterFamily::Ip => self.ip_limiters.sweep(IDLE_RETENTION, now),
            LimiterFamily::Account => self.account_limiters.sweep(IDLE_RETENTION, now),
            LimiterFamily::Endpoint => self.endpoint_limiters.sweep(IDLE_RETENTION, now),
        };
        if removed > 0 {
            self.metrics.record_evictions(removed);
            debug!(family = family.as_str(), removed, "swept idle limiters");
        }
        removed
    }

    /// Purge expired blocks and drop idle behavior state and counters.
    ///
    /// # Returns
    /// `(blocks_expired, behavior_evicted, counters_evicted)`
    pub fn sweep_auxiliary(&self) -> (usize, usize, usize) {
        let now = self.clock.now();
        let blocks = self.access.purge_expired(now);
        let behavior = self.behavior.sweep(IDLE_RETENTION, now);
        let counters = self.concurrency.sweep();
        if blocks + behavior + counters > 0 {
            debug!(blocks, behavior, counters, "swept auxiliary state");
        }
        (blocks, behavior, counters)
    }

    /// Apply one decay tick to every tracked account.
    ///
    /// # Returns
    /// Number of accounts whose state changed
    pub fn decay(&self) -> usize {
        self.behavior.decay(self.clock.now())
    }

    /// Run every sweep and the decay tick once.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        let (blocks_expired, behavior_evicted, counters_evicted) = self.sweep_auxiliary();
        MaintenanceReport {
            ip_evicted: self.sweep(LimiterFamily::Ip),
            account_evicted: self.sweep(LimiterFamily::Account),
            endpoint_evicted: self.sweep(LimiterFamily::Endpoint),
            behavior_evicted,
            counters_evicted,
            blocks_expired,
            decayed: self.decay(),
        }
    }

    /// Stop admitting traffic.
    ///
    /// Every later [`check_limit`](Self::check_limit) is rejected as
    /// `Blocked`. Background tasks are woken and exit.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            #[cfg(feature = "async")]
            self.close_signal.send_replace(true);
            info!("admission engine closed");
        }
    }

    /// Receiver that observes `true` once the engine is closed.
    #[cfg(feature = "async")]
    pub(crate) fn close_receiver(&self) -> watch::Receiver<bool> {
        self.close_signal.subscribe()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Quotas for an account: per-minute bucket plus optional hour and day buckets.
fn account_quotas(tier: &TierLimit, multiplier: f64) -> Vec<Quota> {
    let mut quotas = vec![Quota::per_second(
        f64::from(tier.requests_per_minute) / 60.0,
        f64::from(tier.burst_size),
    )
    .scaled(multiplier)];
    if tier.requests_per_hour > 0 {
        quotas.push(
            Quota::per_period(tier.requests_per_hour, Duration::from_secs(60 * 60))
                .scaled(multiplier),
        );
    }
    if tier.requests_per_day > 0 {
        quotas.push(
            Quota::per_period(tier.requests_per_day, Duration::from_secs(24 * 60 * 60))
                .scaled(multiplier),
        );
    }
    quotas
}

/// Keep whichever headers leave fewer requests.
fn tighter(current: Option<RateLimitHeaders>, candidate: RateLimitHeaders) -> Option<RateLimitHeaders> {
    match current {
        Some(existing) if existing.remaining <= candidate.remaining => Some(existing),
        _ => Some(candidate),
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

/// Builder for constructing an [`AdmissionEngine`].
pub struct AdmissionEngineBuilder {
    policy: Policy,
    clock: Option<Arc<dyn Clock>>,
    audit: Option<Arc<dyn AuditSink>>,
    matchers: Option<Vec<Box<dyn EndpointMatcher>>>,
}

impl AdmissionEngineBuilder {
    /// Set the admission policy.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Set a custom clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Send audit events to `sink`.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Emit no audit events.
    pub fn without_audit(mut self) -> Self {
        self.audit = None;
        self
    }

    /// Replace the endpoint matcher order.
    pub fn with_endpoint_matchers(mut self, matchers: Vec<Box<dyn EndpointMatcher>>) -> Self {
        self.matchers = Some(matchers);
        self
    }

    /// Validate the policy and build the engine.
    ///
    /// # Errors
    /// Returns `BuildError::ConfigurationInvalid` if the policy is invalid.
    pub fn build(self) -> Result<AdmissionEngine, BuildError> {
        let policy = self.policy.normalized();
        policy.validate()?;

        let fallback_tier = *policy
            .account_tiers
            .get(FALLBACK_TIER)
            .ok_or(PolicyError::MissingFallbackTier)?;
        let endpoints = match self.matchers {
            Some(matchers) => EndpointTable::with_matchers(policy.endpoint_limits.clone(), matchers),
            None => EndpointTable::new(policy.endpoint_limits.clone()),
        };
        let ip_limiters = Arc::new(LimiterRegistry::new());
        let access = IpAccessControl::new(&policy.ip, Arc::clone(&ip_limiters));
        let behavior = BehaviorTracker::new(policy.adaptive.clone());
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));

        info!(
            enabled = policy.enabled,
            ip_enabled = policy.ip.enabled,
            adaptive_enabled = policy.adaptive.enabled,
            endpoint_rules = policy.endpoint_limits.len(),
            tiers = policy.account_tiers.len(),
            "admission engine initialized"
        );

        Ok(AdmissionEngine {
            policy,
            endpoints,
            fallback_tier,
            ip_limiters,
            account_limiters: LimiterRegistry::new(),
            endpoint_limiters: LimiterRegistry::new(),
            behavior,
            access,
            concurrency: ConcurrencyLimiter::new(),
            clock,
            audit: self.audit,
            metrics: Metrics::new(),
            closed: AtomicBool::new(false),
            #[cfg(feature = "async")]
            close_signal: watch::channel(false).0,
        })
    }
}
