//! End-to-end admission scenarios against the public API.

use admission_guard::{
    AdmissionContext, AdmissionEngine, AdmissionError, AuditEvent, AuditSink, BlockReason,
    EndpointLimit, LimitScope, Outcome, Policy, TierLimit,
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Default, Clone)]
struct CollectingSink {
    events: Arc<Mutex<Vec<String>>>,
}

impl CollectingSink {
    fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == name)
            .count()
    }
}

impl AuditSink for CollectingSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().unwrap().push(event.name().to_string());
    }
}

fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(a, b, c, d))
}

fn engine_with(policy: Policy) -> (AdmissionEngine, CollectingSink) {
    let sink = CollectingSink::default();
    let engine = AdmissionEngine::builder()
        .with_policy(policy)
        .with_audit_sink(Arc::new(sink.clone()))
        .build()
        .unwrap();
    (engine, sink)
}

fn low_ip_limits() -> Policy {
    let mut policy = Policy::default();
    policy.default_rps = 2;
    policy.default_burst = 2;
    policy.ip.default_rps = 2;
    policy.ip.default_burst = 2;
    policy
}

#[test]
fn test_third_request_is_rejected_with_headers() {
    let (engine, sink) = engine_with(low_ip_limits());
    let ctx = AdmissionContext::new(v4(192, 168, 1, 1), "GET", "/test");

    let first = engine.check_limit(&ctx).unwrap();
    assert_eq!(first.headers().unwrap().remaining, 1);
    assert!(engine.check_limit(&ctx).is_ok());

    let rejection = engine.check_limit(&ctx).unwrap_err();
    assert_eq!(rejection.status_code(), 429);
    assert_eq!(rejection.code(), "RATE_LIMIT_EXCEEDED");
    assert_eq!(
        rejection.message(),
        "Rate limit exceeded. Please try again later."
    );

    let headers = rejection.headers().unwrap();
    assert_eq!(headers.limit, 2);
    assert_eq!(headers.remaining, 0);
    assert!(headers.retry_after >= 1);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    assert!(headers.reset_at >= now);

    let pairs = headers.to_header_pairs();
    assert!(pairs.iter().any(|(name, _)| *name == "X-RateLimit-Limit"));
    assert!(pairs.iter().any(|(name, _)| *name == "X-RateLimit-Remaining"));
    assert!(pairs.iter().any(|(name, _)| *name == "X-RateLimit-Reset"));
    assert!(pairs.iter().any(|(name, _)| *name == "Retry-After"));
    assert_eq!(sink.count("rate_limit_exceeded"), 1);
}

#[test]
fn test_whitelisted_ip_is_never_limited() {
    let mut policy = low_ip_limits();
    policy.ip.whitelist_ips = vec![v4(192, 168, 1, 100)];
    let (engine, _) = engine_with(policy);
    let ctx = AdmissionContext::new(v4(192, 168, 1, 100), "GET", "/test");

    for _ in 0..10 {
        assert!(engine.check_limit(&ctx).is_ok());
    }
}

#[test]
fn test_loopback_is_whitelisted_by_default() {
    let (engine, _) = engine_with(low_ip_limits());
    for ip in [v4(127, 0, 0, 1), IpAddr::V6(Ipv6Addr::LOCALHOST)] {
        let ctx = AdmissionContext::new(ip, "GET", "/test");
        for _ in 0..10 {
            assert!(engine.check_limit(&ctx).is_ok());
        }
    }
}

#[test]
fn test_blacklisted_cidr_is_blocked() {
    let mut policy = Policy::default();
    policy.ip.blacklist_cidrs = vec!["198.51.100.0/24".parse().unwrap()];
    let (engine, sink) = engine_with(policy);
    let ctx = AdmissionContext::new(v4(198, 51, 100, 23), "GET", "/test");

    let rejection = engine.check_limit(&ctx).unwrap_err();
    assert!(matches!(
        rejection.error(),
        AdmissionError::Blocked {
            reason: BlockReason::Blacklisted,
            ..
        }
    ));
    assert_eq!(rejection.status_code(), 429);
    assert_eq!(rejection.error().to_string(), "request blocked");
    assert_eq!(sink.count("blocked_request"), 1);
    assert_eq!(engine.stats().blacklisted_ips, 1);
}

#[test]
fn test_auto_block_and_expiry() {
    let mut policy = Policy::default();
    policy.ip.default_rps = 1;
    policy.ip.default_burst = 1;
    policy.ip.auto_block_threshold = 3;
    policy.ip.block_duration = Duration::from_secs(1);
    let (engine, sink) = engine_with(policy);
    let ip = v4(192, 0, 2, 50);
    let ctx = AdmissionContext::new(ip, "GET", "/test");

    assert!(engine.check_limit(&ctx).is_ok());
    for _ in 0..3 {
        let rejection = engine.check_limit(&ctx).unwrap_err();
        assert!(rejection.error().is_rate_limited());
    }
    assert_eq!(sink.count("ip_auto_blocked"), 1);

    let rejection = engine.check_limit(&ctx).unwrap_err();
    assert!(matches!(
        rejection.error(),
        AdmissionError::Blocked {
            reason: BlockReason::AutoBlocked,
            ..
        }
    ));
    assert!(engine.stats().blacklisted_ips >= 1);

    thread::sleep(Duration::from_millis(1_100));
    assert!(engine.check_limit(&ctx).is_ok());
}

#[test]
fn test_endpoint_limits_are_isolated() {
    let mut policy = Policy::default();
    policy.endpoint_limits = vec![
        EndpointLimit::new(Some("GET"), "/api/test", 1, 1).with_message("Slow down on test."),
    ];
    let (engine, _) = engine_with(policy);
    let ctx = AdmissionContext::new(v4(192, 168, 1, 1), "GET", "/api/test");

    assert!(engine.check_limit(&ctx).is_ok());
    let rejection = engine.check_limit(&ctx).unwrap_err();
    assert!(matches!(
        rejection.error(),
        AdmissionError::RateLimitExceeded {
            scope: LimitScope::Endpoint { .. },
            ..
        }
    ));
    assert_eq!(rejection.message(), "Slow down on test.");

    // Different method and different caller use separate buckets
    assert!(engine
        .check_limit(&AdmissionContext::new(v4(192, 168, 1, 1), "POST", "/api/test"))
        .is_ok());
    assert!(engine
        .check_limit(&AdmissionContext::new(v4(192, 168, 1, 2), "GET", "/api/test"))
        .is_ok());
}

#[test]
fn test_disabled_endpoint_rule_is_not_enforced() {
    let (engine, _) = engine_with(Policy::default());
    let ctx = AdmissionContext::new(v4(192, 168, 1, 1), "GET", "/health");

    for _ in 0..20 {
        assert!(engine.check_limit(&ctx).is_ok());
    }
    assert_eq!(engine.stats().endpoint_limiters, 0);
}

#[test]
fn test_unknown_tier_uses_free_limits() {
    let mut policy = Policy::default();
    policy.account_tiers.insert(
        "free".to_string(),
        TierLimit {
            requests_per_minute: 60,
            requests_per_hour: 0,
            requests_per_day: 0,
            burst_size: 2,
            concurrent_requests: 0,
            priority: 1,
        },
    );
    let (engine, _) = engine_with(policy);
    let ctx =
        AdmissionContext::new(v4(192, 168, 1, 1), "GET", "/x").with_account("acct", Some("gold"));

    assert!(engine.check_limit(&ctx).is_ok());
    assert!(engine.check_limit(&ctx).is_ok());
    let rejection = engine.check_limit(&ctx).unwrap_err();
    assert!(matches!(
        rejection.error(),
        AdmissionError::RateLimitExceeded {
            scope: LimitScope::Account { tier },
            ..
        } if tier == "free"
    ));
    assert_eq!(engine.tier_limit("gold"), engine.tier_limit("free"));
}

#[test]
fn test_hourly_quota_caps_sustained_traffic() {
    let mut policy = Policy::default();
    policy.account_tiers.insert(
        "metered".to_string(),
        TierLimit {
            requests_per_minute: 6_000,
            requests_per_hour: 3,
            requests_per_day: 0,
            burst_size: 100,
            concurrent_requests: 0,
            priority: 1,
        },
    );
    policy.adaptive.enabled = false;
    let (engine, _) = engine_with(policy);
    let ctx = AdmissionContext::new(v4(192, 168, 1, 1), "GET", "/x")
        .with_account("acct", Some("metered"));

    for _ in 0..3 {
        assert!(engine.check_limit(&ctx).is_ok());
    }
    let rejection = engine.check_limit(&ctx).unwrap_err();
    assert!(rejection.retry_after() >= Duration::from_secs(1));
}

#[test]
fn test_adaptive_scores_change_multiplier() {
    let mut policy = Policy::default();
    policy.adaptive.trust_threshold = 3;
    policy.adaptive.suspicion_threshold = 1;
    let (engine, sink) = engine_with(policy);
    let ip = v4(192, 168, 1, 1);
    let good = AdmissionContext::new(ip, "GET", "/x").with_account("good", None);
    let bad = AdmissionContext::new(ip, "GET", "/x").with_account("bad", None);

    for _ in 0..3 {
        engine.record_outcome(&good, Outcome::from_status(200));
    }
    for _ in 0..3 {
        engine.record_outcome(&bad, Outcome::from_status(500));
    }

    assert!(engine.multiplier("good") > 1.0);
    assert!(engine.multiplier("bad") < 1.0);
    assert!(engine.multiplier("unknown") == 1.0);
    assert_eq!(sink.count("suspicious_activity"), 1);
    assert_eq!(engine.stats().behavior_trackers, 2);
}

#[test]
fn test_repeated_auth_failures_block_the_ip() {
    let mut policy = Policy::default();
    policy.ip.auto_block_threshold = 5;
    let (engine, sink) = engine_with(policy);
    let ctx = AdmissionContext::new(v4(192, 0, 2, 77), "POST", "/api/auth/login");

    for _ in 0..5 {
        assert!(engine.check_limit(&ctx).is_ok());
        engine.record_outcome(&ctx, Outcome::from_status(401));
    }

    assert_eq!(sink.count("ip_auto_blocked"), 1);
    assert!(engine.check_limit(&ctx).unwrap_err().error().is_blocked());
}

#[test]
fn test_stats_report_each_family() {
    let (engine, _) = engine_with(Policy::default());
    let ctx = AdmissionContext::new(v4(192, 168, 1, 1), "GET", "/api/market/stats")
        .with_account("acct", Some("premium"));
    drop(engine.check_limit(&ctx).unwrap());

    let stats = engine.stats();
    assert_eq!(stats.ip_limiters, 1);
    assert_eq!(stats.account_limiters, 1);
    assert_eq!(stats.endpoint_limiters, 1);
    assert_eq!(stats.blacklisted_ips, 0);
    assert!(stats.enabled);
}

#[test]
fn test_concurrent_checks_respect_burst() {
    let mut policy = Policy::default();
    policy.ip.default_rps = 1;
    policy.ip.default_burst = 50;
    policy.ip.auto_block_threshold = 0;
    let engine = Arc::new(
        AdmissionEngine::builder()
            .with_policy(policy)
            .without_audit()
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let ctx = AdmissionContext::new(v4(10, 9, 8, 7), "GET", "/x");
                (0..20)
                    .filter(|_| engine.check_limit(&ctx).is_ok())
                    .count()
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    // 50 burst tokens plus at most a few refilled during the run
    assert!((50..=53).contains(&admitted), "admitted {}", admitted);
}

#[test]
fn test_invalid_policy_prevents_startup() {
    let mut policy = Policy::default();
    policy.endpoint_limits = vec![EndpointLimit::new(None, "/bad", 0, 10)];
    let err = AdmissionEngine::builder()
        .with_policy(policy)
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("/bad"));

    let mut policy = Policy::default();
    policy.account_tiers.remove("free");
    assert!(AdmissionEngine::builder().with_policy(policy).build().is_err());
}

#[test]
fn test_close_rejects_all_traffic() {
    let (engine, _) = engine_with(Policy::default());
    let ctx = AdmissionContext::new(v4(127, 0, 0, 1), "GET", "/x");

    engine.close();
    let rejection = engine.check_limit(&ctx).unwrap_err();
    assert!(rejection.error().is_blocked());
    assert_eq!(engine.metrics().blocked(), 1);
}
