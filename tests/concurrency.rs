//! Concurrency cap accounting across admission and completion.

use admission_guard::{
    AdmissionContext, AdmissionEngine, AdmissionError, LimitScope, Policy, TierLimit,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;

fn capped_engine(cap: u32) -> AdmissionEngine {
    let mut policy = Policy::default();
    policy.account_tiers.insert(
        "free".to_string(),
        TierLimit {
            requests_per_minute: 6_000,
            requests_per_hour: 0,
            requests_per_day: 0,
            burst_size: 1_000,
            concurrent_requests: cap,
            priority: 1,
        },
    );
    AdmissionEngine::builder()
        .with_policy(policy)
        .without_audit()
        .build()
        .unwrap()
}

fn ctx() -> AdmissionContext {
    AdmissionContext::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 8)), "GET", "/jobs")
        .with_account("acct", None)
}

#[test]
fn test_cap_with_detached_slots_and_manual_decrement() {
    let engine = capped_engine(2);
    let ctx = ctx();

    let mut outcomes = Vec::new();
    for _ in 0..5 {
        match engine.check_limit(&ctx) {
            Ok(mut admission) => {
                admission.detach_slot();
                outcomes.push(true);
            }
            Err(rejection) => {
                assert!(matches!(
                    rejection.error(),
                    AdmissionError::RateLimitExceeded {
                        scope: LimitScope::Concurrency { .. },
                        ..
                    }
                ));
                assert_eq!(rejection.headers().unwrap().limit, 2);
                outcomes.push(false);
            }
        }
    }
    assert_eq!(outcomes, vec![true, true, false, false, false]);
    assert_eq!(engine.in_flight("acct"), 2);

    let results: Vec<bool> = (0..5)
        .map(|_| engine.decrement_concurrent("acct").is_ok())
        .collect();
    assert_eq!(results, vec![true, true, false, false, false]);
    assert_eq!(engine.in_flight("acct"), 0);

    assert!(engine.check_limit(&ctx).is_ok());
}

#[test]
fn test_guard_releases_slot_on_drop() {
    let engine = capped_engine(1);
    let ctx = ctx();

    {
        let admission = engine.check_limit(&ctx).unwrap();
        assert!(admission.holds_slot());
        assert!(engine.check_limit(&ctx).is_err());
    }
    assert_eq!(engine.in_flight("acct"), 0);
    assert!(engine.check_limit(&ctx).is_ok());
}

#[test]
fn test_taken_slot_outlives_admission() {
    let engine = capped_engine(1);
    let ctx = ctx();

    let mut admission = engine.check_limit(&ctx).unwrap();
    let slot = admission.take_slot().unwrap();
    drop(admission);
    assert_eq!(engine.in_flight("acct"), 1);

    slot.release();
    assert_eq!(engine.in_flight("acct"), 0);
}

#[test]
fn test_slot_released_when_handler_panics() {
    let engine = Arc::new(capped_engine(1));
    let worker = Arc::clone(&engine);

    let result = thread::spawn(move || {
        let _admission = worker.check_limit(&ctx()).unwrap();
        panic!("handler crashed");
    })
    .join();

    assert!(result.is_err());
    assert_eq!(engine.in_flight("acct"), 0);
    assert!(engine.check_limit(&ctx()).is_ok());
}

#[test]
fn test_zero_cap_means_uncapped() {
    let engine = capped_engine(0);
    let ctx = ctx();

    let held: Vec<_> = (0..20).map(|_| engine.check_limit(&ctx).unwrap()).collect();
    assert!(held.iter().all(|a| !a.holds_slot()));
    assert_eq!(engine.in_flight("acct"), 0);
}

#[test]
fn test_parallel_admissions_never_exceed_cap() {
    let engine = Arc::new(capped_engine(3));
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let ctx = ctx();
                let mut peak = 0;
                for _ in 0..50 {
                    if let Ok(admission) = engine.check_limit(&ctx) {
                        peak = peak.max(engine.in_flight("acct"));
                        drop(admission);
                    }
                }
                peak
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap() <= 3);
    }
    assert_eq!(engine.in_flight("acct"), 0);
}
