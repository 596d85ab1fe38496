//! # admission-guard
//!
//! In-process admission control for multi-tenant HTTP APIs.
//!
//! Every inbound request is described by an [`AdmissionContext`] (caller IP,
//! optional account and tier, method and path) and checked by an
//! [`AdmissionEngine`] before it reaches a handler. The engine combines:
//!
//! - **Token buckets** keyed by IP, by account and by endpoint
//! - **Tiered accounts** with per-minute, per-hour and per-day quotas and a
//!   concurrency cap
//! - **Adaptive scoring** that raises the limits of well-behaved accounts and
//!   lowers them for accounts that keep failing
//! - **IP allow and deny lists** (exact addresses and CIDR ranges) plus
//!   automatic temporary blocks for repeat offenders
//!
//! ## Quick Start
//!
//! ```rust
//! use admission_guard::{AdmissionContext, AdmissionEngine, Outcome, Policy};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! let engine = AdmissionEngine::builder()
//!     .with_policy(Policy::default())
//!     .build()
//!     .unwrap();
//!
//! let ctx = AdmissionContext::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)), "GET", "/api/items")
//!     .with_account("acct-42", Some("premium"));
//!
//! match engine.check_limit(&ctx) {
//!     Ok(admission) => {
//!         if let Some(headers) = admission.headers() {
//!             for (name, value) in headers.to_header_pairs() {
//!                 println!("{}: {}", name, value);
//!             }
//!         }
//!         // ... run the handler, keeping `admission` alive until it returns
//!         engine.record_outcome(&ctx, Outcome::from_status(200));
//!     }
//!     Err(rejection) => {
//!         println!("{} {}", rejection.status_code(), rejection.message());
//!     }
//! }
//! ```
//!
//! ## Decision Order
//!
//! 1. Deny-listed or automatically blocked IPs are rejected as `Blocked`
//! 2. Allow-listed IPs are admitted without consuming tokens
//! 3. The endpoint override bucket, per endpoint and IP
//! 4. The per-IP bucket, unless the endpoint opts out
//! 5. The account's concurrency cap and tier buckets, scaled by its behavior
//!
//! The first limiter that rejects decides. Rejections from the endpoint and
//! IP buckets count as violations of the caller IP; enough of them place an
//! automatic block.
//!
//! ## Concurrency
//!
//! Accounts whose tier caps concurrent requests receive a slot with their
//! [`Admission`]. The slot is released when the admission is dropped, on
//! every exit path. Callers that cannot hold the guard may
//! [`detach`](Admission::detach_slot) it and report completion through
//! [`AdmissionEngine::decrement_concurrent`].
//!
//! ## Audit
//!
//! Rate limit rejections, automatic blocks, blocked requests and suspicious
//! accounts are reported to an [`AuditSink`]. The default sink logs them as
//! `tracing` events under the `admission_guard::audit` target.
//!
//! ## Maintenance and Shutdown
//!
//! Idle limiter state is evicted after ten minutes. With the `async` feature,
//! [`LifecycleManager`] runs the sweeps and the behavior decay on tokio
//! timers:
//!
//! ```rust,no_run
//! # #[cfg(feature = "async")]
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use admission_guard::{AdmissionEngine, LifecycleManager};
//! use std::sync::Arc;
//!
//! let engine = Arc::new(AdmissionEngine::builder().build()?);
//! let lifecycle = LifecycleManager::start(Arc::clone(&engine));
//!
//! // ... serve traffic
//!
//! // Every later check is rejected as `Blocked`
//! lifecycle.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Without a runtime, call [`AdmissionEngine::run_maintenance`] periodically.
//!
//! ## Fail-Closed Operation
//!
//! An internal failure while deciding rejects the request with
//! `InternalInconsistency` instead of admitting it, and a closed engine
//! rejects everything.

// Domain layer - pure admission logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    audit::AuditEvent,
    behavior::BehaviorState,
    bucket::{Quota, TokenBucket},
    context::{AdmissionContext, Outcome},
    endpoint::{EndpointMatcher, EndpointTable, ExactMatcher, PathMatcher, WildcardMatcher},
    error::{AdmissionError, BlockReason, LimitScope},
    headers::RateLimitHeaders,
    policy::{AdaptiveConfig, EndpointLimit, IpConfig, Policy, PolicyError, TierLimit},
};

pub use application::{
    access::IpAccessControl,
    behavior::BehaviorTracker,
    concurrency::{ConcurrencyLimiter, ConcurrencySlot},
    engine::{
        Admission, AdmissionEngine, AdmissionEngineBuilder, BuildError, EngineStats,
        LimiterFamily, MaintenanceReport, Rejection,
    },
    metrics::{Metrics, MetricsSnapshot},
    ports::{AuditSink, Clock, Storage},
    registry::{CheckResult, LimiterRegistry},
};

#[cfg(feature = "async")]
pub use application::lifecycle::{LifecycleHandle, LifecycleManager, ShutdownError};

pub use infrastructure::{audit::TracingAuditSink, clock::SystemClock, storage::ShardedStorage};
