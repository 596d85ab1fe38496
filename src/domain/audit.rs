//! Security-relevant events emitted by the engine.

use crate::domain::error::{BlockReason, LimitScope};
use std::net::IpAddr;
use std::time::Duration;

/// An event handed to the audit collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    /// A bucket or concurrency cap rejected a request
    RateLimitExceeded {
        ip: IpAddr,
        account: Option<String>,
        scope: LimitScope,
        method: String,
        path: String,
    },
    /// An IP crossed the violation threshold and is now blocked
    IpAutoBlocked {
        ip: IpAddr,
        violations: u32,
        block_duration: Duration,
    },
    /// An account's suspicion level reached the reporting level
    SuspiciousActivity {
        account: String,
        suspicion_level: u32,
    },
    /// A request from a blocked IP was rejected
    BlockedRequest {
        ip: IpAddr,
        reason: BlockReason,
        path: String,
    },
}

impl AuditEvent {
    /// Stable event name.
    pub fn name(&self) -> &'static str {
        match self {
            AuditEvent::RateLimitExceeded { .. } => "rate_limit_exceeded",
            AuditEvent::IpAutoBlocked { .. } => "ip_auto_blocked",
            AuditEvent::SuspiciousActivity { .. } => "suspicious_activity",
            AuditEvent::BlockedRequest { .. } => "blocked_request",
        }
    }
}
