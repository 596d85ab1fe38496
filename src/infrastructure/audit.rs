//! Audit sink adapters.
//!
//! [`TracingAuditSink`] forwards audit events to `tracing` under the
//! `admission_guard::audit` target, so any subscriber can route them to a
//! security log.

use crate::application::ports::AuditSink;
use crate::domain::audit::AuditEvent;
use tracing::{error, warn};

/// Target used for all audit events.
pub const AUDIT_TARGET: &str = "admission_guard::audit";

/// Audit sink that emits structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    /// Create a new tracing audit sink.
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let name = event.name();
        match event {
            AuditEvent::RateLimitExceeded {
                ip,
                account,
                scope,
                method,
                path,
            } => warn!(
                target: AUDIT_TARGET,
                event = name,
                %ip,
                account = account.as_deref().unwrap_or(""),
                %scope,
                %method,
                %path,
                "rate limit exceeded"
            ),
            AuditEvent::IpAutoBlocked {
                ip,
                violations,
                block_duration,
            } => error!(
                target: AUDIT_TARGET,
                event = name,
                %ip,
                violations,
                block_secs = block_duration.as_secs(),
                "ip auto-blocked after repeated violations"
            ),
            AuditEvent::SuspiciousActivity {
                account,
                suspicion_level,
            } => warn!(
                target: AUDIT_TARGET,
                event = name,
                %account,
                suspicion_level,
                "high failure rate"
            ),
            AuditEvent::BlockedRequest { ip, reason, path } => warn!(
                target: AUDIT_TARGET,
                event = name,
                %ip,
                reason = reason.as_str(),
                %path,
                "blocked request"
            ),
        }
    }
}
