//! Admission error taxonomy.

use std::fmt;
use std::time::Duration;

/// Which limiter rejected a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitScope {
    /// Per-endpoint, per-caller bucket
    Endpoint { method: String, path: String },
    /// Per-IP bucket
    Ip,
    /// Per-account bucket of the given tier
    Account { tier: String },
    /// Per-account in-flight request cap of the given tier
    Concurrency { tier: String },
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitScope::Endpoint { path, .. } => write!(f, "endpoint:{}", path),
            LimitScope::Ip => write!(f, "ip"),
            LimitScope::Account { tier } => write!(f, "account:{}", tier),
            LimitScope::Concurrency { tier } => write!(f, "concurrency:{}", tier),
        }
    }
}

/// Why a caller is blocked outright.
///
/// Only surfaced to audit logs; never rendered to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Matched a static deny-list entry
    Blacklisted,
    /// Temporarily blocked after repeated violations
    AutoBlocked,
    /// The engine has been closed
    ShuttingDown,
}

impl BlockReason {
    /// Stable name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::Blacklisted => "blacklisted",
            BlockReason::AutoBlocked => "auto_blocked",
            BlockReason::ShuttingDown => "shutting_down",
        }
    }
}

/// Reasons a request is not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// A bucket is empty; the caller may retry later
    RateLimitExceeded {
        scope: LimitScope,
        retry_after: Duration,
    },
    /// The caller is blocked regardless of bucket state
    Blocked {
        reason: BlockReason,
        retry_after: Duration,
    },
    /// Engine state is inconsistent; the request is denied
    InternalInconsistency(String),
}

impl AdmissionError {
    /// Suggested wait before retrying.
    pub fn retry_after(&self) -> Duration {
        match self {
            AdmissionError::RateLimitExceeded { retry_after, .. }
            | AdmissionError::Blocked { retry_after, .. } => *retry_after,
            AdmissionError::InternalInconsistency(_) => Duration::from_secs(1),
        }
    }

    /// Check if this is a rate limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AdmissionError::RateLimitExceeded { .. })
    }

    /// Check if this is a block.
    pub fn is_blocked(&self) -> bool {
        matches!(self, AdmissionError::Blocked { .. })
    }
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::RateLimitExceeded { retry_after, .. } => write!(
                f,
                "rate limit exceeded, retry after {}s",
                retry_after.as_secs()
            ),
            AdmissionError::Blocked { .. } => write!(f, "request blocked"),
            AdmissionError::InternalInconsistency(detail) => {
                write!(f, "internal inconsistency: {}", detail)
            }
        }
    }
}

impl std::error::Error for AdmissionError {}
