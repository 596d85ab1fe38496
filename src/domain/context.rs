//! Request-side inputs to the engine.

use std::net::IpAddr;

/// Everything the engine needs to know about one inbound request.
///
/// Built by the transport layer after authentication has resolved the
/// caller's account and tier, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionContext {
    pub ip: IpAddr,
    pub account_id: Option<String>,
    pub tier: Option<String>,
    pub method: String,
    pub path: String,
}

impl AdmissionContext {
    /// Context for an anonymous request.
    pub fn new(ip: IpAddr, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            ip,
            account_id: None,
            tier: None,
            method: method.into(),
            path: path.into(),
        }
    }

    /// Attach a resolved account and its tier.
    pub fn with_account(mut self, account_id: impl Into<String>, tier: Option<&str>) -> Self {
        self.account_id = Some(account_id.into()).filter(|id| !id.is_empty());
        self.tier = tier.map(str::to_owned).filter(|t| !t.is_empty());
        self
    }

    /// Whether an account identity is present.
    pub fn is_authenticated(&self) -> bool {
        self.account_id.is_some()
    }
}

/// How an admitted request finished, as reported by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx or 3xx
    Success,
    /// 4xx or 5xx other than an authentication failure
    Failure,
    /// Authentication was refused
    AuthFailure,
}

impl Outcome {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Outcome::AuthFailure,
            s if s < 400 => Outcome::Success,
            _ => Outcome::Failure,
        }
    }
}
