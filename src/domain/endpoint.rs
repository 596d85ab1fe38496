//! Endpoint override resolution.
//!
//! Overrides are resolved by a prioritized list of matchers evaluated in
//! order; the first matcher that finds a rule wins. The default order is
//! exact method and path, then path with any method, then the global `"*"`
//! wildcard. Custom matchers can be added for richer patterns.

use crate::domain::policy::EndpointLimit;
use std::fmt::Debug;

/// Path pattern that matches every request.
pub const WILDCARD_PATH: &str = "*";

/// One step of endpoint resolution.
pub trait EndpointMatcher: Send + Sync + Debug {
    /// Find the rule this matcher selects for a request, if any.
    fn find<'a>(
        &self,
        rules: &'a [EndpointLimit],
        method: &str,
        path: &str,
    ) -> Option<&'a EndpointLimit>;
}

/// Matches rules that name both the method and the exact path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatcher;

impl EndpointMatcher for ExactMatcher {
    fn find<'a>(
        &self,
        rules: &'a [EndpointLimit],
        method: &str,
        path: &str,
    ) -> Option<&'a EndpointLimit> {
        rules.iter().find(|rule| {
            rule.path == path
                && rule
                    .method
                    .as_deref()
                    .is_some_and(|m| m.eq_ignore_ascii_case(method))
        })
    }
}

/// Matches rules for the exact path that apply to any method.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathMatcher;

impl EndpointMatcher for PathMatcher {
    fn find<'a>(
        &self,
        rules: &'a [EndpointLimit],
        _method: &str,
        path: &str,
    ) -> Option<&'a EndpointLimit> {
        rules
            .iter()
            .find(|rule| rule.method.is_none() && rule.path == path)
    }
}

/// Matches the global `"*"` rule, preferring one bound to the request method.
#[derive(Debug, Clone, Copy, Default)]
pub struct WildcardMatcher;

impl EndpointMatcher for WildcardMatcher {
    fn find<'a>(
        &self,
        rules: &'a [EndpointLimit],
        method: &str,
        _path: &str,
    ) -> Option<&'a EndpointLimit> {
        let mut any_method = None;
        for rule in rules.iter().filter(|rule| rule.path == WILDCARD_PATH) {
            match rule.method.as_deref() {
                Some(m) if m.eq_ignore_ascii_case(method) => return Some(rule),
                Some(_) => {}
                None => any_method = any_method.or(Some(rule)),
            }
        }
        any_method
    }
}

/// Endpoint rules plus the matchers used to resolve them.
#[derive(Debug)]
pub struct EndpointTable {
    rules: Vec<EndpointLimit>,
    matchers: Vec<Box<dyn EndpointMatcher>>,
}

impl EndpointTable {
    /// Create a table with the default matcher order.
    pub fn new(rules: Vec<EndpointLimit>) -> Self {
        Self::with_matchers(rules, default_matchers())
    }

    /// Create a table with a custom matcher order.
    pub fn with_matchers(rules: Vec<EndpointLimit>, matchers: Vec<Box<dyn EndpointMatcher>>) -> Self {
        Self { rules, matchers }
    }

    /// Resolve the most specific rule for a request.
    pub fn resolve(&self, method: &str, path: &str) -> Option<&EndpointLimit> {
        self.matchers
            .iter()
            .find_map(|matcher| matcher.find(&self.rules, method, path))
    }

    /// All configured rules.
    pub fn rules(&self) -> &[EndpointLimit] {
        &self.rules
    }
}

/// Exact, then path-only, then wildcard.
pub fn default_matchers() -> Vec<Box<dyn EndpointMatcher>> {
    vec![
        Box::new(ExactMatcher),
        Box::new(PathMatcher),
        Box::new(WildcardMatcher),
    ]
}
