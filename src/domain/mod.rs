//! Domain layer - pure admission logic with no shared state.
//!
//! This layer contains the core concepts and invariants of admission control:
//! - Policy model and validation
//! - Token bucket arithmetic
//! - Trust and suspicion scoring
//! - Endpoint override resolution
//! - Errors, audit events and response headers
//!
//! All types in this layer are pure and easily testable.

pub mod audit;
pub mod behavior;
pub mod bucket;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod headers;
pub mod policy;
