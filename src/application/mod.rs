//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Keyed limiter registries (one per limiter family)
//! - Behavior tracking, IP access control and concurrency accounting
//! - The admission decision engine
//! - Background maintenance (with the `async` feature)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod access;
pub mod behavior;
pub mod concurrency;
pub mod engine;
#[cfg(feature = "async")]
pub mod lifecycle;
pub mod metrics;
pub mod ports;
pub mod registry;
