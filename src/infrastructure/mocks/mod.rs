//! Mock implementations for testing.
//!
//! This module provides test doubles for infrastructure adapters,
//! enabling controlled testing of application logic.

pub mod audit;
pub mod clock;

pub use audit::RecordingAuditSink;
pub use clock::MockClock;
