//! Recording audit sink for testing.

use crate::application::ports::AuditSink;
use crate::domain::audit::AuditEvent;
use std::sync::{Arc, Mutex};

/// Audit sink that keeps every event in memory.
///
/// All clones share the same event list.
#[derive(Debug, Clone, Default)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAuditSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .expect("RecordingAuditSink mutex poisoned - a test thread panicked while holding the lock")
            .clone()
    }

    /// Count recorded events with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .expect("RecordingAuditSink mutex poisoned - a test thread panicked while holding the lock")
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }

    /// Forget all recorded events.
    pub fn clear(&self) {
        self.events
            .lock()
            .expect("RecordingAuditSink mutex poisoned - a test thread panicked while holding the lock")
            .clear();
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events
            .lock()
            .expect("RecordingAuditSink mutex poisoned - a test thread panicked while holding the lock")
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_and_counts() {
        let sink = RecordingAuditSink::new();
        let clone = sink.clone();

        clone.record(&AuditEvent::SuspiciousActivity {
            account: "acct".to_string(),
            suspicion_level: 3,
        });

        assert_eq!(sink.count("suspicious_activity"), 1);
        assert_eq!(sink.count("ip_auto_blocked"), 0);

        sink.clear();
        assert!(sink.events().is_empty());
    }
}
