//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::audit::AuditEvent;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Instant, SystemTime};

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;

    /// Get the current wall-clock time, used for header timestamps.
    fn system_now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Port for concurrent key-value storage.
///
/// This abstraction allows the application layer to store and retrieve values
/// without depending on specific concurrent data structure implementations.
/// Infrastructure provides concrete implementations (ShardedStorage).
///
/// Implementations must lock at most the part of the map holding the key
/// being accessed, so operations on unrelated keys do not contend.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// Lookup and insertion are a single atomic step.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Function to create a new value if the key doesn't exist
    /// * `accessor` - Function that gets mutable access to the value
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Clone the value stored under `key`, if any.
    fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone;

    /// Mutate an existing entry without creating one.
    ///
    /// # Returns
    /// `None` if the key is absent, otherwise the accessor's result
    fn update<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R;

    /// Remove `key` if the predicate holds for its current value.
    ///
    /// The predicate runs under the entry's lock, so the check and the
    /// removal cannot be separated by a concurrent writer.
    fn remove_if<F>(&self, key: &K, predicate: F) -> bool
    where
        F: FnOnce(&K, &V) -> bool;

    /// Snapshot of the keys currently stored.
    fn keys(&self) -> Vec<K>;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);
}

/// Port for the audit collaborator.
///
/// Emission is fire-and-forget: implementations must not block, and the
/// engine ignores any failure inside them.
pub trait AuditSink: Send + Sync + Debug {
    /// Record a security-relevant event.
    fn record(&self, event: &AuditEvent);
}
