use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

/// Health transition published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// First failure after a healthy period (count went 0 -> 1).
    BecameUnhealthy { address: String },
    /// A success reset a non-zero failure count.
    Recovered { address: String, previous_failures: u64 },
}

impl HealthEvent {
    pub fn address(&self) -> &str {
        match self {
            Self::BecameUnhealthy { address } | Self::Recovered { address, .. } => address,
        }
    }
}

/// Handle returned by [`FailureTracker::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

pub type HealthSubscriber = Arc<dyn Fn(&HealthEvent) + Send + Sync>;

/// Point-in-time view of a node's failure record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeHealth {
    pub address: String,
    pub failures: u64,
    pub last_checked_at: DateTime<Utc>,
    pub force_check: bool,
}

struct FailureRecord {
    count: AtomicU64,
    last_checked_at: Mutex<DateTime<Utc>>,
    force_check: AtomicBool,
}

impl FailureRecord {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            last_checked_at: Mutex::new(Utc::now()),
            force_check: AtomicBool::new(false),
        }
    }

    fn stamp_checked(&self) {
        let mut guard = self
            .last_checked_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Utc::now();
    }

    fn last_checked_at(&self) -> DateTime<Utc> {
        *self
            .last_checked_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-address failure counters.
///
/// Records are created on first reference and live as long as the tracker,
/// so health history survives topology replacement.
pub struct FailureTracker {
    records: RwLock<HashMap<String, Arc<FailureRecord>>>,
    subscribers: RwLock<Vec<(SubscriptionId, HealthSubscriber)>>,
    max_tolerated_failures: u64,
}

impl FailureTracker {
    /// Creates a tracker with the default "may fail once" tolerance.
    pub fn new() -> Self {
        Self::with_threshold(1)
    }

    pub fn with_threshold(max_tolerated_failures: u64) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
            max_tolerated_failures,
        }
    }

    pub fn max_tolerated_failures(&self) -> u64 {
        self.max_tolerated_failures
    }

    fn record(&self, address: &str) -> Arc<FailureRecord> {
        {
            let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(record) = records.get(address) {
                return Arc::clone(record);
            }
        }
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            records
                .entry(address.to_string())
                .or_insert_with(|| Arc::new(FailureRecord::new())),
        )
    }

    /// Increments the failure count and clears the force-check marker.
    ///
    /// Returns the new count.
    pub fn record_failure(&self, address: &str) -> u64 {
        let record = self.record(address);
        let previous = record.count.fetch_add(1, Ordering::SeqCst);
        record.force_check.store(false, Ordering::SeqCst);
        if previous == 0 {
            self.publish(HealthEvent::BecameUnhealthy {
                address: address.to_string(),
            });
        }
        previous.saturating_add(1)
    }

    /// Resets the failure count and stamps `last_checked_at`.
    pub fn record_success(&self, address: &str) {
        let record = self.record(address);
        let previous = record.count.swap(0, Ordering::SeqCst);
        record.stamp_checked();
        if previous > 0 {
            self.publish(HealthEvent::Recovered {
                address: address.to_string(),
                previous_failures: previous,
            });
        }
    }

    /// True while the node has failed at most `max_tolerated_failures` times in a row.
    pub fn is_healthy_enough(&self, address: &str) -> bool {
        self.failure_count(address) <= self.max_tolerated_failures
    }

    pub fn failure_count(&self, address: &str) -> u64 {
        self.record(address).count.load(Ordering::SeqCst)
    }

    pub fn force_check(&self, address: &str, flag: bool) {
        self.record(address).force_check.store(flag, Ordering::SeqCst);
    }

    pub fn is_force_check(&self, address: &str) -> bool {
        self.record(address).force_check.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, address: &str) -> NodeHealth {
        let record = self.record(address);
        NodeHealth {
            address: address.to_string(),
            failures: record.count.load(Ordering::SeqCst),
            last_checked_at: record.last_checked_at(),
            force_check: record.force_check.load(Ordering::SeqCst),
        }
    }

    /// Every address this tracker has ever seen, sorted.
    pub fn tracked_addresses(&self) -> Vec<String> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut addresses = records.keys().cloned().collect::<Vec<_>>();
        addresses.sort();
        addresses
    }

    pub fn subscribe(&self, subscriber: HealthSubscriber) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, subscriber));
        id
    }

    /// Returns true if the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    fn publish(&self, event: HealthEvent) {
        // Snapshot so subscribers may (un)subscribe from inside a callback.
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect::<Vec<_>>();

        for subscriber in subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(&event))).is_err() {
                warn!(
                    "Health subscriber panicked while handling event for node '{}'",
                    event.address()
                );
            }
        }
    }
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_may_fail_once() {
        let tracker = FailureTracker::new();
        assert!(tracker.is_healthy_enough("http://a"));
        tracker.record_failure("http://a");
        assert!(tracker.is_healthy_enough("http://a"));
        tracker.record_failure("http://a");
        assert!(!tracker.is_healthy_enough("http://a"));
        tracker.record_success("http://a");
        assert!(tracker.is_healthy_enough("http://a"));
        assert_eq!(tracker.failure_count("http://a"), 0);
    }

    #[test]
    fn test_custom_threshold() {
        let tracker = FailureTracker::with_threshold(0);
        tracker.record_failure("http://a");
        assert!(!tracker.is_healthy_enough("http://a"));
    }

    #[test]
    fn test_failure_clears_force_check() {
        let tracker = FailureTracker::new();
        tracker.force_check("http://a", true);
        assert!(tracker.is_force_check("http://a"));
        tracker.record_failure("http://a");
        assert!(!tracker.is_force_check("http://a"));
    }

    #[test]
    fn test_records_are_created_lazily_and_kept() {
        let tracker = FailureTracker::new();
        assert!(tracker.tracked_addresses().is_empty());
        tracker.is_healthy_enough("http://b");
        tracker.record_success("http://a");
        assert_eq!(tracker.tracked_addresses(), vec!["http://a", "http://b"]);
    }

    #[test]
    fn test_success_stamps_last_checked() {
        let tracker = FailureTracker::new();
        let before = tracker.snapshot("http://a").last_checked_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        tracker.record_success("http://a");
        assert!(tracker.snapshot("http://a").last_checked_at > before);
    }
}
