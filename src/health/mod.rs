pub mod failure_tracker;

pub use failure_tracker::{FailureTracker, HealthEvent, HealthSubscriber, NodeHealth, SubscriptionId};
