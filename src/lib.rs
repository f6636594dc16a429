// ============================================================================
// ClusterRoute Library
// ============================================================================

pub mod config;
pub mod core;
pub mod dispatch;
pub mod health;
pub mod topology;

// Re-export main types for convenience
pub use crate::config::DispatcherConfig;
pub use crate::core::{
    ClusterInfo, Credentials, DispatchError, ErrorKind, NodeDescriptor, Result,
    TopologyDestination, TopologyDocument,
};
pub use crate::dispatch::{
    ClusterAwareDispatcher, ClusterBehavior, ClusterContext, DispatchOptions, Dispatcher,
    FailoverBehavior, ReplicationAwareDispatcher, ReplicationInformer, is_read_method,
};
pub use crate::health::{FailureTracker, HealthEvent, HealthSubscriber, NodeHealth, SubscriptionId};
pub use crate::topology::{
    FileTopologyCache, HttpTopologyFetcher, InMemoryTopologyCache, InMemoryTopologyFetcher, NodeRegistry,
    RefreshOutcome, TopologyCache, TopologyFetcher, TopologyRefresher, cluster_identity_hash,
    select_authoritative,
};
