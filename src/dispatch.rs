use crate::config::DispatcherConfig;
use crate::core::{DispatchError, NodeDescriptor, Result};
use crate::health::{FailureTracker, HealthSubscriber, SubscriptionId};
use crate::topology::{
    InMemoryTopologyCache, NodeRegistry, RefreshOutcome, TopologyCache, TopologyFetcher,
    TopologyRefresher,
};
use async_trait::async_trait;
use chrono::SecondsFormat;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{Level, event};

// Dispatch is split by concern: call policy, shared state, header markers,
// and the two routing strategies behind one front type.
include!("dispatch/policy.rs");
include!("dispatch/context.rs");
include!("dispatch/headers.rs");
include!("dispatch/cluster_aware.rs");
include!("dispatch/replication_aware.rs");
include!("dispatch/dispatcher.rs");
