use crate::config::DispatcherConfig;
use crate::core::{DispatchError, NodeDescriptor, Result, TopologyDocument};
use crate::health::FailureTracker;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

// Topology handling is split by responsibility: shared node state, the
// collaborator seams, their stock implementations and the refresh loop.
include!("topology/registry.rs");
include!("topology/collaborators.rs");
include!("topology/caches.rs");
include!("topology/in_memory_fetcher.rs");
include!("topology/http_fetcher.rs");
include!("topology/refresher.rs");
