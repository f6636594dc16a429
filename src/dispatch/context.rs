/// Cluster-wide mutable state shared by a dispatcher and its refresher.
///
/// Owned and injected explicitly: tests build one per case, and several
/// dispatchers may share one when they talk to the same cluster.
#[derive(Clone)]
pub struct ClusterContext {
    pub registry: Arc<NodeRegistry>,
    pub failures: Arc<FailureTracker>,
}

impl ClusterContext {
    pub fn new(config: &DispatcherConfig) -> Self {
        Self {
            registry: Arc::new(NodeRegistry::new()),
            failures: Arc::new(FailureTracker::with_threshold(config.max_tolerated_failures)),
        }
    }

    pub fn subscribe(&self, subscriber: HealthSubscriber) -> SubscriptionId {
        self.failures.subscribe(subscriber)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.failures.unsubscribe(id)
    }
}
