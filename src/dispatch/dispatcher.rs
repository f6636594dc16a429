/// The routing strategy a client was built with.
///
/// Chosen once at construction; both variants expose the same surface.
pub enum Dispatcher {
    ClusterAware(ClusterAwareDispatcher),
    ReplicationAware(ReplicationAwareDispatcher),
}

impl Dispatcher {
    /// Cluster-aware strategy with default context and in-memory topology cache.
    pub fn cluster_aware(config: DispatcherConfig, fetcher: Arc<dyn TopologyFetcher>) -> Result<Self> {
        Ok(Self::ClusterAware(ClusterAwareDispatcher::new(config, fetcher)?))
    }

    pub fn replication_aware(
        config: DispatcherConfig,
        informer: Arc<dyn ReplicationInformer>,
        failover_behavior: FailoverBehavior,
    ) -> Result<Self> {
        Ok(Self::ReplicationAware(ReplicationAwareDispatcher::new(
            config,
            informer,
            failover_behavior,
        )?))
    }

    pub fn context(&self) -> &ClusterContext {
        match self {
            Self::ClusterAware(inner) => inner.context(),
            Self::ReplicationAware(inner) => inner.context(),
        }
    }

    pub async fn execute<T, F, Fut>(&self, options: &DispatchOptions, operation: F) -> Result<T>
    where
        F: Fn(NodeDescriptor) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self {
            Self::ClusterAware(inner) => inner.execute(options, operation).await,
            Self::ReplicationAware(inner) => inner.execute(options, operation).await,
        }
    }

    pub fn add_headers(&self, node: &NodeDescriptor, options: &DispatchOptions, headers: &mut HeaderMap) {
        match self {
            Self::ClusterAware(inner) => inner.add_headers(node, options, headers),
            Self::ReplicationAware(inner) => inner.add_headers(node, options, headers),
        }
    }

    /// Response headers only carry information for the replication-aware strategy.
    pub fn apply_response_headers(&self, node: &NodeDescriptor, headers: &HeaderMap) {
        if let Self::ReplicationAware(inner) = self {
            inner.apply_response_headers(node, headers);
        }
    }

    pub fn current_nodes(&self) -> Vec<NodeDescriptor> {
        match self {
            Self::ClusterAware(inner) => inner.current_nodes(),
            Self::ReplicationAware(inner) => inner.current_nodes(),
        }
    }

    pub fn current_leader(&self) -> Option<NodeDescriptor> {
        match self {
            Self::ClusterAware(inner) => inner.current_leader(),
            Self::ReplicationAware(inner) => inner.current_leader(),
        }
    }

    pub fn failover_servers(&self) -> Vec<NodeDescriptor> {
        match self {
            Self::ClusterAware(inner) => inner.failover_servers(),
            Self::ReplicationAware(inner) => inner.failover_servers(),
        }
    }

    pub fn set_failover_servers(&self, servers: Vec<NodeDescriptor>) {
        match self {
            Self::ClusterAware(inner) => inner.set_failover_servers(servers),
            Self::ReplicationAware(inner) => inner.set_failover_servers(servers),
        }
    }

    pub fn read_striping_base(&self, increment: bool) -> usize {
        match self {
            Self::ClusterAware(inner) => inner.read_striping_base(increment),
            Self::ReplicationAware(inner) => inner.read_striping_base(increment),
        }
    }

    pub fn subscribe(&self, subscriber: HealthSubscriber) -> SubscriptionId {
        self.context().subscribe(subscriber)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.context().unsubscribe(id)
    }

    /// Forces topology rediscovery. Only the cluster-aware strategy has a
    /// topology to refresh.
    pub async fn force_topology_refresh(&self) -> Result<RefreshOutcome> {
        match self {
            Self::ClusterAware(inner) => inner.force_topology_refresh().await,
            Self::ReplicationAware(_) => Err(DispatchError::Configuration(
                "topology refresh is not supported in replication-aware mode".to_string(),
            )),
        }
    }

    /// Stops background work. In-flight calls are not affected.
    pub fn shutdown(&self) {
        if let Self::ClusterAware(inner) = self {
            inner.refresher().shutdown();
        }
    }
}
