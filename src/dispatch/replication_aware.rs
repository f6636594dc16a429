/// How often the replication-aware strategy asks its informer for fresh replica info.
pub const REPLICATION_INFO_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// External source of master/replica topology for the legacy routing mode.
#[async_trait]
pub trait ReplicationInformer: Send + Sync {
    /// Refreshes the replica list from `primary`. Best effort.
    async fn update_replication_information(&self, primary: &NodeDescriptor) -> Result<()>;

    /// Replicas of the primary, in preference order, primary excluded.
    fn replication_destinations(&self) -> Vec<NodeDescriptor>;

    fn failover_servers(&self) -> Vec<NodeDescriptor>;

    fn set_failover_servers(&self, servers: Vec<NodeDescriptor>);
}

/// Routes operations to a fixed primary, failing over to replicas reported by
/// a [`ReplicationInformer`] according to a [`FailoverBehavior`].
pub struct ReplicationAwareDispatcher {
    config: DispatcherConfig,
    context: ClusterContext,
    informer: Arc<dyn ReplicationInformer>,
    failover_behavior: FailoverBehavior,
    last_replication_update: Mutex<Option<Instant>>,
}

impl ReplicationAwareDispatcher {
    pub fn new(
        config: DispatcherConfig,
        informer: Arc<dyn ReplicationInformer>,
        failover_behavior: FailoverBehavior,
    ) -> Result<Self> {
        let context = ClusterContext::new(&config);
        Self::with_context(config, context, informer, failover_behavior)
    }

    pub fn with_context(
        config: DispatcherConfig,
        context: ClusterContext,
        informer: Arc<dyn ReplicationInformer>,
        failover_behavior: FailoverBehavior,
    ) -> Result<Self> {
        config.validate()?;
        if !config.failover_servers.is_empty() {
            informer.set_failover_servers(config.failover_servers.clone());
        }
        Ok(Self {
            config,
            context,
            informer,
            failover_behavior,
            last_replication_update: Mutex::new(None),
        })
    }

    pub fn context(&self) -> &ClusterContext {
        &self.context
    }

    pub fn primary(&self) -> &NodeDescriptor {
        &self.config.primary
    }

    pub fn failover_behavior(&self) -> FailoverBehavior {
        self.failover_behavior
    }

    /// Primary followed by the informer's replicas.
    pub fn current_nodes(&self) -> Vec<NodeDescriptor> {
        let mut nodes = vec![self.config.primary.clone()];
        for node in self.informer.replication_destinations() {
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }
        nodes
    }

    /// The primary plays the leader role in this mode.
    pub fn current_leader(&self) -> Option<NodeDescriptor> {
        Some(self.config.primary.clone())
    }

    pub fn failover_servers(&self) -> Vec<NodeDescriptor> {
        self.informer.failover_servers()
    }

    pub fn set_failover_servers(&self, servers: Vec<NodeDescriptor>) {
        self.informer.set_failover_servers(servers);
    }

    pub fn read_striping_base(&self, increment: bool) -> usize {
        self.context.registry.read_striping_base(increment)
    }

    pub fn add_headers(&self, node: &NodeDescriptor, options: &DispatchOptions, headers: &mut HeaderMap) {
        add_cluster_headers(options.behavior, headers);
        if *node != self.config.primary {
            add_primary_health_headers(&self.config.primary, &self.context.failures, headers);
        }
    }

    /// Stores the force-check marker a node sent back about the primary.
    pub fn apply_response_headers(&self, _node: &NodeDescriptor, headers: &HeaderMap) {
        if let Some(flag) = force_check_from_response(headers) {
            self.context
                .failures
                .force_check(&self.config.primary.address, flag);
        }
    }

    /// Refreshes replica info when the last refresh is older than
    /// [`REPLICATION_INFO_REFRESH_INTERVAL`]. Concurrent callers skip instead of waiting.
    pub async fn update_replication_information_if_needed(&self) {
        let Ok(mut last_update) = self.last_replication_update.try_lock() else {
            return;
        };
        let due = last_update
            .map(|at| at.elapsed() >= REPLICATION_INFO_REFRESH_INTERVAL)
            .unwrap_or(true);
        if !due {
            return;
        }
        if let Err(err) = self
            .informer
            .update_replication_information(&self.config.primary)
            .await
        {
            event!(Level::WARN, error = %err, "failed to update replication information");
        }
        *last_update = Some(Instant::now());
    }

    /// Runs `operation` on the primary first, then on each replica the
    /// [`FailoverBehavior`] allows, skipping unhealthy nodes.
    ///
    /// Every candidate is tried at most once; this walk replaces the
    /// `max_retries` budget, which only the cluster-aware strategy uses.
    pub async fn execute<T, F, Fut>(&self, options: &DispatchOptions, operation: F) -> Result<T>
    where
        F: Fn(NodeDescriptor) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.update_replication_information_if_needed().await;

        let candidates = self.candidates(options);
        let primary = &self.config.primary;
        let mut tried = 0usize;
        let mut last_error: Option<DispatchError> = None;

        for node in candidates.iter() {
            if !self.context.failures.is_healthy_enough(&node.address) {
                event!(Level::DEBUG, node = %node.address, "skipping unhealthy node");
                continue;
            }
            tried += 1;
            match self.attempt(node, &operation).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => last_error = Some(err),
                Err(err) => return Err(err),
            }
        }

        // Everyone was skipped as unhealthy: give the primary one more chance
        // so it can recover without an out-of-band check.
        if tried == 0 {
            match self.attempt(primary, &operation).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => last_error = Some(err),
                Err(err) => return Err(err),
            }
        }

        Err(DispatchError::ClusterUnreachable(format!(
            "all {} replication candidates failed for {} request{}",
            candidates.len(),
            options.method,
            last_error
                .map(|err| format!(", last error: {}", err))
                .unwrap_or_default()
        )))
    }

    async fn attempt<T, F, Fut>(&self, node: &NodeDescriptor, operation: &F) -> Result<T>
    where
        F: Fn(NodeDescriptor) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match operation(node.clone()).await {
            Ok(value) => {
                self.context.failures.record_success(&node.address);
                Ok(value)
            }
            Err(err) => {
                if err.is_retryable() {
                    self.context.failures.record_failure(&node.address);
                    if *node == self.config.primary {
                        self.context.failures.force_check(&node.address, true);
                    }
                    event!(
                        Level::WARN,
                        node = %node.address,
                        error = %err,
                        "replication candidate failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Ordered nodes to try for this call.
    fn candidates(&self, options: &DispatchOptions) -> Vec<NodeDescriptor> {
        let is_read = options.is_read();
        let mut nodes = self.current_nodes();

        if is_read && self.failover_behavior == FailoverBehavior::ReadFromAllServers {
            let stripe = self
                .context
                .registry
                .read_striping_base(options.increment_read_stripe);
            let start = stripe % nodes.len();
            nodes.rotate_left(start);
            return nodes;
        }

        if !self.failover_behavior.allows_secondary(is_read) {
            nodes.truncate(1);
        }
        nodes
    }
}
