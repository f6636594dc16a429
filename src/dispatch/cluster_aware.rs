/// Routes operations using leader discovery against the cluster itself.
///
/// Writes go to the believed leader; reads may be striped across all nodes;
/// failover policies scan healthy nodes when no leader is known. A
/// retryable failure drops the leader belief and retries within the budget.
pub struct ClusterAwareDispatcher {
    config: DispatcherConfig,
    context: ClusterContext,
    refresher: Arc<TopologyRefresher>,
}

impl ClusterAwareDispatcher {
    /// Creates a dispatcher with a fresh context and an in-memory topology cache.
    pub fn new(config: DispatcherConfig, fetcher: Arc<dyn TopologyFetcher>) -> Result<Self> {
        let context = ClusterContext::new(&config);
        Self::with_context(config, context, fetcher, Arc::new(InMemoryTopologyCache::new()))
    }

    pub fn with_context(
        config: DispatcherConfig,
        context: ClusterContext,
        fetcher: Arc<dyn TopologyFetcher>,
        cache: Arc<dyn TopologyCache>,
    ) -> Result<Self> {
        config.validate()?;
        let refresher = TopologyRefresher::new(
            Arc::clone(&context.registry),
            Arc::clone(&context.failures),
            fetcher,
            cache,
            &config,
        );
        Ok(Self {
            config,
            context,
            refresher,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn context(&self) -> &ClusterContext {
        &self.context
    }

    pub fn refresher(&self) -> &Arc<TopologyRefresher> {
        &self.refresher
    }

    pub fn current_nodes(&self) -> Vec<NodeDescriptor> {
        self.context.registry.current_nodes()
    }

    pub fn current_leader(&self) -> Option<NodeDescriptor> {
        self.context.registry.current_leader()
    }

    pub fn failover_servers(&self) -> Vec<NodeDescriptor> {
        self.refresher.failover_servers()
    }

    pub fn set_failover_servers(&self, servers: Vec<NodeDescriptor>) {
        self.refresher.set_failover_servers(servers);
    }

    pub fn read_striping_base(&self, increment: bool) -> usize {
        self.context.registry.read_striping_base(increment)
    }

    pub fn add_headers(&self, _node: &NodeDescriptor, options: &DispatchOptions, headers: &mut HeaderMap) {
        add_cluster_headers(options.behavior, headers);
    }

    /// Kicks a topology refresh and waits for a run to finish.
    ///
    /// Joins the in-flight run when one is already going.
    pub async fn force_topology_refresh(&self) -> Result<RefreshOutcome> {
        let target = self.refresher.generation().wrapping_add(1);
        self.refresher.ensure_fresh(&self.config.primary);
        if self
            .refresher
            .wait_for_generation(target, self.config.leader_wait_timeout)
            .await
            .is_none()
        {
            return Err(DispatchError::ClusterUnreachable(format!(
                "topology refresh did not finish within {:?}",
                self.config.leader_wait_timeout
            )));
        }
        Ok(self
            .refresher
            .last_outcome()
            .unwrap_or(RefreshOutcome::Aborted))
    }

    /// Runs `operation` against the node chosen for `options`, retrying on
    /// another node after connectivity or leadership failures.
    ///
    /// # Examples
    ///
    /// ```
    /// # use clusterroute::{ClusterAwareDispatcher, ClusterBehavior, DispatchOptions, DispatcherConfig};
    /// # use clusterroute::{InMemoryTopologyFetcher, TopologyDocument};
    /// # use std::sync::Arc;
    /// # tokio_test::block_on(async {
    /// let fetcher = InMemoryTopologyFetcher::new();
    /// fetcher
    ///     .set_topology("http://a", TopologyDocument::new(1).responder_is_leader(true))
    ///     .await;
    /// let dispatcher =
    ///     ClusterAwareDispatcher::new(DispatcherConfig::new("http://a"), Arc::new(fetcher)).unwrap();
    ///
    /// let options = DispatchOptions::put(ClusterBehavior::ReadFromLeaderWriteToLeader);
    /// let served = dispatcher
    ///     .execute(&options, |node| async move { Ok(node.address) })
    ///     .await
    ///     .unwrap();
    /// assert_eq!(served, "http://a");
    /// # });
    /// ```
    pub async fn execute<T, F, Fut>(&self, options: &DispatchOptions, operation: F) -> Result<T>
    where
        F: Fn(NodeDescriptor) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_retries(options, &operation, self.config.max_retries)
            .await
    }

    /// Like [`execute`](Self::execute) with an explicit retry budget.
    pub async fn execute_with_retries<T, F, Fut>(
        &self,
        options: &DispatchOptions,
        operation: &F,
        retries_remaining: i32,
    ) -> Result<T>
    where
        F: Fn(NodeDescriptor) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries_remaining = retries_remaining;
        let mut last_error: Option<DispatchError> = None;
        loop {
            if retries_remaining < 0 {
                let detail = last_error
                    .map(|err| err.to_string())
                    .unwrap_or_else(|| "no attempt was made".to_string());
                return Err(DispatchError::ClusterUnreachable(format!(
                    "retry budget exhausted for {} request: {}",
                    options.method, detail
                )));
            }

            let Some(node) = self.resolve_target(options).await? else {
                return self.failover_scan(options, operation).await;
            };

            match operation(node.clone()).await {
                Ok(value) => {
                    self.context.failures.record_success(&node.address);
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    self.context.registry.clear_leader();
                    let failures = self.context.failures.record_failure(&node.address);
                    event!(
                        Level::WARN,
                        node = %node.address,
                        failures,
                        retries_remaining,
                        error = %err,
                        "retryable node failure, dropping leader"
                    );
                    last_error = Some(err);
                    retries_remaining -= 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Leader (or striped read node) for this call; `None` means "scan instead".
    async fn resolve_target(&self, options: &DispatchOptions) -> Result<Option<NodeDescriptor>> {
        let registry = &self.context.registry;
        let mut node = registry.current_leader();

        if node.is_none() {
            self.refresher.ensure_fresh(&self.config.primary);
            if options.behavior.allows_failover() {
                if registry.is_empty() {
                    node = self.await_leader(self.config.failover_leader_wait).await;
                }
            } else {
                node = self.await_leader(self.config.leader_wait_timeout).await;
                if node.is_none() {
                    return Err(DispatchError::ClusterUnreachable(format!(
                        "no leader was selected within {:?}",
                        self.config.leader_wait_timeout
                    )));
                }
            }
        }

        if node.is_some() && options.is_read() && options.behavior.reads_from_all() {
            let stripe = registry.read_striping_base(options.increment_read_stripe);
            if let Some(candidate) = registry.node_for_stripe(stripe) {
                if self.context.failures.is_healthy_enough(&candidate.address) {
                    node = Some(candidate);
                }
            }
        }

        Ok(node)
    }

    /// Waits for the leader gate, restarting discovery whenever a refresh run
    /// ends while the leader is still unknown (it may have been cleared by a
    /// concurrent failure just as the run finished).
    async fn await_leader(&self, wait: Duration) -> Option<NodeDescriptor> {
        let registry = &self.context.registry;
        let deadline = Instant::now() + wait;
        loop {
            let generation = self.refresher.generation();
            self.refresher.ensure_fresh(&self.config.primary);
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return registry.current_leader();
            }
            tokio::select! {
                leader = registry.await_leader(remaining) => return leader,
                _ = self.refresher.wait_for_generation(generation.wrapping_add(1), remaining) => {
                    if let Some(leader) = registry.current_leader() {
                        return Some(leader);
                    }
                }
            }
        }
    }

    async fn failover_scan<T, F, Fut>(&self, options: &DispatchOptions, operation: &F) -> Result<T>
    where
        F: Fn(NodeDescriptor) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let nodes = self.context.registry.current_nodes();
        let mut attempted = 0usize;
        let mut last_error: Option<DispatchError> = None;

        for node in nodes.iter() {
            if !self.context.failures.is_healthy_enough(&node.address) {
                event!(Level::DEBUG, node = %node.address, "failover scan skipping unhealthy node");
                continue;
            }
            attempted += 1;
            match operation(node.clone()).await {
                Ok(value) => {
                    self.context.failures.record_success(&node.address);
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    self.context.failures.record_failure(&node.address);
                    event!(
                        Level::WARN,
                        node = %node.address,
                        error = %err,
                        "failover scan advancing to next node"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(DispatchError::ClusterUnreachable(format!(
            "failover exhausted for {} request: {} known nodes, {} attempted{}",
            options.method,
            nodes.len(),
            attempted,
            last_error
                .map(|err| format!(", last error: {}", err))
                .unwrap_or_default()
        )))
    }
}

/// Dropping the dispatcher stops its background refresh.
impl Drop for ClusterAwareDispatcher {
    fn drop(&mut self) {
        self.refresher.shutdown();
    }
}
