/// How a refresh run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A probed node reported a topology naming a leader.
    LeaderFound,
    /// The local cache already named a leader; no probe was made.
    CachedLeader,
    /// Nobody answered; the primary node was adopted as sole node and leader.
    SingleNodeFallback,
    /// The task was aborted or panicked before finishing.
    Aborted,
}

/// Background, single-flight topology discovery.
///
/// At most one refresh task runs at a time. Each finished run (whatever the
/// outcome) bumps a generation counter that callers can wait on.
pub struct TopologyRefresher {
    registry: Arc<NodeRegistry>,
    failures: Arc<FailureTracker>,
    fetcher: Arc<dyn TopologyFetcher>,
    cache: Arc<dyn TopologyCache>,
    failover_servers: RwLock<Vec<NodeDescriptor>>,
    poll_interval: Duration,
    cache_topology: bool,
    refreshing: AtomicBool,
    first_run: AtomicBool,
    last_updated: StdMutex<Option<DateTime<Utc>>>,
    last_outcome: StdMutex<Option<RefreshOutcome>>,
    generation_tx: watch::Sender<u64>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

/// Releases the single-flight marker however the refresh task ends.
struct RefreshGuard {
    refresher: Arc<TopologyRefresher>,
    outcome: RefreshOutcome,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        let refresher = &self.refresher;
        *refresher
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(self.outcome);
        *refresher
            .last_updated
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        refresher.refreshing.store(false, Ordering::SeqCst);
        refresher
            .generation_tx
            .send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}

impl TopologyRefresher {
    pub fn new(
        registry: Arc<NodeRegistry>,
        failures: Arc<FailureTracker>,
        fetcher: Arc<dyn TopologyFetcher>,
        cache: Arc<dyn TopologyCache>,
        config: &DispatcherConfig,
    ) -> Arc<Self> {
        let (generation_tx, _) = watch::channel(0);
        Arc::new(Self {
            registry,
            failures,
            fetcher,
            cache,
            failover_servers: RwLock::new(config.failover_servers.clone()),
            poll_interval: config.topology_poll_interval,
            cache_topology: config.cache_topology,
            refreshing: AtomicBool::new(false),
            first_run: AtomicBool::new(true),
            last_updated: StdMutex::new(None),
            last_outcome: StdMutex::new(None),
            generation_tx,
            task: StdMutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn failover_servers(&self) -> Vec<NodeDescriptor> {
        self.failover_servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_failover_servers(&self, servers: Vec<NodeDescriptor>) {
        let mut deduped: Vec<NodeDescriptor> = Vec::with_capacity(servers.len());
        for server in servers {
            if !deduped.contains(&server) {
                deduped.push(server);
            }
        }
        *self
            .failover_servers
            .write()
            .unwrap_or_else(PoisonError::into_inner) = deduped;
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn last_outcome(&self) -> Option<RefreshOutcome> {
        *self.last_outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of refresh runs that have finished so far.
    pub fn generation(&self) -> u64 {
        *self.generation_tx.borrow()
    }

    /// Waits until at least `generation` runs have finished.
    ///
    /// Returns the generation reached, or `None` on timeout.
    pub async fn wait_for_generation(&self, generation: u64, wait: Duration) -> Option<u64> {
        let mut generation_rx = self.generation_tx.subscribe();
        let result = timeout(wait, generation_rx.wait_for(|current| *current >= generation)).await;
        match result {
            Ok(Ok(current)) => Some(*current),
            _ => None,
        }
    }

    /// Starts a refresh in the background unless one is already running.
    ///
    /// Returns true when this call started a new run.
    pub fn ensure_fresh(self: &Arc<Self>, primary: &NodeDescriptor) -> bool {
        // Held until the handle is stored, so a later run's handle is never
        // replaced by an earlier one.
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let mut guard = RefreshGuard {
            refresher: Arc::clone(self),
            outcome: RefreshOutcome::Aborted,
        };
        let refresher = Arc::clone(self);
        let primary = primary.clone();
        let span = info_span!("topology.refresh", primary = %primary.address);
        let handle = tokio::spawn(
            async move {
                guard.outcome = refresher.run(&primary).await;
                drop(guard);
            }
            .instrument(span),
        );

        *task = Some(handle);
        true
    }

    /// Aborts an in-flight refresh. The single-flight marker is released once
    /// the task is torn down.
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    async fn run(&self, primary: &NodeDescriptor) -> RefreshOutcome {
        let identity = cluster_identity_hash(primary);

        if self.first_run.swap(false, Ordering::SeqCst)
            && self.cache_topology
            && self.adopt_cached_topology(&identity).await
        {
            return RefreshOutcome::CachedLeader;
        }

        let mut failover_probing = false;
        loop {
            let candidates = self.probe_candidates(primary, failover_probing);
            event!(
                Level::DEBUG,
                candidates = candidates.len(),
                failover_probing,
                "probing topology"
            );

            let answers = self.probe(&candidates).await;
            let Some((responder, document)) = select_authoritative(answers) else {
                if !failover_probing && !self.failover_servers().is_empty() {
                    event!(Level::INFO, "no node answered, probing failover servers");
                    failover_probing = true;
                    continue;
                }
                event!(
                    Level::WARN,
                    "no node answered topology probe, falling back to primary as sole node"
                );
                self.registry
                    .replace_topology(vec![primary.clone()], Some(primary.clone()));
                return RefreshOutcome::SingleNodeFallback;
            };

            let nodes = document.to_nodes(&responder);
            if self.cache_topology {
                if let Err(err) = self.cache.save(&identity, &nodes).await {
                    event!(Level::WARN, error = %err, "failed to save topology cache");
                }
            }

            let leader = nodes.iter().find(|node| node.is_leader()).cloned();
            self.registry.replace_topology(nodes, leader.clone());

            if let Some(leader) = leader {
                event!(
                    Level::INFO,
                    leader = %leader.address,
                    responder = %responder.address,
                    commit_index = document.cluster_commit_index,
                    "topology leader adopted"
                );
                return RefreshOutcome::LeaderFound;
            }

            event!(
                Level::DEBUG,
                commit_index = document.cluster_commit_index,
                "topology has no leader yet, polling again"
            );
            sleep(self.poll_interval).await;
        }
    }

    /// Adopts a cached node list. Returns true when it named a leader.
    async fn adopt_cached_topology(&self, identity: &str) -> bool {
        let cached = match self.cache.load(identity).await {
            Ok(Some(nodes)) if !nodes.is_empty() => nodes,
            Ok(_) => return false,
            Err(err) => {
                event!(Level::WARN, error = %err, "failed to load topology cache");
                return false;
            }
        };

        let leader = cached.iter().find(|node| node.is_leader()).cloned();
        let found = leader.is_some();
        event!(
            Level::INFO,
            nodes = cached.len(),
            has_leader = found,
            "loaded cached topology"
        );
        self.registry.replace_topology(cached, leader);
        found
    }

    fn probe_candidates(&self, primary: &NodeDescriptor, failover_probing: bool) -> Vec<NodeDescriptor> {
        let mut candidates = self.registry.current_nodes();
        if candidates.is_empty() {
            candidates.push(primary.clone());
        }
        if failover_probing {
            let extra = std::iter::once(primary.clone()).chain(self.failover_servers());
            for node in extra {
                if !candidates.contains(&node) {
                    candidates.push(node);
                }
            }
        }
        candidates
    }

    async fn probe(&self, candidates: &[NodeDescriptor]) -> Vec<(NodeDescriptor, TopologyDocument)> {
        let probes = candidates.iter().map(|node| async move {
            (node.clone(), self.fetcher.fetch_topology(node).await)
        });

        let mut answers = Vec::new();
        for (node, result) in join_all(probes).await {
            match result {
                Ok(document) => {
                    self.failures.record_success(&node.address);
                    answers.push((node, document));
                }
                Err(err) => {
                    event!(
                        Level::DEBUG,
                        node = %node.address,
                        error = %err,
                        "topology probe failed"
                    );
                }
            }
        }
        answers
    }
}

/// Picks the answer with the strictly highest commit index; ties keep the first seen.
pub fn select_authoritative(
    answers: Vec<(NodeDescriptor, TopologyDocument)>,
) -> Option<(NodeDescriptor, TopologyDocument)> {
    let mut best: Option<(NodeDescriptor, TopologyDocument)> = None;
    for (node, document) in answers {
        let newer = best
            .as_ref()
            .map(|(_, current)| document.cluster_commit_index > current.cluster_commit_index)
            .unwrap_or(true);
        if newer {
            best = Some((node, document));
        }
    }
    best
}
