#[derive(Debug, Clone, Default)]
struct RegistrySnapshot {
    nodes: Arc<Vec<NodeDescriptor>>,
    leader: Option<NodeDescriptor>,
}

/// The client's current belief about cluster membership and leadership.
///
/// Node list and leader are swapped together under one lock, so readers never
/// see a list from one refresh paired with a leader from another. The leader is
/// mirrored into a `watch` channel that acts as a level-triggered gate for
/// [`NodeRegistry::await_leader`].
pub struct NodeRegistry {
    state: RwLock<RegistrySnapshot>,
    leader_tx: watch::Sender<Option<NodeDescriptor>>,
    read_stripe: AtomicUsize,
}

impl NodeRegistry {
    /// Creates an empty registry with no leader.
    pub fn new() -> Self {
        let (leader_tx, _) = watch::channel(None);
        Self {
            state: RwLock::new(RegistrySnapshot::default()),
            leader_tx,
            read_stripe: AtomicUsize::new(0),
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, RegistrySnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, RegistrySnapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the known nodes.
    pub fn current_nodes(&self) -> Vec<NodeDescriptor> {
        self.read_state().nodes.as_ref().clone()
    }

    pub fn node_count(&self) -> usize {
        self.read_state().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    pub fn current_leader(&self) -> Option<NodeDescriptor> {
        self.read_state().leader.clone()
    }

    /// Sets or clears the leader.
    ///
    /// `Some` opens the gate and releases every waiter; `None` closes it again.
    pub fn set_leader(&self, leader: Option<NodeDescriptor>) {
        let mut state = self.write_state();
        state.leader = leader.clone();
        self.leader_tx.send_replace(leader);
    }

    /// Forgets the leader so the next dispatch triggers rediscovery.
    pub fn clear_leader(&self) {
        self.set_leader(None);
    }

    /// Waits until a leader is known or `wait` elapses.
    pub async fn await_leader(&self, wait: Duration) -> Option<NodeDescriptor> {
        let mut leader_rx = self.leader_tx.subscribe();
        let result = timeout(wait, leader_rx.wait_for(Option::is_some)).await;
        match result {
            Ok(Ok(leader)) => (*leader).clone(),
            _ => None,
        }
    }

    /// Atomically replaces node list and leader.
    pub fn replace_topology(&self, nodes: Vec<NodeDescriptor>, leader: Option<NodeDescriptor>) {
        let mut state = self.write_state();
        state.nodes = Arc::new(nodes);
        state.leader = leader.clone();
        self.leader_tx.send_replace(leader);
    }

    /// Current read-stripe position; advances the shared counter when `increment` is set.
    pub fn read_striping_base(&self, increment: bool) -> usize {
        if increment {
            self.read_stripe.fetch_add(1, Ordering::SeqCst)
        } else {
            self.read_stripe.load(Ordering::SeqCst)
        }
    }

    /// Picks the node at `stripe` modulo the node count.
    pub fn node_for_stripe(&self, stripe: usize) -> Option<NodeDescriptor> {
        let state = self.read_state();
        if state.nodes.is_empty() {
            return None;
        }
        state.nodes.get(stripe % state.nodes.len()).cloned()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
