#[derive(Clone)]
enum ScriptedProbe {
    Answer(TopologyDocument),
    Unreachable,
}

/// A scripted [`TopologyFetcher`] for tests and local simulations.
///
/// Each address answers with the document registered for it; unknown or
/// unreachable addresses fail with a connectivity error. Every probe is
/// counted so callers can assert how often nodes were asked.
#[derive(Clone, Default)]
pub struct InMemoryTopologyFetcher {
    probes: Arc<Mutex<HashMap<String, ScriptedProbe>>>,
    probe_counts: Arc<Mutex<HashMap<String, usize>>>,
    latency: Arc<Mutex<Option<Duration>>>,
}

impl InMemoryTopologyFetcher {
    /// Creates a fetcher where every node is unreachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `address` answer with `document`.
    pub async fn set_topology(&self, address: impl Into<String>, document: TopologyDocument) {
        self.probes
            .lock()
            .await
            .insert(address.into(), ScriptedProbe::Answer(document));
    }

    /// Makes `address` fail every probe.
    pub async fn set_unreachable(&self, address: impl Into<String>) {
        self.probes
            .lock()
            .await
            .insert(address.into(), ScriptedProbe::Unreachable);
    }

    /// Delays every probe, to widen race windows in concurrency tests.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().await = latency;
    }

    pub async fn probe_count(&self, address: &str) -> usize {
        self.probe_counts
            .lock()
            .await
            .get(address)
            .copied()
            .unwrap_or_default()
    }

    pub async fn total_probes(&self) -> usize {
        self.probe_counts.lock().await.values().sum()
    }
}

#[async_trait]
impl TopologyFetcher for InMemoryTopologyFetcher {
    async fn fetch_topology(&self, node: &NodeDescriptor) -> Result<TopologyDocument> {
        *self
            .probe_counts
            .lock()
            .await
            .entry(node.address.clone())
            .or_default() += 1;

        let latency = *self.latency.lock().await;
        if let Some(latency) = latency {
            sleep(latency).await;
        }

        let probe = self.probes.lock().await.get(&node.address).cloned();
        match probe {
            Some(ScriptedProbe::Answer(document)) => Ok(document),
            Some(ScriptedProbe::Unreachable) => Err(DispatchError::Connectivity(format!(
                "node '{}' is unreachable",
                node.address
            ))),
            None => Err(DispatchError::Connectivity(format!(
                "node '{}' is not registered",
                node.address
            ))),
        }
    }
}
