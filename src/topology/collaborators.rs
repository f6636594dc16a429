/// Asks one node for the cluster topology as it sees it.
#[async_trait]
pub trait TopologyFetcher: Send + Sync {
    /// Performs a single network call; any error is treated as "node did not answer".
    async fn fetch_topology(&self, node: &NodeDescriptor) -> Result<TopologyDocument>;
}

/// Local persistence of the last known node list, keyed by cluster identity.
#[async_trait]
pub trait TopologyCache: Send + Sync {
    async fn load(&self, cluster_identity: &str) -> Result<Option<Vec<NodeDescriptor>>>;

    async fn save(&self, cluster_identity: &str, nodes: &[NodeDescriptor]) -> Result<()>;
}

/// Stable cache key for the cluster reachable through `primary`.
///
/// UUIDv5 over the normalized address, so the same URL always maps to the same file.
pub fn cluster_identity_hash(primary: &NodeDescriptor) -> String {
    let normalized = primary
        .address
        .trim()
        .trim_end_matches('/')
        .to_ascii_lowercase();
    Uuid::new_v5(&Uuid::NAMESPACE_URL, normalized.as_bytes())
        .simple()
        .to_string()
}
