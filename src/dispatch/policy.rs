/// Per-call cluster routing policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ClusterBehavior {
    /// Not cluster aware. The cluster-aware strategy treats it like
    /// `ReadFromLeaderWriteToLeader`.
    #[default]
    None,
    ReadFromLeaderWriteToLeader,
    ReadFromLeaderWriteToLeaderWithFailovers,
    ReadFromAllWriteToLeader,
    ReadFromAllWriteToLeaderWithFailovers,
}

impl ClusterBehavior {
    pub fn is_cluster_aware(self) -> bool {
        self != Self::None
    }

    /// Reads may be striped across every known node.
    pub fn reads_from_all(self) -> bool {
        matches!(
            self,
            Self::ReadFromAllWriteToLeader | Self::ReadFromAllWriteToLeaderWithFailovers
        )
    }

    /// A missing leader falls back to a linear scan of healthy nodes
    /// instead of failing.
    pub fn allows_failover(self) -> bool {
        matches!(
            self,
            Self::ReadFromLeaderWriteToLeaderWithFailovers
                | Self::ReadFromAllWriteToLeaderWithFailovers
        )
    }
}

/// Legacy master/replica failover convention used by the replication-aware strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum FailoverBehavior {
    #[default]
    AllowReadsFromSecondaries,
    AllowReadsFromSecondariesAndWritesToSecondaries,
    FailImmediately,
    ReadFromAllServers,
}

impl FailoverBehavior {
    /// Whether a request with this verb may go to a secondary.
    pub fn allows_secondary(self, is_read: bool) -> bool {
        match self {
            Self::FailImmediately => false,
            Self::AllowReadsFromSecondariesAndWritesToSecondaries => true,
            Self::AllowReadsFromSecondaries | Self::ReadFromAllServers => is_read,
        }
    }
}

/// GET and HEAD never mutate and may be served by any node.
pub fn is_read_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// Everything `execute` needs to know about a call besides the operation itself.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub method: Method,
    pub behavior: ClusterBehavior,
    /// Advance the shared read-stripe counter for this call.
    pub increment_read_stripe: bool,
}

impl DispatchOptions {
    pub fn new(method: Method, behavior: ClusterBehavior) -> Self {
        Self {
            method,
            behavior,
            increment_read_stripe: true,
        }
    }

    pub fn get(behavior: ClusterBehavior) -> Self {
        Self::new(Method::GET, behavior)
    }

    pub fn put(behavior: ClusterBehavior) -> Self {
        Self::new(Method::PUT, behavior)
    }

    /// Keeps the read-stripe position where it is (e.g. for a follow-up
    /// request that should hit the same node).
    pub fn without_stripe_increment(mut self) -> Self {
        self.increment_read_stripe = false;
        self
    }

    pub fn is_read(&self) -> bool {
        is_read_method(&self.method)
    }
}
