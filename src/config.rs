use crate::core::{Credentials, DispatchError, NodeDescriptor, Result};
use std::time::Duration;

/// Dispatcher configuration
///
/// Built once per client and shared by every component of the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Node the client was configured with; seeds discovery and is the last resort
    pub primary: NodeDescriptor,

    /// Extra nodes probed when the normal candidates do not answer
    pub failover_servers: Vec<NodeDescriptor>,

    /// Retry budget for a single cluster-aware `execute` call. The
    /// replication-aware strategy tries each candidate once instead.
    pub max_retries: i32,

    /// How long strict policies wait for a leader
    pub leader_wait_timeout: Duration,

    /// How long failover policies wait for a leader when no nodes are known yet
    pub failover_leader_wait: Duration,

    /// Pause between refresh rounds while the cluster has no leader
    pub topology_poll_interval: Duration,

    /// Failures a node may accumulate and still be tried
    pub max_tolerated_failures: u64,

    /// Load and save topology through the local cache
    pub cache_topology: bool,
}

impl DispatcherConfig {
    /// Create a new configuration for the given primary node
    pub fn new(primary_url: &str) -> Self {
        Self {
            primary: NodeDescriptor::new(primary_url.trim()),
            failover_servers: Vec::new(),
            max_retries: 2,
            leader_wait_timeout: Duration::from_secs(30),
            failover_leader_wait: Duration::from_secs(5),
            topology_poll_interval: Duration::from_millis(500),
            max_tolerated_failures: 1,
            cache_topology: true,
        }
    }

    /// Attach credentials to the primary node
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.primary.credentials = Some(credentials);
        self
    }

    /// Add a failover server
    pub fn failover_server(mut self, node: NodeDescriptor) -> Self {
        if !self.failover_servers.contains(&node) {
            self.failover_servers.push(node);
        }
        self
    }

    /// Replace all failover servers
    pub fn failover_servers(mut self, nodes: Vec<NodeDescriptor>) -> Self {
        self.failover_servers.clear();
        for node in nodes {
            self = self.failover_server(node);
        }
        self
    }

    /// Set retry budget
    pub fn max_retries(mut self, retries: i32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set strict leader wait
    pub fn leader_wait_timeout(mut self, timeout: Duration) -> Self {
        self.leader_wait_timeout = timeout;
        self
    }

    /// Set failover leader wait
    pub fn failover_leader_wait(mut self, timeout: Duration) -> Self {
        self.failover_leader_wait = timeout;
        self
    }

    /// Set topology poll interval
    pub fn topology_poll_interval(mut self, interval: Duration) -> Self {
        self.topology_poll_interval = interval;
        self
    }

    /// Set health threshold
    pub fn max_tolerated_failures(mut self, failures: u64) -> Self {
        self.max_tolerated_failures = failures;
        self
    }

    /// Enable or disable the topology cache
    pub fn cache_topology(mut self, enabled: bool) -> Self {
        self.cache_topology = enabled;
        self
    }

    /// Parse from a comma separated URL list
    ///
    /// The first URL is the primary, the rest become failover servers.
    ///
    /// # Examples
    ///
    /// ```
    /// # use clusterroute::DispatcherConfig;
    /// let config = DispatcherConfig::from_urls("http://a:8080, http://b:8080").unwrap();
    /// assert_eq!(config.primary.address, "http://a:8080");
    /// assert_eq!(config.failover_servers.len(), 1);
    /// ```
    pub fn from_urls(urls: &str) -> Result<Self> {
        let mut parts = urls.split(',').map(str::trim).filter(|url| !url.is_empty());
        let primary = parts.next().ok_or_else(|| {
            DispatchError::Configuration("at least one node URL is required".to_string())
        })?;
        let mut config = Self::new(primary);
        for url in parts {
            config = config.failover_server(NodeDescriptor::new(url));
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.primary.address.trim().is_empty() {
            return Err(DispatchError::Configuration(
                "primary node URL cannot be empty".to_string(),
            ));
        }

        if self
            .failover_servers
            .iter()
            .any(|node| node.address.trim().is_empty())
        {
            return Err(DispatchError::Configuration(
                "failover server URL cannot be empty".to_string(),
            ));
        }

        if self.max_retries < 0 {
            return Err(DispatchError::Configuration(
                "max_retries must be >= 0".to_string(),
            ));
        }

        if self.leader_wait_timeout.is_zero() || self.failover_leader_wait.is_zero() {
            return Err(DispatchError::Configuration(
                "leader wait timeouts must be > 0".to_string(),
            ));
        }

        if self.topology_poll_interval.is_zero() {
            return Err(DispatchError::Configuration(
                "topology_poll_interval must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}
