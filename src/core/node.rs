use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Opaque credential material attached to a node (API key, token, ...).
///
/// Never printed in debug output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

/// Leadership metadata attached to a node once topology is known.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClusterInfo {
    pub is_leader: bool,
    pub commit_index: u64,
}

impl ClusterInfo {
    pub fn leader(commit_index: u64) -> Self {
        Self {
            is_leader: true,
            commit_index,
        }
    }

    pub fn follower(commit_index: u64) -> Self {
        Self {
            is_leader: false,
            commit_index,
        }
    }
}

/// One cluster member as seen by the client.
///
/// Identity (equality and hashing) is the address only; credentials and
/// cluster info are payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub address: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub cluster_info: Option<ClusterInfo>,
}

impl NodeDescriptor {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: None,
            cluster_info: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_cluster_info(mut self, info: ClusterInfo) -> Self {
        self.cluster_info = Some(info);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// True when topology flagged this node as the current leader.
    pub fn is_leader(&self) -> bool {
        self.cluster_info.map(|info| info.is_leader).unwrap_or(false)
    }
}

impl PartialEq for NodeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for NodeDescriptor {}

impl Hash for NodeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// A destination entry inside a topology document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TopologyDestination {
    pub url: String,
    /// Overrides `url` when the node is reachable under a different public address.
    #[serde(default)]
    pub client_visible_url: Option<String>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub ignored_by_client: bool,
    #[serde(default)]
    pub cluster_information: Option<ClusterInfo>,
}

impl TopologyDestination {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn client_visible_url(mut self, url: impl Into<String>) -> Self {
        self.client_visible_url = Some(url.into());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn ignored_by_client(mut self, ignored: bool) -> Self {
        self.ignored_by_client = ignored;
        self
    }

    pub fn cluster_information(mut self, info: ClusterInfo) -> Self {
        self.cluster_information = Some(info);
        self
    }

    /// The URL a client should use: the client-visible URL when set, otherwise `url`.
    pub fn effective_url(&self) -> &str {
        match self.client_visible_url.as_deref().map(str::trim) {
            Some(visible) if !visible.is_empty() => visible,
            _ => self.url.trim(),
        }
    }

    /// Converts the destination into a node, or `None` when the client must skip it.
    pub fn to_node(&self) -> Option<NodeDescriptor> {
        if self.disabled || self.ignored_by_client {
            return None;
        }
        let url = self.effective_url();
        if url.is_empty() {
            return None;
        }
        Some(NodeDescriptor {
            address: url.to_string(),
            credentials: self.credentials.clone(),
            cluster_info: self.cluster_information,
        })
    }
}

/// Topology as reported by a single node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TopologyDocument {
    /// The other members of the cluster, in the responder's order.
    #[serde(default)]
    pub destinations: Vec<TopologyDestination>,
    /// Used to pick the freshest document when several nodes answer.
    pub cluster_commit_index: u64,
    /// The responding node's own leadership flag.
    #[serde(default)]
    pub responder_is_leader: bool,
}

impl TopologyDocument {
    pub fn new(cluster_commit_index: u64) -> Self {
        Self {
            destinations: Vec::new(),
            cluster_commit_index,
            responder_is_leader: false,
        }
    }

    pub fn responder_is_leader(mut self, is_leader: bool) -> Self {
        self.responder_is_leader = is_leader;
        self
    }

    pub fn with_destination(mut self, destination: TopologyDestination) -> Self {
        self.destinations.push(destination);
        self
    }

    /// Cluster info describing the node that produced this document.
    pub fn responder_info(&self) -> ClusterInfo {
        ClusterInfo {
            is_leader: self.responder_is_leader,
            commit_index: self.cluster_commit_index,
        }
    }

    /// Builds the client node list: usable destinations followed by the
    /// responder itself.
    ///
    /// The responder always carries the document's own cluster info. When it
    /// already appears among the destinations, that entry is updated in place.
    pub fn to_nodes(&self, responder: &NodeDescriptor) -> Vec<NodeDescriptor> {
        let mut nodes: Vec<NodeDescriptor> = Vec::with_capacity(self.destinations.len() + 1);
        for node in self.destinations.iter().filter_map(TopologyDestination::to_node) {
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }
        match nodes.iter_mut().find(|node| node.address == responder.address) {
            Some(listed) => {
                listed.cluster_info = Some(self.responder_info());
                if listed.credentials.is_none() {
                    listed.credentials = responder.credentials.clone();
                }
            }
            None => nodes.push(NodeDescriptor {
                address: responder.address.clone(),
                credentials: responder.credentials.clone(),
                cluster_info: Some(self.responder_info()),
            }),
        }
        nodes
    }
}
