/// Path a node serves its topology document on.
pub const DEFAULT_TOPOLOGY_PATH: &str = "/cluster/topology";

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// [`TopologyFetcher`] that asks a node over HTTP with a JSON body.
///
/// Node credentials, when present, are sent as a bearer token.
#[derive(Debug, Clone)]
pub struct HttpTopologyFetcher {
    client: reqwest::Client,
    path: String,
}

impl HttpTopologyFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_PROBE_TIMEOUT)
    }

    /// Every probe gives up after `probe_timeout`.
    pub fn with_timeout(probe_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()
            .map_err(|e| DispatchError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            path: DEFAULT_TOPOLOGY_PATH.to_string(),
        })
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn topology_url(&self, node: &NodeDescriptor) -> String {
        let base = node.address.trim_end_matches('/');
        if self.path.starts_with('/') {
            format!("{}{}", base, self.path)
        } else {
            format!("{}/{}", base, self.path)
        }
    }
}

fn transport_error(node: &NodeDescriptor, err: reqwest::Error) -> DispatchError {
    if err.is_timeout() {
        DispatchError::Timeout(format!("topology probe to '{}' timed out", node.address))
    } else {
        DispatchError::Connectivity(format!("topology probe to '{}' failed: {}", node.address, err))
    }
}

#[async_trait]
impl TopologyFetcher for HttpTopologyFetcher {
    async fn fetch_topology(&self, node: &NodeDescriptor) -> Result<TopologyDocument> {
        let mut request = self
            .client
            .get(self.topology_url(node))
            .header("accept", "application/json");
        if let Some(credentials) = &node.credentials {
            request = request.bearer_auth(credentials.expose());
        }

        let response = request.send().await.map_err(|e| transport_error(node, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let status = http::StatusCode::from_u16(status.as_u16())
                .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
            return Err(DispatchError::from_status(status, body));
        }

        response.json::<TopologyDocument>().await.map_err(|e| {
            DispatchError::Connectivity(format!(
                "node '{}' returned an invalid topology document: {}",
                node.address, e
            ))
        })
    }
}
