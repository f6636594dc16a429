/// Process-local topology cache. The default when nothing is configured.
#[derive(Clone, Default)]
pub struct InMemoryTopologyCache {
    entries: Arc<Mutex<HashMap<String, Vec<NodeDescriptor>>>>,
}

impl InMemoryTopologyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an entry, as if a previous client had saved it.
    pub async fn insert(&self, cluster_identity: impl Into<String>, nodes: Vec<NodeDescriptor>) {
        self.entries.lock().await.insert(cluster_identity.into(), nodes);
    }
}

#[async_trait]
impl TopologyCache for InMemoryTopologyCache {
    async fn load(&self, cluster_identity: &str) -> Result<Option<Vec<NodeDescriptor>>> {
        Ok(self.entries.lock().await.get(cluster_identity).cloned())
    }

    async fn save(&self, cluster_identity: &str, nodes: &[NodeDescriptor]) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(cluster_identity.to_string(), nodes.to_vec());
        Ok(())
    }
}

/// Stores one JSON file per cluster identity inside `dir`.
#[derive(Debug, Clone)]
pub struct FileTopologyCache {
    dir: PathBuf,
}

impl FileTopologyCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, cluster_identity: &str) -> PathBuf {
        self.dir.join(format!("topology-{}.json", cluster_identity))
    }
}

#[async_trait]
impl TopologyCache for FileTopologyCache {
    /// Missing and unreadable files both count as "nothing cached".
    async fn load(&self, cluster_identity: &str) -> Result<Option<Vec<NodeDescriptor>>> {
        let path = self.path_for(cluster_identity);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(DispatchError::Cache(format!(
                    "Failed to read topology cache {}: {}",
                    path.display(),
                    err
                )));
            }
        };

        match serde_json::from_slice::<Vec<NodeDescriptor>>(&data) {
            Ok(nodes) => Ok(Some(nodes)),
            Err(err) => {
                event!(
                    Level::WARN,
                    path = %path.display(),
                    error = %err,
                    "ignoring corrupt topology cache file"
                );
                Ok(None)
            }
        }
    }

    async fn save(&self, cluster_identity: &str, nodes: &[NodeDescriptor]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            DispatchError::Cache(format!("Failed to create topology cache directory: {}", e))
        })?;

        let path = self.path_for(cluster_identity);
        let tmp_path = path.with_extension("tmp");
        let serialized = serde_json::to_vec_pretty(nodes)?;
        tokio::fs::write(&tmp_path, serialized).await.map_err(|e| {
            DispatchError::Cache(format!("Failed to write topology cache: {}", e))
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            DispatchError::Cache(format!("Failed to rename topology cache: {}", e))
        })?;
        Ok(())
    }
}
