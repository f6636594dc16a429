use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Cluster unreachable: {0}")]
    ClusterUnreachable(String),

    #[error("Connection error: {0}")]
    Connectivity(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Leadership moved (status {status}): {message}")]
    LeadershipMoved { status: u16, message: String },

    #[error("Application error (status {status}): {message}")]
    Application { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Topology cache error: {0}")]
    Cache(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

/// Coarse classification of a [`DispatchError`] used by the retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ClusterUnreachable,
    RetryableNodeFailure,
    Application,
    Configuration,
    Internal,
}

impl DispatchError {
    /// Classifies an HTTP response status returned by a node.
    ///
    /// Redirects and `417 Expectation Failed` mean the node is no longer the
    /// right target (leadership moved); anything else is the cluster's verdict
    /// on the request itself.
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        if status.is_redirection() || status == StatusCode::EXPECTATION_FAILED {
            Self::LeadershipMoved {
                status: status.as_u16(),
                message,
            }
        } else {
            Self::Application {
                status: status.as_u16(),
                message,
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ClusterUnreachable(_) => ErrorKind::ClusterUnreachable,
            Self::Connectivity(_) | Self::Timeout(_) | Self::LeadershipMoved { .. } => {
                ErrorKind::RetryableNodeFailure
            }
            Self::Application { .. } => ErrorKind::Application,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Cache(_) | Self::LockError(_) => ErrorKind::Internal,
        }
    }

    /// Only connectivity-class and leadership-moved failures may be retried
    /// against another node.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::RetryableNodeFailure
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

impl<T> From<std::sync::PoisonError<T>> for DispatchError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Cache(err.to_string())
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Cache(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let moved = DispatchError::from_status(StatusCode::TEMPORARY_REDIRECT, "go to node-b");
        assert!(moved.is_retryable());

        let expectation = DispatchError::from_status(StatusCode::EXPECTATION_FAILED, "not leader");
        assert_eq!(expectation.kind(), ErrorKind::RetryableNodeFailure);

        let conflict = DispatchError::from_status(StatusCode::CONFLICT, "concurrency violation");
        assert_eq!(conflict.kind(), ErrorKind::Application);
        assert!(!conflict.is_retryable());
    }

    #[test]
    fn test_connectivity_is_retryable() {
        assert!(DispatchError::Connectivity("refused".into()).is_retryable());
        assert!(DispatchError::Timeout("10s".into()).is_retryable());
        assert!(!DispatchError::ClusterUnreachable("no leader".into()).is_retryable());
        assert!(!DispatchError::Configuration("bad".into()).is_retryable());
    }
}
