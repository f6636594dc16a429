pub mod error;
pub mod node;

pub use error::{DispatchError, ErrorKind, Result};
pub use node::{ClusterInfo, Credentials, NodeDescriptor, TopologyDestination, TopologyDocument};
