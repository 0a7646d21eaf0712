pub mod client;
pub mod resources;
pub mod types;

pub use client::{ClientProvider, ClusterClient, DEFAULT_TIMEOUT};
pub use resources::{DeploymentInfo, NamespaceInfo, NodeInfo, PodInfo, ServiceInfo};
pub use types::{
    cluster_id, context_from_id, ClusterPhase, ClusterSnapshot, ClusterSummary, ResourceStatus,
};
