use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status attached to every resource-shaped entity.
///
/// `P` is the per-kind phase set, so a pod can never carry a node phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus<P> {
    pub phase: P,
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl<P> ResourceStatus<P> {
    pub fn new(phase: P, ready: bool) -> Self {
        Self {
            phase,
            ready,
            reason: None,
            message: None,
            last_updated: Utc::now(),
        }
    }

    pub fn with_detail(mut self, reason: Option<String>, message: Option<String>) -> Self {
        self.reason = reason.filter(|r| !r.is_empty());
        self.message = message.filter(|m| !m.is_empty());
        self
    }

    /// Equality that ignores `last_updated`.
    pub fn same_state(&self, other: &Self) -> bool
    where
        P: PartialEq,
    {
        self.phase == other.phase
            && self.ready == other.ready
            && self.reason == other.reason
            && self.message == other.message
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterPhase {
    Running,
    Offline,
    Unknown,
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterPhase::Running => write!(f, "Running"),
            ClusterPhase::Offline => write!(f, "Offline"),
            ClusterPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

/// High-level cluster statistics gathered with cheap list calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub total_nodes: usize,
    pub ready_nodes: usize,
    pub total_pods: usize,
    pub running_pods: usize,
    pub pending_pods: usize,
    pub failed_pods: usize,
    pub total_namespaces: usize,
    pub total_deployments: usize,
    pub total_services: usize,
}

impl ClusterSummary {
    pub fn count_nodes(&mut self, nodes: &[Node]) {
        self.total_nodes = nodes.len();
        self.ready_nodes = nodes.iter().filter(|n| is_node_ready(n)).count();
    }

    pub fn count_pods(&mut self, pods: &[Pod]) {
        self.total_pods = pods.len();
        self.running_pods = 0;
        self.pending_pods = 0;
        self.failed_pods = 0;

        for pod in pods {
            match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
                Some("Running") => self.running_pods += 1,
                Some("Pending") => self.pending_pods += 1,
                Some("Failed") => self.failed_pods += 1,
                _ => {}
            }
        }
    }
}

/// Point-in-time summary of one cluster context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    pub id: String,
    pub name: String,
    pub version: String,
    pub status: ResourceStatus<ClusterPhase>,
    pub summary: ClusterSummary,
}

impl ClusterSnapshot {
    pub fn running(context: &str, version: impl Into<String>, summary: ClusterSummary) -> Self {
        Self {
            id: cluster_id(context),
            name: context.to_string(),
            version: version.into(),
            status: ResourceStatus::new(ClusterPhase::Running, true),
            summary,
        }
    }

    /// Placeholder for a context that could not be queried. Carries no counts.
    pub fn offline(context: &str, reason: &str, message: impl Into<String>) -> Self {
        Self {
            id: cluster_id(context),
            name: context.to_string(),
            version: "unknown".to_string(),
            status: ResourceStatus::new(ClusterPhase::Offline, false)
                .with_detail(Some(reason.to_string()), Some(message.into())),
            summary: ClusterSummary::default(),
        }
    }

    pub fn phase(&self) -> ClusterPhase {
        self.status.phase
    }

    pub fn is_offline(&self) -> bool {
        self.status.phase == ClusterPhase::Offline
    }

    /// Equality that ignores timestamps; used to detect state changes between cycles.
    pub fn same_state(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.version == other.version
            && self.summary == other.summary
            && self.status.same_state(&other.status)
    }
}

pub fn cluster_id(context: &str) -> String {
    format!("context-{}", context)
}

pub fn context_from_id(id: &str) -> Option<&str> {
    id.strip_prefix("context-").filter(|name| !name.is_empty())
}

pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
        .map(|c| c.status == "True")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus, PodStatus};

    fn node(ready: &str) -> Node {
        Node {
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: ready.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn pod(phase: &str) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ClusterSummary::default();
        summary.count_nodes(&[node("True"), node("False"), Node::default()]);
        summary.count_pods(&[
            pod("Running"),
            pod("Running"),
            pod("Pending"),
            pod("Failed"),
            pod("Succeeded"),
        ]);

        assert_eq!(summary.total_nodes, 3);
        assert_eq!(summary.ready_nodes, 1);
        assert_eq!(summary.total_pods, 5);
        assert_eq!(summary.running_pods, 2);
        assert_eq!(summary.pending_pods, 1);
        assert_eq!(summary.failed_pods, 1);
    }

    #[test]
    fn test_offline_snapshot_has_no_counts() {
        let snap = ClusterSnapshot::offline("broken", "Timeout", "deadline exceeded");

        assert_eq!(snap.id, "context-broken");
        assert_eq!(snap.version, "unknown");
        assert!(snap.is_offline());
        assert!(!snap.status.ready);
        assert_eq!(snap.status.reason.as_deref(), Some("Timeout"));
        assert_eq!(snap.summary, ClusterSummary::default());
    }

    #[test]
    fn test_same_state_ignores_timestamp() {
        let a = ClusterSnapshot::running("prod", "v1.28.0", ClusterSummary::default());
        let mut b = a.clone();
        b.status.last_updated = a.status.last_updated + chrono::Duration::seconds(30);
        assert!(a.same_state(&b));

        b.summary.total_pods = 4;
        assert!(!a.same_state(&b));
    }

    #[test]
    fn test_cluster_id_round_trip() {
        assert_eq!(context_from_id(&cluster_id("kind-dev")), Some("kind-dev"));
        assert_eq!(context_from_id("prod"), None);
        assert_eq!(context_from_id("context-"), None);
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let snap = ClusterSnapshot::running("prod", "v1.28.0", ClusterSummary::default());
        let value = serde_json::to_value(&snap).unwrap();

        assert_eq!(value["id"], "context-prod");
        assert_eq!(value["status"]["phase"], "Running");
        assert!(value["status"].get("reason").is_none());
        assert!(value["status"]["lastUpdated"].is_string());
        assert_eq!(value["summary"]["totalNodes"], 0);
    }
}
