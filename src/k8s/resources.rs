//! Per-resource views returned by the cluster detail endpoints
//!
//! Each `*Info` type is built from the matching k8s-openapi object and carries a
//! [`ResourceStatus`] whose phase comes from a closed, per-kind set.

use super::types::ResourceStatus;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ContainerStatus, Namespace, Node, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodePhase {
    Ready,
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Running,
    Pending,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Running") => PodPhase::Running,
            Some("Pending") => PodPhase::Pending,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerPhase {
    Running,
    Waiting,
    Terminated,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentPhase {
    Available,
    Progressing,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServicePhase {
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespacePhase {
    Active,
    Terminating,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_transition_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub name: String,
    pub role: String,
    pub kubelet: String,
    pub runtime: String,
    pub labels: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: ResourceStatus<NodePhase>,
    pub conditions: Vec<NodeCondition>,
}

impl NodeInfo {
    pub fn from_k8s_node(node: &Node) -> Self {
        let status = node.status.as_ref();
        let info = status.and_then(|s| s.node_info.as_ref());
        let conditions = status
            .and_then(|s| s.conditions.as_deref())
            .unwrap_or(&[]);

        let ready_condition = conditions.iter().find(|c| c.type_ == "Ready");
        let ready = ready_condition.map(|c| c.status == "True").unwrap_or(false);
        let phase = if ready {
            NodePhase::Ready
        } else {
            NodePhase::NotReady
        };

        let role = if labels(&node.metadata).contains_key(CONTROL_PLANE_LABEL) {
            "control-plane"
        } else {
            "worker"
        };

        Self {
            name: node.metadata.name.clone().unwrap_or_default(),
            role: role.to_string(),
            kubelet: info.map(|i| i.kubelet_version.clone()).unwrap_or_default(),
            runtime: info
                .map(|i| i.container_runtime_version.clone())
                .unwrap_or_default(),
            labels: labels(&node.metadata),
            created_at: created_at(&node.metadata),
            status: ResourceStatus::new(phase, ready).with_detail(
                ready_condition.and_then(|c| c.reason.clone()),
                ready_condition.and_then(|c| c.message.clone()),
            ),
            conditions: conditions
                .iter()
                .map(|c| NodeCondition {
                    kind: c.type_.clone(),
                    status: c.status.clone(),
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                    last_transition_time: c.last_transition_time.as_ref().map(|t| t.0),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub name: String,
    pub image: String,
    pub ready: bool,
    pub status: ResourceStatus<ContainerPhase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub role: String,
    pub ip: Option<String>,
    pub node_name: Option<String>,
    pub restart_count: i32,
    pub containers: Vec<ContainerInfo>,
    pub labels: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: ResourceStatus<PodPhase>,
}

impl PodInfo {
    pub fn from_k8s_pod(pod: &Pod) -> Self {
        let metadata = &pod.metadata;
        let spec = pod.spec.as_ref();
        let status = pod.status.as_ref();
        let container_statuses = status
            .and_then(|s| s.container_statuses.as_deref())
            .unwrap_or(&[]);

        let ready = status
            .and_then(|s| s.conditions.as_ref())
            .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
            .map(|c| c.status == "True")
            .unwrap_or(false);

        let containers = spec
            .map(|s| s.containers.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|c| {
                let status = container_status(container_statuses.iter().find(|s| s.name == c.name));
                ContainerInfo {
                    name: c.name.clone(),
                    image: c.image.clone().unwrap_or_default(),
                    ready: status.ready,
                    status,
                }
            })
            .collect();

        let labels = labels(metadata);
        let role = labels
            .get("app")
            .or_else(|| labels.get("k8s-app"))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            name: metadata.name.clone().unwrap_or_default(),
            namespace: metadata.namespace.clone().unwrap_or_default(),
            role,
            ip: status.and_then(|s| s.pod_ip.clone()),
            node_name: spec.and_then(|s| s.node_name.clone()),
            restart_count: container_statuses.iter().map(|c| c.restart_count).sum(),
            containers,
            labels,
            created_at: created_at(metadata),
            status: ResourceStatus::new(
                PodPhase::parse(status.and_then(|s| s.phase.as_deref())),
                ready,
            )
            .with_detail(
                status.and_then(|s| s.reason.clone()),
                status.and_then(|s| s.message.clone()),
            ),
        }
    }
}

fn container_status(status: Option<&ContainerStatus>) -> ResourceStatus<ContainerPhase> {
    let Some(cs) = status else {
        return ResourceStatus::new(ContainerPhase::Unknown, false);
    };

    let state = cs.state.as_ref();
    if state.and_then(|s| s.running.as_ref()).is_some() {
        ResourceStatus::new(ContainerPhase::Running, cs.ready)
    } else if let Some(waiting) = state.and_then(|s| s.waiting.as_ref()) {
        ResourceStatus::new(ContainerPhase::Waiting, cs.ready)
            .with_detail(waiting.reason.clone(), waiting.message.clone())
    } else if let Some(terminated) = state.and_then(|s| s.terminated.as_ref()) {
        ResourceStatus::new(ContainerPhase::Terminated, cs.ready)
            .with_detail(terminated.reason.clone(), terminated.message.clone())
    } else {
        ResourceStatus::new(ContainerPhase::Unknown, cs.ready)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePortInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub port: i32,
    pub target_port: String,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "clusterIP")]
    pub cluster_ip: Option<String>,
    #[serde(rename = "externalIPs", default, skip_serializing_if = "Vec::is_empty")]
    pub external_ips: Vec<String>,
    #[serde(rename = "loadBalancerIP", default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_ip: Option<String>,
    pub ports: Vec<ServicePortInfo>,
    pub labels: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: ResourceStatus<ServicePhase>,
}

impl ServiceInfo {
    pub fn from_k8s_service(svc: &Service) -> Self {
        let spec = svc.spec.as_ref();

        let load_balancer_ip = svc
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .and_then(|ingress| ingress.first())
            .and_then(|i| i.ip.clone());

        let ports = spec
            .and_then(|s| s.ports.as_deref())
            .unwrap_or(&[])
            .iter()
            .map(|p| ServicePortInfo {
                name: p.name.clone(),
                port: p.port,
                target_port: match &p.target_port {
                    Some(IntOrString::Int(port)) => port.to_string(),
                    Some(IntOrString::String(name)) => name.clone(),
                    None => p.port.to_string(),
                },
                protocol: p.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
                node_port: p.node_port.filter(|port| *port != 0),
            })
            .collect();

        Self {
            name: svc.metadata.name.clone().unwrap_or_default(),
            namespace: svc.metadata.namespace.clone().unwrap_or_default(),
            kind: spec
                .and_then(|s| s.type_.clone())
                .unwrap_or_else(|| "ClusterIP".to_string()),
            cluster_ip: spec.and_then(|s| s.cluster_ip.clone()),
            external_ips: spec.and_then(|s| s.external_ips.clone()).unwrap_or_default(),
            load_balancer_ip,
            ports,
            labels: labels(&svc.metadata),
            created_at: created_at(&svc.metadata),
            // A service that exists is serving
            status: ResourceStatus::new(ServicePhase::Active, true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub name: String,
    pub namespace: String,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub strategy: String,
    pub labels: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: ResourceStatus<DeploymentPhase>,
}

impl DeploymentInfo {
    pub fn from_k8s_deployment(deployment: &Deployment) -> Self {
        let spec = deployment.spec.as_ref();
        let status = deployment.status.as_ref();

        let replicas = spec.and_then(|s| s.replicas).unwrap_or(1);
        let ready_replicas = status.and_then(|s| s.ready_replicas).unwrap_or(0);
        let available_replicas = status.and_then(|s| s.available_replicas).unwrap_or(0);

        let ready = ready_replicas == replicas;
        let phase = if ready {
            DeploymentPhase::Available
        } else if ready_replicas == 0 {
            DeploymentPhase::Unavailable
        } else {
            DeploymentPhase::Progressing
        };

        let progressing = status
            .and_then(|s| s.conditions.as_ref())
            .and_then(|conds| conds.iter().find(|c| c.type_ == "Progressing"));

        Self {
            name: deployment.metadata.name.clone().unwrap_or_default(),
            namespace: deployment.metadata.namespace.clone().unwrap_or_default(),
            replicas,
            ready_replicas,
            available_replicas,
            strategy: spec
                .and_then(|s| s.strategy.as_ref())
                .and_then(|s| s.type_.clone())
                .unwrap_or_else(|| "RollingUpdate".to_string()),
            labels: labels(&deployment.metadata),
            created_at: created_at(&deployment.metadata),
            status: ResourceStatus::new(phase, ready).with_detail(
                progressing.and_then(|c| c.reason.clone()),
                progressing.and_then(|c| c.message.clone()),
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: ResourceStatus<NamespacePhase>,
}

impl NamespaceInfo {
    pub fn from_k8s_namespace(ns: &Namespace) -> Self {
        let terminating = ns
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(|phase| phase == "Terminating")
            .unwrap_or(false);

        let status = if terminating {
            ResourceStatus::new(NamespacePhase::Terminating, false)
        } else {
            ResourceStatus::new(NamespacePhase::Active, true)
        };

        Self {
            name: ns.metadata.name.clone().unwrap_or_default(),
            labels: labels(&ns.metadata),
            created_at: created_at(&ns.metadata),
            status,
        }
    }
}

fn labels(meta: &ObjectMeta) -> BTreeMap<String, String> {
    meta.labels.clone().unwrap_or_default()
}

fn created_at(meta: &ObjectMeta) -> Option<DateTime<Utc>> {
    meta.creation_timestamp.as_ref().map(|t| t.0)
}
