use crate::aggregator::SnapshotSource;
use crate::k8s::types::{ClusterSnapshot, ClusterSummary};
use crate::{KubeyError, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds clients bound to one kubeconfig context.
///
/// The kubeconfig is re-read on every call so contexts added or removed on disk
/// are visible without a restart.
#[derive(Debug, Clone)]
pub struct ClientProvider {
    kubeconfig: Option<PathBuf>,
    timeout: Duration,
}

impl ClientProvider {
    /// `kubeconfig = None` uses the standard resolution (`KUBECONFIG`, then `~/.kube/config`).
    pub fn new(kubeconfig: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            kubeconfig,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Reads and parses the kubeconfig on the blocking pool.
    pub async fn load_kubeconfig(&self) -> Result<Kubeconfig> {
        let path = self.kubeconfig.clone();

        let loaded = tokio::task::spawn_blocking(move || match path {
            Some(path) => Kubeconfig::read_from(path),
            None => Kubeconfig::read(),
        })
        .await
        .map_err(|e| KubeyError::ConfigError(format!("Kubeconfig reader failed: {}", e)))?;

        loaded.map_err(|e| KubeyError::ConfigError(format!("Failed to load kubeconfig: {}", e)))
    }

    /// Sorted, de-duplicated context names.
    pub async fn context_names(&self) -> Result<Vec<String>> {
        let kubeconfig = self.load_kubeconfig().await?;

        let mut names: Vec<String> = kubeconfig.contexts.into_iter().map(|c| c.name).collect();
        names.sort();
        names.dedup();

        Ok(names)
    }

    pub async fn resolve(&self, context: &str) -> Result<ClusterClient> {
        let kubeconfig = self.load_kubeconfig().await?;

        if !kubeconfig.contexts.iter().any(|c| c.name == context) {
            return Err(KubeyError::ConfigError(format!(
                "Context {} not found in kubeconfig",
                context
            )));
        }

        let options = KubeConfigOptions {
            context: Some(context.to_string()),
            ..Default::default()
        };

        let mut config = Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| {
                KubeyError::ConfigError(format!(
                    "Failed to build config for context {}: {}",
                    context, e
                ))
            })?;
        config.connect_timeout = Some(self.timeout);
        config.read_timeout = Some(self.timeout);

        let client = Client::try_from(config).map_err(|e| KubeyError::connectivity(context, e))?;

        debug!("Resolved client for context {}", context);

        Ok(ClusterClient {
            context: context.to_string(),
            client,
        })
    }
}

#[async_trait]
impl SnapshotSource for ClientProvider {
    async fn context_names(&self) -> Result<Vec<String>> {
        ClientProvider::context_names(self).await
    }

    async fn snapshot(&self, context: &str) -> Result<ClusterSnapshot> {
        self.resolve(context).await?.snapshot().await
    }
}

/// Read-only client for one cluster context.
#[derive(Clone)]
pub struct ClusterClient {
    context: String,
    client: Client,
}

impl ClusterClient {
    pub fn context(&self) -> &str {
        &self.context
    }

    pub async fn server_version(&self) -> Result<String> {
        let info = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| KubeyError::connectivity(&self.context, e))?;

        Ok(info.git_version)
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.list_all(&ListParams::default()).await
    }

    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        self.list_all(&ListParams::default()).await
    }

    pub async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>> {
        self.list_scoped(namespace, &ListParams::default()).await
    }

    pub async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>> {
        self.list_scoped(namespace, &ListParams::default()).await
    }

    pub async fn list_deployments(&self, namespace: Option<&str>) -> Result<Vec<Deployment>> {
        self.list_scoped(namespace, &ListParams::default()).await
    }

    /// Server version plus cheap resource counts.
    ///
    /// Only the version call is fatal; a failed count query leaves that count at zero.
    pub async fn snapshot(&self) -> Result<ClusterSnapshot> {
        let version = self.server_version().await?;

        let capped = ListParams::default().limit(1000);
        let pod_params = ListParams::default().limit(10000);
        let all = ListParams::default();

        let (nodes, namespaces, pods, deployments, services) = tokio::join!(
            self.list_all::<Node>(&capped),
            self.list_all::<Namespace>(&all),
            self.list_all::<Pod>(&pod_params),
            self.list_all::<Deployment>(&capped),
            self.list_all::<Service>(&capped),
        );

        let mut summary = ClusterSummary::default();
        match nodes {
            Ok(nodes) => summary.count_nodes(&nodes),
            Err(e) => debug!("{}: node count unavailable: {}", self.context, e),
        }
        match pods {
            Ok(pods) => summary.count_pods(&pods),
            Err(e) => debug!("{}: pod count unavailable: {}", self.context, e),
        }
        match namespaces {
            Ok(items) => summary.total_namespaces = items.len(),
            Err(e) => debug!("{}: namespace count unavailable: {}", self.context, e),
        }
        match deployments {
            Ok(items) => summary.total_deployments = items.len(),
            Err(e) => debug!("{}: deployment count unavailable: {}", self.context, e),
        }
        match services {
            Ok(items) => summary.total_services = items.len(),
            Err(e) => debug!("{}: service count unavailable: {}", self.context, e),
        }

        Ok(ClusterSnapshot::running(&self.context, version, summary))
    }

    async fn list_all<K>(&self, params: &ListParams) -> Result<Vec<K>>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        let api: Api<K> = Api::all(self.client.clone());
        self.fetch(api, params).await
    }

    async fn list_scoped<K>(&self, namespace: Option<&str>, params: &ListParams) -> Result<Vec<K>>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api: Api<K> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        self.fetch(api, params).await
    }

    async fn fetch<K>(&self, api: Api<K>, params: &ListParams) -> Result<Vec<K>>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        let list = api.list(params).await.map_err(|e| {
            KubeyError::KubernetesError(format!(
                "Failed to list {} in {}: {}",
                K::plural(&()),
                self.context,
                e
            ))
        })?;

        Ok(list.items)
    }
}
