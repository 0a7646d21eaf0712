use crate::context::AppContext;
use crate::k8s::{
    context_from_id, ClusterClient, ClusterSnapshot, DeploymentInfo, NamespaceInfo, NodeInfo,
    PodInfo, ServiceInfo,
};
use crate::metrics::PrometheusExporter;
use crate::{KubeyError, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceScope {
    pub namespace: Option<String>,
}

impl NamespaceScope {
    fn as_deref(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "time": Utc::now().timestamp(),
    }))
}

pub async fn list_clusters(State(ctx): State<AppContext>) -> Result<Json<Vec<ClusterSnapshot>>> {
    let clusters = ctx.aggregator.aggregate().await?;
    Ok(Json(clusters))
}

pub async fn refresh_clusters(State(ctx): State<AppContext>) -> (StatusCode, Json<Value>) {
    let status = if ctx.refresh.request() {
        "queued"
    } else {
        "pending"
    };
    (StatusCode::ACCEPTED, Json(json!({ "status": status })))
}

pub async fn get_cluster(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<ClusterSnapshot>> {
    let cluster = ctx.aggregator.cluster(&id).await?;
    Ok(Json(cluster))
}

pub async fn list_nodes(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Vec<NodeInfo>>> {
    let client = cluster_client(&ctx, &id).await?;
    let nodes = client.list_nodes().await?;
    Ok(Json(nodes.iter().map(NodeInfo::from_k8s_node).collect()))
}

pub async fn list_pods(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(scope): Query<NamespaceScope>,
) -> Result<Json<Vec<PodInfo>>> {
    let client = cluster_client(&ctx, &id).await?;
    let pods = client.list_pods(scope.as_deref()).await?;
    Ok(Json(pods.iter().map(PodInfo::from_k8s_pod).collect()))
}

pub async fn list_services(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(scope): Query<NamespaceScope>,
) -> Result<Json<Vec<ServiceInfo>>> {
    let client = cluster_client(&ctx, &id).await?;
    let services = client.list_services(scope.as_deref()).await?;
    Ok(Json(services.iter().map(ServiceInfo::from_k8s_service).collect()))
}

pub async fn list_deployments(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(scope): Query<NamespaceScope>,
) -> Result<Json<Vec<DeploymentInfo>>> {
    let client = cluster_client(&ctx, &id).await?;
    let deployments = client.list_deployments(scope.as_deref()).await?;
    Ok(Json(
        deployments
            .iter()
            .map(DeploymentInfo::from_k8s_deployment)
            .collect(),
    ))
}

pub async fn list_namespaces(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Vec<NamespaceInfo>>> {
    let client = cluster_client(&ctx, &id).await?;
    let namespaces = client.list_namespaces().await?;
    Ok(Json(
        namespaces
            .iter()
            .map(NamespaceInfo::from_k8s_namespace)
            .collect(),
    ))
}

pub async fn ws_status(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!({
        "connected_clients": ctx.hub.connection_count(),
        "status": "active",
    }))
}

pub async fn metrics(State(ctx): State<AppContext>) -> Result<Response> {
    let exporter = PrometheusExporter::new(ctx.metrics.clone());
    let body = exporter.render()?;
    Ok(([(header::CONTENT_TYPE, exporter.content_type())], body).into_response())
}

/// Client for the context named by a cluster id; unknown ids are not found.
async fn cluster_client(ctx: &AppContext, id: &str) -> Result<ClusterClient> {
    let not_found = || KubeyError::NotFound(format!("cluster {}", id));

    let context = context_from_id(id).ok_or_else(not_found)?;
    if !ctx.provider.context_names().await?.iter().any(|c| c == context) {
        return Err(not_found());
    }

    debug!("Listing resources for context {}", context);
    ctx.provider.resolve(context).await
}
