pub mod error;
pub mod handlers;
pub mod ws;

use crate::context::AppContext;
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{warn, Level};

pub fn create_router(ctx: AppContext) -> Router {
    let cors = build_cors_layer(&ctx.config.allowed_origins);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    let api = Router::new()
        .route("/clusters", get(handlers::list_clusters))
        .route("/clusters/refresh", post(handlers::refresh_clusters))
        .route("/clusters/{id}", get(handlers::get_cluster))
        .route("/clusters/{id}/nodes", get(handlers::list_nodes))
        .route("/clusters/{id}/pods", get(handlers::list_pods))
        .route("/clusters/{id}/services", get(handlers::list_services))
        .route("/clusters/{id}/deployments", get(handlers::list_deployments))
        .route("/clusters/{id}/namespaces", get(handlers::list_namespaces));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/ws", get(ws::ws_handler))
        .route("/ws/status", get(handlers::ws_status))
        .nest("/api", api)
        .layer(trace_layer)
        .layer(cors)
        .with_state(ctx)
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                warn!("CORS: Invalid origin in config: {}", origin);
                None
            })
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        warn!("CORS: No valid origins configured, denying cross-origin requests");
        AllowOrigin::exact(HeaderValue::from_static("null"))
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SnapshotSource;
    use crate::config::Config;
    use crate::k8s::{ClientProvider, ClusterSnapshot, ClusterSummary, DEFAULT_TIMEOUT};
    use crate::{KubeyError, Result};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct FixedSource(Vec<&'static str>);

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn context_names(&self) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }

        async fn snapshot(&self, context: &str) -> Result<ClusterSnapshot> {
            if context == "broken" {
                return Err(KubeyError::connectivity(context, "connection refused"));
            }
            Ok(ClusterSnapshot::running(context, "v1.28.0", ClusterSummary::default()))
        }
    }

    fn app(contexts: Vec<&'static str>) -> Router {
        let provider = ClientProvider::new(Some(PathBuf::from("/nonexistent/kubeconfig")), DEFAULT_TIMEOUT);
        let (ctx, _source) =
            AppContext::with_source(Config::default(), provider, Arc::new(FixedSource(contexts)))
                .unwrap();
        create_router(ctx)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, json) = get_json(app(vec!["prod"]), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["time"].is_i64());
    }

    #[tokio::test]
    async fn test_list_clusters() {
        let (status, json) = get_json(app(vec!["prod", "broken"]), "/api/clusters").await;

        assert_eq!(status, StatusCode::OK);
        let clusters = json.as_array().unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0]["id"], "context-broken");
        assert_eq!(clusters[0]["status"]["phase"], "Offline");
        assert_eq!(clusters[1]["version"], "v1.28.0");
    }

    #[tokio::test]
    async fn test_no_contexts_is_unavailable() {
        let (status, json) = get_json(app(vec![]), "/api/clusters").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["code"], "NO_CONTEXTS");
    }

    #[tokio::test]
    async fn test_get_cluster_by_id() {
        let (status, json) = get_json(app(vec!["prod"]), "/api/clusters/context-prod").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "prod");

        let (status, _) = get_json(app(vec!["prod"]), "/api/clusters/context-nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_detail_listing_rejects_malformed_id() {
        let (status, json) = get_json(app(vec!["prod"]), "/api/clusters/prod/nodes").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unreadable_kubeconfig_is_server_error() {
        // The router's provider points at a kubeconfig that does not exist.
        let (status, json) = get_json(app(vec!["prod"]), "/api/clusters/context-prod/nodes").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "CONFIG_ERROR");
    }

    #[tokio::test]
    async fn test_refresh_is_accepted() {
        let response = app(vec!["prod"])
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/clusters/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_ws_status_and_metrics() {
        let router = app(vec!["prod"]);

        let (status, json) = get_json(router.clone(), "/ws/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["connected_clients"], 0);
        assert_eq!(json["status"], "active");

        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("kubey_ws_connections"));
    }
}
