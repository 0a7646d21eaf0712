use futures::channel::mpsc;
use futures::StreamExt;
use kubey::aggregator::SnapshotSource;
use kubey::config::Config;
use kubey::context::AppContext;
use kubey::hub::{Event, EventPayload, Frame, Hub, HubConfig, PumpConfig};
use kubey::k8s::{ClientProvider, ClusterSnapshot, ClusterSummary, DEFAULT_TIMEOUT};
use kubey::metrics::Metrics;
use kubey::server::create_router;
use serde_json::Value;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

fn prod_update() -> Event {
    let snapshot = ClusterSnapshot::running("prod", "v1.28.0", ClusterSummary::default());
    Event::new(EventPayload::ClusterUpdate(snapshot), Some("prod".to_string()))
}

async fn wait_for_count(hub: &Hub, expected: usize) {
    let mut count = hub.watch_connection_count();
    tokio::time::timeout(Duration::from_secs(2), count.wait_for(|n| *n == expected))
        .await
        .expect("connection count never settled")
        .unwrap();
}

async fn next_json(frames: &mut mpsc::Receiver<Frame>) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), frames.next())
            .await
            .expect("no frame written")
            .expect("writer closed");
        if let Frame::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_broadcast_reaches_every_connection_once() {
    let hub = Hub::spawn(HubConfig::default(), Metrics::new().unwrap());
    assert_eq!(hub.connection_count(), 0);

    let mut peers = Vec::new();
    for _ in 0..2 {
        let (sink, frames) = mpsc::channel::<Frame>(16);
        let (inbound_tx, inbound) = mpsc::unbounded::<io::Result<Frame>>();
        let handle = hub.attach(sink, inbound, PumpConfig::default()).unwrap();
        peers.push((handle, frames, inbound_tx));
    }
    wait_for_count(&hub, 2).await;

    hub.broadcast(prod_update()).unwrap();

    for (_, frames, _) in peers.iter_mut() {
        let welcome = next_json(frames).await;
        assert_eq!(welcome["type"], "connection_status");

        let update = next_json(frames).await;
        assert_eq!(update["type"], "cluster_update");
        assert_eq!(update["clusterId"], "prod");

        let extra = tokio::time::timeout(Duration::from_millis(100), frames.next()).await;
        assert!(extra.is_err(), "unexpected extra frame");
    }
}

struct SingleCluster;

#[async_trait::async_trait]
impl SnapshotSource for SingleCluster {
    async fn context_names(&self) -> kubey::Result<Vec<String>> {
        Ok(vec!["prod".to_string()])
    }

    async fn snapshot(&self, context: &str) -> kubey::Result<ClusterSnapshot> {
        Ok(ClusterSnapshot::running(context, "v1.28.0", ClusterSummary::default()))
    }
}

#[tokio::test]
async fn test_websocket_clients_receive_broadcast() {
    let provider = ClientProvider::new(Some(PathBuf::from("/nonexistent/kubeconfig")), DEFAULT_TIMEOUT);
    let (ctx, _events) =
        AppContext::with_source(Config::default(), provider, Arc::new(SingleCluster)).unwrap();
    let hub = ctx.hub.clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(ctx)).await.unwrap();
    });

    let url = format!("ws://{}/ws", addr);
    let (mut first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    wait_for_count(&hub, 2).await;

    hub.broadcast(prod_update()).unwrap();

    for client in [&mut first, &mut second] {
        let mut seen = Vec::new();
        while seen.len() < 2 {
            let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
                .await
                .expect("no message")
                .expect("socket closed")
                .unwrap();
            if let Message::Text(text) = msg {
                seen.push(serde_json::from_str::<Value>(text.as_str()).unwrap());
            }
        }
        assert_eq!(seen[0]["type"], "connection_status");
        assert_eq!(seen[1]["type"], "cluster_update");
        assert_eq!(seen[1]["clusterId"], "prod");
    }

    first.close(None).await.unwrap();
    wait_for_count(&hub, 1).await;

    second.close(None).await.unwrap();
    wait_for_count(&hub, 0).await;
}
