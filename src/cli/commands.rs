use crate::aggregator::Aggregator;
use crate::cli::{ClusterArgs, Commands, ServeArgs};
use crate::context::AppContext;
use crate::k8s::{ClientProvider, ClusterSnapshot};
use crate::metrics::Metrics;
use crate::server;
use crate::Result;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Serve(args) => handle_serve(args).await,
        Commands::Clusters { cluster, json } => handle_clusters(cluster, json).await,
        Commands::Contexts { cluster } => handle_contexts(cluster).await,
    }
}

async fn handle_serve(args: ServeArgs) -> Result<()> {
    let (ctx, events) = AppContext::new(args.into_config())?;
    let addr = ctx.config.bind_addr();

    let shutdown = CancellationToken::new();
    let source_task = tokio::spawn(events.run(shutdown.clone()));

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("WebSocket endpoint at ws://{}/ws", addr);

    let app = server::create_router(ctx);
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = source_task.await {
        error!("Event source task failed: {}", e);
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn handle_clusters(cluster: ClusterArgs, json: bool) -> Result<()> {
    let config = cluster.aggregator_config();
    let provider = ClientProvider::new(cluster.kubeconfig, config.timeout);
    let aggregator = Aggregator::new(Arc::new(provider), config, Metrics::new()?);

    info!("Querying clusters");
    let snapshots = aggregator.aggregate().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
    } else {
        print!("{}", render_table(&snapshots));
    }
    Ok(())
}

async fn handle_contexts(cluster: ClusterArgs) -> Result<()> {
    let timeout = cluster.aggregator_config().timeout;
    let provider = ClientProvider::new(cluster.kubeconfig, timeout);
    let contexts = provider.context_names().await?;

    if contexts.is_empty() {
        println!("No contexts found in kubeconfig");
    }
    for context in contexts {
        println!("{}", context);
    }
    Ok(())
}

fn render_table(snapshots: &[ClusterSnapshot]) -> String {
    let width = snapshots
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max("CONTEXT".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:<10}  {:<8}  {:>7}  {:>9}  {:>10}",
        "CONTEXT", "VERSION", "STATUS", "NODES", "PODS", "NAMESPACES"
    );

    for snap in snapshots {
        let s = &snap.summary;
        let _ = write!(
            out,
            "{:<width$}  {:<10}  {:<8}  {:>7}  {:>9}  {:>10}",
            snap.name,
            snap.version,
            snap.phase().to_string(),
            format!("{}/{}", s.ready_nodes, s.total_nodes),
            format!("{}/{}", s.running_pods, s.total_pods),
            s.total_namespaces,
        );
        if let Some(reason) = &snap.status.reason {
            let _ = write!(out, "  ({})", reason);
        }
        out.push('\n');
    }
    out
}
