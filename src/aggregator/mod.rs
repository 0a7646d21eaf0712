//! Parallel multi-cluster aggregation
//!
//! Every known context is queried concurrently under a per-context deadline.
//! A context that fails, times out or panics becomes an `Offline` snapshot;
//! only an empty context set fails the whole call.

pub mod scatter;

use crate::k8s::types::ClusterSnapshot;
use crate::metrics::Metrics;
use crate::{KubeyError, Result};
use async_trait::async_trait;
use scatter::{scatter_gather, GatherError, ScatterConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where contexts and per-context snapshots come from.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    /// The current context set. Must be read fresh on every call.
    async fn context_names(&self) -> Result<Vec<String>>;

    /// Server version plus cheap resource counts for one context.
    async fn snapshot(&self, context: &str) -> Result<ClusterSnapshot>;
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub timeout: Duration,
    pub max_concurrency: Option<usize>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            timeout: crate::k8s::DEFAULT_TIMEOUT,
            max_concurrency: None,
        }
    }
}

pub struct Aggregator {
    source: Arc<dyn SnapshotSource>,
    config: AggregatorConfig,
    metrics: Metrics,
}

impl Aggregator {
    pub fn new(source: Arc<dyn SnapshotSource>, config: AggregatorConfig, metrics: Metrics) -> Self {
        Self {
            source,
            config,
            metrics,
        }
    }

    pub async fn context_names(&self) -> Result<Vec<String>> {
        let mut contexts = self.source.context_names().await?;
        contexts.sort();
        contexts.dedup();
        Ok(contexts)
    }

    /// One snapshot per context, sorted by context name.
    pub async fn aggregate(&self) -> Result<Vec<ClusterSnapshot>> {
        let started = Instant::now();

        let contexts = self.context_names().await?;
        if contexts.is_empty() {
            return Err(KubeyError::NoContexts);
        }

        debug!("Aggregating {} contexts", contexts.len());

        let scatter = ScatterConfig {
            deadline: self.config.timeout,
            max_concurrency: self.config.max_concurrency,
        };

        let source = self.source.clone();
        let results = scatter_gather(contexts, scatter, move |context| {
            let source = source.clone();
            let context = context.clone();
            async move { source.snapshot(&context).await }
        })
        .await;

        let snapshots: Vec<ClusterSnapshot> = results
            .into_iter()
            .map(|(context, outcome)| match outcome {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!("Failed to query context {}: {}", context, err);
                    offline_snapshot(&context, err)
                }
            })
            .collect();

        let offline = snapshots.iter().filter(|s| s.is_offline()).count();
        self.metrics.observe_aggregation(started.elapsed(), offline);

        info!(
            "Aggregated {} clusters ({} offline) in {:?}",
            snapshots.len(),
            offline,
            started.elapsed()
        );

        Ok(snapshots)
    }

    /// Snapshot for one cluster id from a fresh aggregation.
    pub async fn cluster(&self, id: &str) -> Result<ClusterSnapshot> {
        self.aggregate()
            .await?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| KubeyError::NotFound(format!("cluster {}", id)))
    }
}

fn offline_snapshot(context: &str, err: GatherError<KubeyError>) -> ClusterSnapshot {
    match err {
        GatherError::TimedOut(deadline) => ClusterSnapshot::offline(
            context,
            "Timeout",
            format!("no response within {:?}", deadline),
        ),
        GatherError::Failed(e) => ClusterSnapshot::offline(context, "Connection failed", e.to_string()),
        GatherError::Panicked(msg) => ClusterSnapshot::offline(context, "Worker failed", msg),
    }
}
