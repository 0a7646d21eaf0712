use crate::aggregator::{Aggregator, SnapshotSource};
use crate::config::Config;
use crate::hub::Hub;
use crate::k8s::ClientProvider;
use crate::metrics::Metrics;
use crate::source::{EventSource, RefreshTrigger};
use crate::Result;
use std::sync::Arc;

/// Everything request handlers and background tasks share.
///
/// Built once at startup and cloned into each consumer.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub provider: ClientProvider,
    pub aggregator: Arc<Aggregator>,
    pub hub: Hub,
    pub refresh: RefreshTrigger,
    pub metrics: Metrics,
}

impl AppContext {
    /// Context backed by the kubeconfig. The returned event source must be run
    /// by the caller. Spawns the hub, so it needs a running runtime.
    pub fn new(config: Config) -> Result<(Self, EventSource)> {
        let provider = ClientProvider::new(config.kubeconfig.clone(), config.aggregator.timeout);
        let source = Arc::new(provider.clone());
        Self::with_source(config, provider, source)
    }

    /// Context whose snapshots come from `source` instead of `provider`.
    pub fn with_source(
        config: Config,
        provider: ClientProvider,
        source: Arc<dyn SnapshotSource>,
    ) -> Result<(Self, EventSource)> {
        config.validate()?;

        let metrics = Metrics::new()?;
        let aggregator = Arc::new(Aggregator::new(
            source,
            config.aggregator.clone(),
            metrics.clone(),
        ));
        let hub = Hub::spawn(config.hub.clone(), metrics.clone());
        let (events, refresh) =
            EventSource::new(aggregator.clone(), hub.clone(), config.source.clone());

        let context = Self {
            config: Arc::new(config),
            provider,
            aggregator,
            hub,
            refresh,
            metrics,
        };

        Ok((context, events))
    }
}
