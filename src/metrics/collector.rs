use crate::{KubeyError, Result};
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::time::Duration;

/// Process metrics for the aggregator and the broadcast hub.
///
/// Cheap to clone; every clone records into the same registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    ws_connections: IntGauge,
    ws_connections_total: IntCounter,
    events_delivered: IntCounter,
    broadcasts_dropped: IntCounter,
    backpressure_disconnects: IntCounter,
    aggregations: IntCounter,
    clusters_offline: IntGauge,
    aggregation_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let ws_connections = IntGauge::new("kubey_ws_connections", "Active WebSocket connections")
            .map_err(metrics_error)?;
        let ws_connections_total = IntCounter::new(
            "kubey_ws_connections_total",
            "WebSocket connections accepted",
        )
        .map_err(metrics_error)?;
        let events_delivered = IntCounter::new(
            "kubey_ws_events_delivered_total",
            "Events placed into connection mailboxes",
        )
        .map_err(metrics_error)?;
        let broadcasts_dropped = IntCounter::new(
            "kubey_ws_broadcasts_dropped_total",
            "Broadcasts dropped because the hub intake queue was full",
        )
        .map_err(metrics_error)?;
        let backpressure_disconnects = IntCounter::new(
            "kubey_ws_backpressure_disconnects_total",
            "Connections removed because their mailbox was full",
        )
        .map_err(metrics_error)?;
        let aggregations = IntCounter::new("kubey_aggregations_total", "Aggregation cycles run")
            .map_err(metrics_error)?;
        let clusters_offline = IntGauge::new(
            "kubey_clusters_offline",
            "Contexts reported offline by the last aggregation",
        )
        .map_err(metrics_error)?;
        let aggregation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "kubey_aggregation_duration_seconds",
                "Wall time of one multi-cluster aggregation",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(ws_connections.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(ws_connections_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(events_delivered.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(broadcasts_dropped.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(backpressure_disconnects.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(aggregations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(clusters_offline.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(aggregation_duration.clone()))
            .map_err(metrics_error)?;

        #[cfg(target_os = "linux")]
        registry
            .register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            ws_connections,
            ws_connections_total,
            events_delivered,
            broadcasts_dropped,
            backpressure_disconnects,
            aggregations,
            clusters_offline,
            aggregation_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn connection_opened(&self) {
        self.ws_connections.inc();
        self.ws_connections_total.inc();
    }

    pub fn connection_closed(&self) {
        self.ws_connections.dec();
    }

    pub fn event_delivered(&self) {
        self.events_delivered.inc();
    }

    pub fn broadcast_dropped(&self) {
        self.broadcasts_dropped.inc();
    }

    pub fn backpressure_disconnect(&self) {
        self.backpressure_disconnects.inc();
    }

    pub fn observe_aggregation(&self, elapsed: Duration, offline: usize) {
        self.aggregations.inc();
        self.clusters_offline.set(offline as i64);
        self.aggregation_duration.observe(elapsed.as_secs_f64());
    }

    pub fn broadcasts_dropped(&self) -> u64 {
        self.broadcasts_dropped.get()
    }

    pub fn backpressure_disconnects(&self) -> u64 {
        self.backpressure_disconnects.get()
    }

    pub fn events_delivered(&self) -> u64 {
        self.events_delivered.get()
    }

    pub fn active_connections(&self) -> i64 {
        self.ws_connections.get()
    }
}

fn metrics_error(e: prometheus::Error) -> KubeyError {
    KubeyError::MetricsError(e.to_string())
}
