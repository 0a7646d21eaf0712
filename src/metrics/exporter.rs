use crate::metrics::collector::Metrics;
use crate::{KubeyError, Result};
use prometheus::{Encoder, TextEncoder};

/// Renders the registry in the Prometheus text exposition format.
pub struct PrometheusExporter {
    metrics: Metrics,
}

impl PrometheusExporter {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.metrics.registry().gather();

        let mut buf = Vec::new();
        encoder
            .encode(&families, &mut buf)
            .map_err(|e| KubeyError::MetricsError(e.to_string()))?;

        String::from_utf8(buf).map_err(|e| KubeyError::MetricsError(e.to_string()))
    }
}
