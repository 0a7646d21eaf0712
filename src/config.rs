//! Runtime configuration assembled from CLI flags and environment.

use crate::aggregator::AggregatorConfig;
use crate::hub::{HubConfig, PumpConfig};
use crate::source::SourceConfig;
use crate::{KubeyError, Result};
use std::path::PathBuf;

pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &["http://localhost:5173", "http://127.0.0.1:5173"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Explicit kubeconfig path; `None` uses the standard resolution.
    pub kubeconfig: Option<PathBuf>,
    pub allowed_origins: Vec<String>,
    pub aggregator: AggregatorConfig,
    pub hub: HubConfig,
    pub pump: PumpConfig,
    pub source: SourceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            kubeconfig: None,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect(),
            aggregator: AggregatorConfig::default(),
            hub: HubConfig::default(),
            pump: PumpConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.aggregator.timeout.is_zero() {
            return Err(KubeyError::ConfigError(
                "cluster timeout must be greater than zero".to_string(),
            ));
        }
        if self.aggregator.max_concurrency == Some(0) {
            return Err(KubeyError::ConfigError(
                "max concurrency must be at least 1".to_string(),
            ));
        }
        if self.hub.mailbox_capacity == 0 || self.hub.broadcast_capacity == 0 {
            return Err(KubeyError::ConfigError(
                "queue capacities must be at least 1".to_string(),
            ));
        }
        if self.pump.ping_interval.is_zero() || self.source.interval.is_zero() {
            return Err(KubeyError::ConfigError(
                "intervals must be greater than zero".to_string(),
            ));
        }
        if self.pump.liveness_timeout <= self.pump.ping_interval {
            return Err(KubeyError::ConfigError(format!(
                "liveness timeout ({:?}) must exceed the ping interval ({:?})",
                self.pump.liveness_timeout, self.pump.ping_interval
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.aggregator.timeout, Duration::from_secs(5));
        assert_eq!(config.hub.mailbox_capacity, 256);
    }

    #[test]
    fn test_liveness_must_exceed_ping() {
        let mut config = Config::default();
        config.pump.liveness_timeout = config.pump.ping_interval;

        assert!(matches!(config.validate(), Err(KubeyError::ConfigError(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = Config::default();
        config.hub.mailbox_capacity = 0;

        assert!(config.validate().is_err());
    }
}
