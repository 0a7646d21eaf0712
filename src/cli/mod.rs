pub mod commands;

use crate::aggregator::AggregatorConfig;
use crate::config::{Config, DEFAULT_ALLOWED_ORIGINS};
use crate::hub::{HubConfig, PumpConfig};
use crate::source::SourceConfig;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kubey")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-cluster Kubernetes dashboard backend with realtime updates", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP and WebSocket server")]
    Serve(ServeArgs),
    #[command(about = "Query every context once and print the result")]
    Clusters {
        #[command(flatten)]
        cluster: ClusterArgs,

        #[arg(long, help = "Print JSON instead of a table")]
        json: bool,
    },
    #[command(about = "List the contexts found in the kubeconfig")]
    Contexts {
        #[command(flatten)]
        cluster: ClusterArgs,
    },
}

/// Options shared by every command that talks to clusters.
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    #[arg(long, env = "KUBECONFIG_PATH", help = "Kubeconfig path (default: KUBECONFIG, then ~/.kube/config)")]
    pub kubeconfig: Option<PathBuf>,

    #[arg(long, env = "CLUSTER_TIMEOUT_SECS", default_value_t = 5, help = "Per-cluster query timeout in seconds")]
    pub cluster_timeout_secs: u64,

    #[arg(long, env = "MAX_CONCURRENCY", help = "Maximum clusters queried at once (default: unlimited)")]
    pub max_concurrency: Option<usize>,
}

impl ClusterArgs {
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            timeout: Duration::from_secs(self.cluster_timeout_secs),
            max_concurrency: self.max_concurrency,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    #[arg(long, env = "HOST", default_value = "127.0.0.1", help = "Address to bind")]
    pub host: String,

    #[arg(short, long, env = "PORT", default_value_t = 8080, help = "Port to listen on")]
    pub port: u16,

    #[arg(long, env = "WS_MAILBOX_CAPACITY", default_value_t = 256, help = "Events buffered per WebSocket client")]
    pub mailbox_capacity: usize,

    #[arg(long, env = "WS_BROADCAST_CAPACITY", default_value_t = 64, help = "Broadcasts buffered by the hub")]
    pub broadcast_capacity: usize,

    #[arg(long, env = "WS_PING_INTERVAL_SECS", default_value_t = 25, help = "Seconds between keepalive pings")]
    pub ping_interval_secs: u64,

    #[arg(long, env = "WS_LIVENESS_TIMEOUT_SECS", default_value_t = 60, help = "Seconds of silence before a client is dropped")]
    pub liveness_timeout_secs: u64,

    #[arg(long, env = "REFRESH_INTERVAL_SECS", default_value_t = 30, help = "Seconds between background refreshes")]
    pub refresh_interval_secs: u64,

    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',', help = "Comma-separated CORS origins")]
    pub allowed_origins: Vec<String>,
}

impl ServeArgs {
    pub fn into_config(self) -> Config {
        let allowed_origins = if self.allowed_origins.is_empty() {
            DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect()
        } else {
            self.allowed_origins
                .into_iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect()
        };

        Config {
            host: self.host,
            port: self.port,
            kubeconfig: self.cluster.kubeconfig.clone(),
            allowed_origins,
            aggregator: self.cluster.aggregator_config(),
            hub: HubConfig {
                mailbox_capacity: self.mailbox_capacity,
                broadcast_capacity: self.broadcast_capacity,
            },
            pump: PumpConfig {
                ping_interval: Duration::from_secs(self.ping_interval_secs),
                liveness_timeout: Duration::from_secs(self.liveness_timeout_secs),
                ..PumpConfig::default()
            },
            source: SourceConfig {
                interval: Duration::from_secs(self.refresh_interval_secs),
            },
        }
    }
}
