use thiserror::Error;

#[derive(Error, Debug)]
pub enum KubeyError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cluster {context} unreachable: {message}")]
    Connectivity { context: String, message: String },

    #[error("No contexts found in kubeconfig")]
    NoContexts,

    #[error("Queue full: {0}")]
    QueueFull(&'static str),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl KubeyError {
    pub fn connectivity(context: &str, err: impl std::fmt::Display) -> Self {
        KubeyError::Connectivity {
            context: context.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KubeyError>;
