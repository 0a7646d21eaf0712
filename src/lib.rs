pub mod aggregator;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod hub;
pub mod k8s;
pub mod metrics;
pub mod server;
pub mod source;

pub use error::{KubeyError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
