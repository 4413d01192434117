//! tracing subscriber setup for binaries and demos embedding the engine

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use crate::config::TelemetryConfig;

/// `RUST_LOG` wins over `log_level` when set
fn filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// human-readable output
pub fn init_tracing(log_level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter(log_level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

/// json lines, for log shippers
pub fn init_tracing_json(log_level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter(log_level))
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
}

pub fn init_from_config(config: &TelemetryConfig) -> Result<(), TryInitError> {
    if config.json {
        init_tracing_json(&config.log_level)
    } else {
        init_tracing(&config.log_level)
    }
}
