//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins over the configured level when set. Returns `false` when a
/// global subscriber was already installed, which leaves that one in place.
pub fn init(config: &LoggingConfig) -> Result<bool> {
    let filter = build_filter(config)?;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level = %config.level, "Logging initialized");
    }
    Ok(installed)
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| Error::Configuration(format!("Invalid log level {:?}: {}", config.level, e)))
}
