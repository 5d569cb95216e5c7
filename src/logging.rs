use tracing_subscriber::EnvFilter;

use crate::error::{BotError, Result};

/// Installs a global fmt subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| BotError::config_error_with_source("Invalid log filter", e))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| BotError::config_error_with_source("Failed to install logger", e))
}
