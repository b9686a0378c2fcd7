//! Tracing/logging bootstrap.

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::logging::LoggingConfig;
use crate::error::EngineError;

/// Initialize the global tracing subscriber.
///
/// The filter is taken from `RUST_LOG` when set, otherwise from the
/// configured level. Uses `try_init` so repeated calls (test suites)
/// surface as an error instead of a panic.
pub fn init(config: &LoggingConfig) -> Result<(), EngineError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format.as_str() {
        "json" => fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
        _ => fmt()
            .with_env_filter(filter)
            .try_init(),
    };

    result.map_err(|e| EngineError::configuration(format!("Failed to init logging: {e}")))
}
