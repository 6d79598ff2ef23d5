use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Install the global `fmt` subscriber. `RUST_LOG` wins over
/// `default_level` when set.
pub fn init_tracing(default_level: &str) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|error| AppError::Telemetry(error.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| AppError::Telemetry(error.to_string()))
}
