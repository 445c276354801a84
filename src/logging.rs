use tracing_subscriber::EnvFilter;
use crate::config::LoggingConfig;
use crate::utils::{BatchError, BatchResult};

/// Builds the filter: `RUST_LOG` wins, otherwise the configured level.
pub fn env_filter(config: &LoggingConfig) -> BatchResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| BatchError::config(format!("Invalid log level `{}`: {}", config.level, e))),
    }
}

/// Installs the global compact subscriber.
///
/// Fails instead of panicking when a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> BatchResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config)?)
        .with_file(false)         // Remove file path
        .with_line_number(false)  // Remove line numbers
        .with_thread_ids(false)   // Remove thread IDs
        .with_thread_names(false) // Remove thread names
        .with_target(false)       // Remove module path
        .with_ansi(true)          // Keep colored output
        .with_writer(std::io::stdout)
        .compact()                // Use compact formatter instead of pretty
        .try_init()
        .map_err(|e| BatchError::config(format!("Failed to install log subscriber: {}", e)))
}
