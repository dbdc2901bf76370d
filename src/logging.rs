//! Tracing initialization.
//!
//! Structured, async-aware logging built on `tracing` + `tracing-subscriber`.
//! The filter defaults to the configured level but is overridable through the
//! standard `RUST_LOG` environment variable.

use tracing_subscriber::EnvFilter;

use crate::error::{DaqError, DaqResult};

/// Initialize the global tracing subscriber.
///
/// `default_level` is used when `RUST_LOG` is not set. Calling this twice
/// returns an error (the subscriber can only be installed once per process);
/// tests therefore never call it and rely on the default no-op subscriber.
pub fn init(default_level: &str) -> DaqResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| DaqError::Configuration(format!("invalid log level: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(false)
        .try_init()
        .map_err(|e| DaqError::Configuration(format!("failed to install subscriber: {e}")))?;

    Ok(())
}
