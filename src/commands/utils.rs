use anyhow::Result;
use std::path::Path;

use crate::agent::{FileScheduleSource, LoadOutcome, ScheduleLoader, ScheduleStore};
use crate::config::{self, AkerConfig};
use crate::error::AkerError;

/// Initialize logging
///
/// `RUST_LOG` wins over the configured level; `--verbose` forces debug.
pub fn init_logging(verbose: bool, level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = if verbose { "debug" } else { level };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Load the configuration from `path`, or from the platform location
pub fn load_config(path: Option<&Path>) -> Result<AkerConfig> {
    match path {
        Some(path) => AkerConfig::load(path),
        None => AkerConfig::load(&config::get_config_path()?),
    }
}

/// Install the persisted schedule at `data_file` into `store`
///
/// A missing file leaves the store empty and is not an error.
pub async fn load_persisted(
    data_file: &Path,
    store: &ScheduleStore,
) -> Result<LoadOutcome, AkerError> {
    ScheduleLoader::new(FileScheduleSource::new(data_file))
        .poll(store)
        .await
}
