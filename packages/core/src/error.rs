use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while loading or validating the application configuration.
///
/// Any of these aborts startup; there is no degraded mode for a broken
/// config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error reading config: {0}")]
    Io(#[from] io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("config declares no models")]
    NoModels,
}
