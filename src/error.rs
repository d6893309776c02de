// error.rs

use thiserror::Error;

/// Failures reading from the parameter store.
///
/// None of these ever reach the control loop: the engine keeps its last
/// cached value whenever a read fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parameter store is busy")]
    Busy,

    #[error("parameter `{0}` is not known to the store")]
    MissingKey(String),

    #[error("failed to read parameter file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse parameter file: {0}")]
    Parse(#[from] toml::de::Error),
}
