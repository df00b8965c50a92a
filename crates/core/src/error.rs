use std::path::PathBuf;
use thiserror::Error;

/// A parameter that failed validation. Reported before any process starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },

    #[error("{field} must be a number (got {value:?})")]
    NotNumeric { field: &'static str, value: String },

    #[error("unknown parameter: {field}")]
    UnknownField { field: String },

    #[error("{field} not found: {}", path.display())]
    FileNotFound { field: &'static str, path: PathBuf },
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{name} not found. Pass the binary path manually with --binary or set it in the config file.")]
    BinaryNotFound { name: &'static str },

    #[error("failed to start {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a process is already running")]
    Busy,

    #[error("failed to create health check client: {0}")]
    HealthClient(#[from] reqwest::Error),
}
