//! Error type for configuration loading.

use teapotnet_error::{ErrorKind, HasKind};

/// Errors raised while locating, reading, or parsing a configuration
/// file.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("could not read configuration file {path}: {source}")]
    Io {
        /// Path that was attempted.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file's contents were not valid TOML, or did
    /// not match the expected shape.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// A tracker URL in the configuration could not be parsed.
    #[error("invalid tracker URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl HasKind for ConfigError {
    fn kind(&self) -> ErrorKind {
        // A bad config is something an operator must fix by hand; it
        // is never retried, so it is classified the same way a
        // permanent protocol violation is.
        ErrorKind::Protocol
    }
}

/// Convenience alias for this crate's results.
pub type Result<T> = std::result::Result<T, ConfigError>;
