use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Configuration failures, from locating files to checking values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly named config file does not exist.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The commented default config could not be written.
    #[error("cannot write default config {}: {source}", path.display())]
    WriteDefault {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A config file or directory could not be read or created.
    #[error("cannot access {}: {source}", path.display())]
    Access {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A layer is not valid TOML or does not fit the schema.
    #[error("invalid config in {origin}: {message}")]
    Parse {
        /// File path, or `<inline>` for strings.
        origin: String,
        message: String,
    },

    /// A value is out of range.
    #[error("{field}: {message}")]
    Validation {
        /// Dotted key, e.g. `session.request_timeout_ms`.
        field: String,
        message: String,
    },

    /// No home directory to anchor the standard paths.
    #[error("cannot determine home directory")]
    NoHomeDir,
}

impl ConfigError {
    pub(crate) fn access(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| ConfigError::Access { path, source }
    }

    pub(crate) fn parse(origin: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ConfigError::Parse {
            origin: origin.into(),
            message: err.to_string(),
        }
    }
}
