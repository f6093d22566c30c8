use std::path::PathBuf;

use thiserror::Error;

/// Result alias for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by infrastructure services
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A configuration document could not be deserialized
    #[error("Invalid {format} document: {reason}")]
    Parse {
        /// Document format
        format: &'static str,
        /// Parser message
        reason: String,
    },

    /// The global subscriber could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// Error annotated with where it happened
    #[error("{message} [{context}]")]
    Context {
        /// Original message
        message: String,
        /// Where it happened
        context: super::ErrorContext,
    },
}

impl Error {
    /// Shorthand for [`Error::Config`]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse {
            format: "TOML",
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse {
            format: "JSON",
            reason: e.to_string(),
        }
    }
}
