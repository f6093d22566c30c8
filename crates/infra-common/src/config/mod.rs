//! Configuration file loading
//!
//! Any serde type can be read from TOML or JSON. The format follows the file
//! extension; unknown extensions are tried as TOML.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::{Error, ErrorContext, ErrorExt, Result};

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toml => f.write_str("toml"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Deserialize a document held in memory
pub fn parse_config<T: DeserializeOwned>(text: &str, format: ConfigFormat) -> Result<T> {
    match format {
        ConfigFormat::Toml => Ok(toml::from_str(text)?),
        ConfigFormat::Json => Ok(serde_json::from_str(text)?),
    }
}

/// Read and deserialize a configuration file
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path);
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loading {} configuration from {}", format, path.display());
    parse_config(&text, format).map_err(|e| {
        e.context(ErrorContext::new("config", "load").with_details(path.display().to_string()))
    })
}
