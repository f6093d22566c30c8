//! # Infra-Common: Shared Infrastructure for rplay
//!
//! Ambient services every rplay binary needs and no library should install
//! on its own:
//!
//! - **Logging**: a `tracing-subscriber` setup with env-filter overrides and
//!   optional JSON output
//! - **Configuration**: TOML or JSON files deserialized into any serde type,
//!   with the format chosen by file extension
//! - **Errors**: a small error type with component/operation context

#![warn(missing_docs)]

pub mod config;
pub mod errors;
pub mod logging;

pub use config::{load_config, parse_config, ConfigFormat};
pub use errors::{Error, ErrorContext, ErrorExt, Result};
pub use logging::{parse_log_level, setup_logging, LoggingConfig};
