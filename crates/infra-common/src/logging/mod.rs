//! Logging setup
//!
//! Libraries only emit `tracing` events; binaries call [`setup_logging`]
//! once at startup.

pub mod setup;

pub use setup::{parse_log_level, setup_logging, LoggingConfig};
