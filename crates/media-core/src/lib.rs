//! # Media-Core: Playout Pipeline for Live Streams
//!
//! This library drives the path from transport bytes to frames ready for a
//! decoder: demultiplexing, payload decryption, jitter buffering against a
//! playout clock and latency control.
//!
//! ## Features
//!
//! - **Scheduler**: continuous or buffered release anchored to the first
//!   frame of the clock media, with drop-until-keyframe recovery once the
//!   network delay exceeds the configured limit
//! - **GOP protection**: repeated timestamps truncate the queue back to the
//!   newest keyframe
//! - **Payload security**: AES-CTR, SM4-ECB and XOR decryption of slice NAL
//!   bodies and audio payloads
//! - **Sessions**: a synchronous [`PlaybackSession`] and a tokio-backed
//!   [`SessionHandle`] with bounded channels
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use rplay_media_core::{BufferMode, ManualClock, PlaybackSession, SessionConfig};
//! use rplay_demux_core::ContainerKind;
//!
//! let config = SessionConfig::new(ContainerKind::Flv).with_buffer_mode(BufferMode::Continuous);
//! let mut session = PlaybackSession::new(config, Arc::new(ManualClock::new(0))).unwrap();
//! let outputs = session.push(b"FLV\x01\x05\x00\x00\x00\x09").unwrap();
//! assert_eq!(outputs.len(), 1);
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod clock;
pub mod error;
pub mod security;
pub mod session;

// Re-export commonly used types
pub use buffer::{BufferMode, Scheduler, SchedulerConfig, SchedulerOutput, SchedulerSignal, SchedulerStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use security::{CryptoConfig, CryptoMode, Decryptor, PayloadCipher};
pub use session::{
    ConfigUpdate, PlaybackSession, SessionCommand, SessionConfig, SessionEvent, SessionHandle, SessionOutput,
};

/// Version information for the media library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
