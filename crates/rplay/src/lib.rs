//! # rplay - Live stream playout for Rust
//!
//! This crate turns live transport bytes into paced, decoder-ready frames.
//!
//! ## Overview
//!
//! The rplay library is composed of several core components:
//!
//! - **Codec Core**: bitstream readers and codec parameter parsers
//! - **Demux Core**: incremental FLV, MPEG-TS, fMP4, naked Annex-B and MPEG-4
//!   visual demultiplexers
//! - **Media Core**: payload decryption, the playout scheduler and playback
//!   sessions
//! - **Infra Common**: logging setup and configuration loading
//!
//! ## Quick Start
//!
//! ```rust
//! use rplay::prelude::*;
//!
//! let config = SessionConfig::new(ContainerKind::Flv);
//! let session = PlaybackSession::new(config, std::sync::Arc::new(SystemClock::new()));
//! assert!(session.is_ok());
//! ```
//!
//! ## Module Structure
//!
//! - [`codec_core`]: frame types and codec configuration parsing
//! - [`demux_core`]: container demultiplexers
//! - [`media_core`]: decryption, scheduling and sessions
//! - [`infra_common`]: logging and configuration files

#![deny(missing_docs)]
#![warn(rust_2018_idioms)]

// Re-export all crates as modules
pub use rplay_codec_core as codec_core;
pub use rplay_demux_core as demux_core;
pub use rplay_infra_common as infra_common;
pub use rplay_media_core as media_core;

// Re-export commonly used items for convenience
pub mod prelude {
    //! Common imports for rplay applications

    pub use crate::codec_core::{AudioConfig, CodecId, EncodedFrame, MediaType, NalFormat, VideoCodec, VideoConfig};
    pub use crate::demux_core::{ContainerKind, DemuxEvent, Demuxer, DemuxerFactory, DemuxerOptions, FrameSink};
    pub use crate::media_core::{
        BufferMode, Clock, ConfigUpdate, CryptoConfig, CryptoMode, PlaybackSession, SessionConfig, SessionEvent,
        SessionHandle, SessionOutput, SystemClock,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
