//! # Demux-Core: Incremental Container Demultiplexers
//!
//! This library turns a byte stream of arbitrary chunking into timestamped
//! access units plus configuration events. Every demuxer keeps a bounded
//! carry-over buffer, so feeding the same bytes split at any points yields
//! the same output.
//!
//! ## Supported containers
//!
//! - **FLV**: legacy and enhanced-RTMP video headers, AAC/MP3/G.711 audio,
//!   `onMetaData`
//! - **MPEG-TS**: 188/192/204-byte packets, PAT/PMT, PES reassembly with
//!   33-bit timestamp unwrapping
//! - **Fragmented MP4**: `moov`/`moof`/`mdat` with optional XOR descrambling
//! - **Naked flow**: raw Annex-B H.264/H.265 with synthetic timing
//! - **MPEG-4 visual**: Part 2 elementary streams with synthetic timing
//!
//! Video payloads always leave the demuxer as 4-byte length-prefixed NAL
//! units (or whole VOPs for MPEG-4 visual), with timestamps in milliseconds.
//!
//! ## Usage
//!
//! ```rust
//! use rplay_demux_core::{CollectingSink, ContainerKind, DemuxerFactory, DemuxerOptions};
//!
//! let mut demuxer = DemuxerFactory::create(ContainerKind::Flv, &DemuxerOptions::default()).unwrap();
//! let mut sink = CollectingSink::new();
//! demuxer.feed(b"FLV\x01\x05\x00\x00\x00\x09", &mut sink).unwrap();
//! assert_eq!(sink.events.len(), 1);
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod factory;
pub mod flv;
pub mod fmp4;
pub mod mpeg4;
pub mod naked;
mod pending;
pub mod traits;
pub mod ts;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export commonly used types
pub use error::{DemuxError, Result};
pub use factory::{ContainerKind, DemuxerFactory, DemuxerOptions};
pub use flv::FlvDemuxer;
pub use fmp4::{Descrambler, Fmp4Demuxer, XorDescrambler};
pub use mpeg4::Mpeg4Demuxer;
pub use naked::NakedFlowDemuxer;
pub use pending::MAX_PENDING_BYTES;
pub use traits::{CollectingSink, DemuxEvent, Demuxer, FrameSink, StreamMetadata, TrackInfo};
pub use ts::TsDemuxer;

/// Version information for the demux library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
