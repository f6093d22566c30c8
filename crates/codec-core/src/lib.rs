//! # Codec-Core: Bitstream and Codec Parameter Library
//!
//! This library provides the codec-level building blocks shared by the rplay
//! demultiplexers and the playout pipeline. It never decodes media; it reads
//! just enough of each bitstream to describe it and to frame it correctly.
//!
//! ## Features
//!
//! - **Bitstream readers**: Exp-Golomb bit reader with a 32-bit cache, checked
//!   big-endian byte reader, and a bit writer for configuration blobs
//! - **H.264 / H.265**: SPS/VPS/PPS parsing, NAL framing conversion between
//!   Annex-B and length prefixes, picture boundary detection
//! - **AAC**: ADTS and LOAS/LATM framing, AudioSpecificConfig parse/build
//! - **MPEG audio**: layer I-III frame headers
//! - **MPEG-4 visual**: VOL header and VOP coding types
//! - **Configuration records**: AVCDecoderConfigurationRecord and
//!   HEVCDecoderConfigurationRecord readers and builders
//!
//! ## Usage
//!
//! ```rust
//! use rplay_codec_core::audio::{AudioFrameReader, Mp3Reader, ParseStatus};
//!
//! let mut frame = vec![0xFF, 0xFB, 0x90, 0x64];
//! frame.resize(417, 0);
//!
//! let mut reader = Mp3Reader::new();
//! reader.push(&frame[..200]);
//! assert_eq!(reader.next_frame(), ParseStatus::NeedMoreData);
//!
//! reader.push(&frame[200..]);
//! let parsed = reader.next_frame().ready().unwrap();
//! assert_eq!(parsed.config.sample_rate, 44100);
//! assert_eq!(parsed.payload.len(), 417);
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod audio;
pub mod bitstream;
pub mod error;
pub mod h26x;
pub mod mpeg4;
pub mod record;
pub mod types;

// Re-export commonly used types
pub use bitstream::{BitReader, BitWriter, ByteReader};
pub use error::{BitstreamError, CodecError, Result};
pub use h26x::{NalFormat, NalKind};
pub use types::{
    AudioCodec, AudioConfig, CodecId, EncodedFrame, MediaType, ParameterSets, VideoCodec,
    VideoConfig,
};

/// Version information for the codec library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
