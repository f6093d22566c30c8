//! Audio elementary stream framing
//!
//! Transport streams deliver AAC (ADTS or LOAS/LATM) and MPEG audio as a byte
//! stream whose frame boundaries do not line up with PES boundaries. The
//! readers here accumulate bytes and hand out one complete frame at a time,
//! keeping incomplete trailing data for the next push.

pub mod aac_config;
pub mod adts;
pub mod loas;
pub mod mp3;

pub use aac_config::AudioSpecificConfig;
pub use adts::{AdtsHeader, AdtsReader};
pub use loas::LoasReader;
pub use mp3::{Mp3Header, Mp3Reader};

use bytes::Bytes;

use crate::types::AudioConfig;

/// Outcome of asking a reader for its next frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus<T> {
    /// A complete frame was produced
    Ready(T),
    /// The buffered bytes do not hold a complete frame yet
    NeedMoreData,
}

impl<T> ParseStatus<T> {
    /// Convert into an `Option`, dropping the distinction
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::NeedMoreData => None,
        }
    }
}

/// One de-framed audio access unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Raw codec payload, framing header removed for AAC
    pub payload: Bytes,
    /// Configuration announced by this frame's header
    pub config: AudioConfig,
    /// PCM samples per channel the frame decodes to
    pub samples: u32,
}

impl AudioFrame {
    /// Frame duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        if self.config.sample_rate == 0 {
            return 0.0;
        }
        self.samples as f64 * 1000.0 / self.config.sample_rate as f64
    }
}

/// Incremental reader over a framed audio byte stream
pub trait AudioFrameReader: Send {
    /// Append bytes to the internal buffer
    fn push(&mut self, data: &[u8]);

    /// Produce the next complete frame, resynchronizing over garbage
    fn next_frame(&mut self) -> ParseStatus<AudioFrame>;

    /// Drop all buffered bytes
    fn clear(&mut self);

    /// Number of buffered bytes
    fn buffered(&self) -> usize;
}
