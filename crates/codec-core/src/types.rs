//! Core types shared by the demultiplexers and the playout scheduler
//!
//! [`EncodedFrame`] is the canonical unit every container parser produces.
//! [`VideoConfig`] and [`AudioConfig`] carry the stream geometry and are always
//! replaced wholesale when the stream reconfigures.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// Video elementary stream
    Video,
    /// Audio elementary stream
    Audio,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Video codec identifiers (flash-container numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum VideoCodec {
    /// H.264 / AVC
    H264 = 7,
    /// H.265 / HEVC
    H265 = 12,
    /// MPEG-4 Part 2 visual
    Mpeg4 = 99,
}

impl VideoCodec {
    /// Numeric codec id
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Map a numeric id back to a codec
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            7 => Some(Self::H264),
            12 => Some(Self::H265),
            99 => Some(Self::Mpeg4),
            _ => None,
        }
    }

    /// Codec name
    pub fn name(self) -> &'static str {
        match self {
            Self::H264 => "H264",
            Self::H265 => "H265",
            Self::Mpeg4 => "MPEG4",
        }
    }
}

/// Audio codec identifiers (flash-container numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AudioCodec {
    /// MPEG-1/2 layer III
    Mp3 = 2,
    /// G.711 A-law
    Alaw = 7,
    /// G.711 µ-law
    Mulaw = 8,
    /// AAC
    Aac = 10,
}

impl AudioCodec {
    /// Numeric codec id
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Map a numeric id back to a codec
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            2 => Some(Self::Mp3),
            7 => Some(Self::Alaw),
            8 => Some(Self::Mulaw),
            10 => Some(Self::Aac),
            _ => None,
        }
    }

    /// Codec name
    pub fn name(self) -> &'static str {
        match self {
            Self::Mp3 => "MP3",
            Self::Alaw => "PCMA",
            Self::Mulaw => "PCMU",
            Self::Aac => "AAC",
        }
    }
}

/// Codec id tagged with its numbering space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// Video codec
    Video(VideoCodec),
    /// Audio codec
    Audio(AudioCodec),
}

impl CodecId {
    /// Numeric id within the codec's own numbering space
    pub fn id(self) -> u8 {
        match self {
            Self::Video(codec) => codec.id(),
            Self::Audio(codec) => codec.id(),
        }
    }

    /// Media type of the codec
    pub fn media_type(self) -> MediaType {
        match self {
            Self::Video(_) => MediaType::Video,
            Self::Audio(_) => MediaType::Audio,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video(codec) => write!(f, "{}", codec.name()),
            Self::Audio(codec) => write!(f, "{}", codec.name()),
        }
    }
}

/// A complete, codec-ready access unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Codec of the payload (implies the media type)
    pub codec: CodecId,
    /// Codec bitstream
    pub payload: Bytes,
    /// Decode timestamp in milliseconds
    pub dts: u64,
    /// Presentation timestamp in milliseconds
    pub pts: u64,
    /// Whether decoding can start at this frame
    pub is_keyframe: bool,
}

impl EncodedFrame {
    /// Create a video frame
    pub fn video(codec: VideoCodec, payload: Bytes, dts: u64, pts: u64, is_keyframe: bool) -> Self {
        Self {
            codec: CodecId::Video(codec),
            payload,
            dts,
            pts,
            is_keyframe,
        }
    }

    /// Create an audio frame; audio frames are always independently decodable
    pub fn audio(codec: AudioCodec, payload: Bytes, dts: u64) -> Self {
        Self {
            codec: CodecId::Audio(codec),
            payload,
            dts,
            pts: dts,
            is_keyframe: true,
        }
    }

    /// Media type of the frame
    pub fn media_type(&self) -> MediaType {
        self.codec.media_type()
    }

    /// Whether this is a video frame
    pub fn is_video(&self) -> bool {
        self.media_type() == MediaType::Video
    }

    /// pts - dts (zero for audio)
    pub fn composition_offset(&self) -> i64 {
        self.pts as i64 - self.dts as i64
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }
}

/// Raw parameter sets, without start codes or length prefixes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSets {
    /// Video parameter sets (H.265 only)
    pub vps: Vec<Bytes>,
    /// Sequence parameter sets
    pub sps: Vec<Bytes>,
    /// Picture parameter sets
    pub pps: Vec<Bytes>,
}

impl ParameterSets {
    /// Whether the set is complete enough to configure a decoder
    pub fn is_complete(&self, codec: VideoCodec) -> bool {
        match codec {
            VideoCodec::H264 => !self.sps.is_empty() && !self.pps.is_empty(),
            VideoCodec::H265 => !self.vps.is_empty() && !self.sps.is_empty() && !self.pps.is_empty(),
            VideoCodec::Mpeg4 => true,
        }
    }

    /// Forget all parameter sets
    pub fn clear(&mut self) {
        self.vps.clear();
        self.sps.clear();
        self.pps.clear();
    }
}

/// Video stream configuration
#[derive(Debug, Clone, PartialEq)]
pub struct VideoConfig {
    /// Codec
    pub codec: VideoCodec,
    /// Display width in pixels (after cropping)
    pub width: u32,
    /// Display height in pixels (after cropping)
    pub height: u32,
    /// Profile indication
    pub profile: u8,
    /// Level indication
    pub level: u8,
    /// Chroma format (1 = 4:2:0)
    pub chroma_format: u8,
    /// Luma bit depth
    pub bit_depth: u8,
    /// Frame rate hint from the bitstream timing info
    pub frame_rate: Option<f64>,
    /// Parameter sets the record was built from
    pub parameter_sets: ParameterSets,
    /// Decoder configuration record (AVCC / HVCC bytes, or VOL header for MPEG-4)
    pub record: Bytes,
}

impl VideoConfig {
    /// Short human readable codec string, e.g. `H264 1280x720`
    pub fn describe(&self) -> String {
        format!("{} {}x{}", self.codec.name(), self.width, self.height)
    }
}

/// Audio stream configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    /// Codec
    pub codec: AudioCodec,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u8,
    /// Audio object type (AAC) or layer (MP3); zero for G.711
    pub object_type: u8,
    /// Raw codec configuration (AudioSpecificConfig for AAC)
    pub config: Bytes,
}

impl AudioConfig {
    /// Configuration for a G.711 stream, which has no in-band setup
    pub fn g711(codec: AudioCodec, channels: u8) -> Self {
        Self {
            codec,
            sample_rate: 8000,
            channels,
            object_type: 0,
            config: Bytes::new(),
        }
    }
}
