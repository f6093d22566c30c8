//! MPEG audio (layers I-III) frame header parsing and reader

use bytes::{Buf, BytesMut};
use tracing::trace;

use super::{AudioFrame, AudioFrameReader, ParseStatus};
use crate::error::{BitstreamError, CodecError, Result};
use crate::types::{AudioCodec, AudioConfig};

/// MPEG audio frame header length
pub const MP3_HEADER_LEN: usize = 4;

const BITRATES_V1: [[u32; 14]; 3] = [
    [32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];

const BITRATES_V2: [[u32; 14]; 2] = [
    [32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

/// MPEG audio version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    /// MPEG-1
    V1,
    /// MPEG-2 LSF
    V2,
    /// Unofficial MPEG-2.5
    V25,
}

/// Parsed MPEG audio frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mp3Header {
    /// MPEG version
    pub version: MpegVersion,
    /// Layer 1, 2 or 3
    pub layer: u8,
    /// Bitrate in kbit/s
    pub bitrate: u32,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Padding slot present
    pub padding: bool,
    /// 1 for mono, 2 otherwise
    pub channels: u8,
    /// Total frame length in bytes, header included
    pub frame_length: usize,
    /// PCM samples per channel
    pub samples: u32,
}

impl Mp3Header {
    /// Whether the buffer starts with the 11-bit frame sync
    pub fn is_sync(data: &[u8]) -> bool {
        data.len() >= 2 && data[0] == 0xFF && data[1] & 0xE0 == 0xE0
    }

    /// Parse the 4-byte header at the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MP3_HEADER_LEN {
            return Err(BitstreamError::Truncated {
                needed: MP3_HEADER_LEN,
                available: data.len(),
            }
            .into());
        }
        if !Self::is_sync(data) {
            return Err(CodecError::invalid_syntax("mpeg audio sync", format!("{:02x}", data[1])));
        }
        let version = match (data[1] >> 3) & 0x03 {
            0 => MpegVersion::V25,
            2 => MpegVersion::V2,
            3 => MpegVersion::V1,
            _ => return Err(CodecError::invalid_syntax("mpeg audio version", "reserved")),
        };
        let layer = match (data[1] >> 1) & 0x03 {
            1 => 3,
            2 => 2,
            3 => 1,
            _ => return Err(CodecError::invalid_syntax("mpeg audio layer", "reserved")),
        };
        let bitrate_index = (data[2] >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return Err(CodecError::invalid_syntax(
                "mpeg audio bitrate_index",
                bitrate_index.to_string(),
            ));
        }
        let bitrate = match version {
            MpegVersion::V1 => BITRATES_V1[layer as usize - 1][bitrate_index - 1],
            _ if layer == 1 => BITRATES_V2[0][bitrate_index - 1],
            _ => BITRATES_V2[1][bitrate_index - 1],
        };
        let rate_index = ((data[2] >> 2) & 0x03) as usize;
        if rate_index == 3 {
            return Err(CodecError::invalid_syntax("mpeg audio sampling_frequency", "reserved"));
        }
        let sample_rate = match version {
            MpegVersion::V1 => [44100, 48000, 32000][rate_index],
            MpegVersion::V2 => [22050, 24000, 16000][rate_index],
            MpegVersion::V25 => [11025, 12000, 8000][rate_index],
        };
        let padding = data[2] & 0x02 != 0;
        let channels = if data[3] >> 6 == 3 { 1 } else { 2 };

        let samples = match (layer, version) {
            (1, _) => 384,
            (2, _) | (3, MpegVersion::V1) => 1152,
            _ => 576,
        };
        let frame_length = if layer == 1 {
            ((12 * bitrate * 1000 / sample_rate) as usize + padding as usize) * 4
        } else {
            let bytes_per_sample = samples / 8;
            (bytes_per_sample * bitrate * 1000 / sample_rate) as usize + padding as usize
        };

        Ok(Self {
            version,
            layer,
            bitrate,
            sample_rate,
            padding,
            channels,
            frame_length,
            samples,
        })
    }

    /// Stream configuration implied by the header
    pub fn audio_config(&self) -> AudioConfig {
        AudioConfig {
            codec: AudioCodec::Mp3,
            sample_rate: self.sample_rate,
            channels: self.channels,
            object_type: self.layer,
            config: bytes::Bytes::new(),
        }
    }
}

/// Incremental MPEG audio frame reader
#[derive(Debug, Default)]
pub struct Mp3Reader {
    buffer: BytesMut,
}

impl Mp3Reader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioFrameReader for Mp3Reader {
    fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn next_frame(&mut self) -> ParseStatus<AudioFrame> {
        loop {
            let search = 0..self.buffer.len().saturating_sub(1);
            let Some(pos) = search.into_iter().find(|&i| Mp3Header::is_sync(&self.buffer[i..])) else {
                let keep = usize::from(self.buffer.last() == Some(&0xFF));
                let drop = self.buffer.len() - keep;
                self.buffer.advance(drop);
                return ParseStatus::NeedMoreData;
            };
            if pos > 0 {
                trace!("MPEG audio resync skipped {} bytes", pos);
                self.buffer.advance(pos);
            }
            if self.buffer.len() < MP3_HEADER_LEN {
                return ParseStatus::NeedMoreData;
            }
            let header = match Mp3Header::parse(&self.buffer) {
                Ok(header) => header,
                Err(e) => {
                    trace!("Skipping false MPEG audio sync: {}", e);
                    self.buffer.advance(1);
                    continue;
                }
            };
            if self.buffer.len() < header.frame_length {
                return ParseStatus::NeedMoreData;
            }
            let payload = self.buffer.split_to(header.frame_length).freeze();
            return ParseStatus::Ready(AudioFrame {
                payload,
                config: header.audio_config(),
                samples: header.samples,
            });
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }

    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
