//! LOAS/LATM AAC framing
//!
//! Handles AudioSyncStream elements carrying an AudioMuxElement with in-band
//! StreamMuxConfig. Only `audioMuxVersion == 0`, a single program/layer, one
//! subframe and `frameLengthType == 0` are accepted, which covers the streams
//! broadcast encoders produce.

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use super::aac_config::AudioSpecificConfig;
use super::{AudioFrame, AudioFrameReader, ParseStatus};
use crate::bitstream::BitReader;
use crate::error::{CodecError, Result};
use crate::types::AudioConfig;

/// 11-bit AudioSyncStream syncword
const LOAS_SYNC: u16 = 0x2B7;

/// Sync plus 13-bit length
const LOAS_HEADER_LEN: usize = 3;

/// Stream configuration extracted from StreamMuxConfig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMuxConfig {
    /// The embedded AudioSpecificConfig
    pub audio_specific_config: AudioSpecificConfig,
    /// Whether a CRC byte follows the config
    pub crc_present: bool,
}

impl StreamMuxConfig {
    fn read(r: &mut BitReader<'_>) -> Result<Self> {
        if r.read_flag()? {
            return Err(CodecError::unsupported_codec("LATM audioMuxVersion 1"));
        }
        r.skip_bits(1)?; // allStreamsSameTimeFraming
        let num_sub_frames = r.read_bits(6)?;
        let num_program = r.read_bits(4)?;
        let num_layer = r.read_bits(3)?;
        if num_sub_frames != 0 || num_program != 0 || num_layer != 0 {
            return Err(CodecError::unsupported_codec(format!(
                "LATM with {} subframes, {} programs, {} layers",
                num_sub_frames + 1,
                num_program + 1,
                num_layer + 1
            )));
        }
        let audio_specific_config = AudioSpecificConfig::read(r)?;
        let frame_length_type = r.read_bits(3)?;
        if frame_length_type != 0 {
            return Err(CodecError::unsupported_codec(format!(
                "LATM frameLengthType {frame_length_type}"
            )));
        }
        r.skip_bits(8)?; // latmBufferFullness
        if r.read_flag()? {
            // otherDataLenBits, escaped in bytes
            loop {
                let escape = r.read_flag()?;
                r.skip_bits(8)?;
                if !escape {
                    break;
                }
            }
        }
        let crc_present = r.read_flag()?;
        if crc_present {
            r.skip_bits(8)?;
        }
        Ok(Self {
            audio_specific_config,
            crc_present,
        })
    }

    fn audio_config(&self) -> AudioConfig {
        self.audio_specific_config.audio_config()
    }
}

/// Incremental LOAS reader
#[derive(Debug, Default)]
pub struct LoasReader {
    buffer: BytesMut,
    config: Option<StreamMuxConfig>,
}

impl LoasReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent StreamMuxConfig
    pub fn config(&self) -> Option<&StreamMuxConfig> {
        self.config.as_ref()
    }

    fn is_sync(data: &[u8]) -> bool {
        data.len() >= 2 && ((data[0] as u16) << 3 | (data[1] as u16) >> 5) == LOAS_SYNC
    }

    /// Decode one AudioMuxElement; `Ok(None)` when it cannot be used yet
    fn read_element(&mut self, element: &[u8]) -> Result<Option<(Bytes, u32)>> {
        let mut r = BitReader::new(element);
        let use_same_stream_mux = r.read_flag()?;
        if !use_same_stream_mux {
            self.config = Some(StreamMuxConfig::read(&mut r)?);
        }
        let Some(config) = &self.config else {
            return Ok(None);
        };
        let samples = config.audio_specific_config.frame_samples();

        let mut length = 0usize;
        loop {
            let chunk = r.read_u8()?;
            length += chunk as usize;
            if chunk != 0xFF {
                break;
            }
        }
        if length * 8 > r.bits_left() {
            return Err(CodecError::invalid_syntax(
                "latm PayloadLengthInfo",
                format!("{} bytes, {} bits left", length, r.bits_left()),
            ));
        }
        let mut payload = Vec::with_capacity(length);
        for _ in 0..length {
            payload.push(r.read_u8()?);
        }
        Ok(Some((Bytes::from(payload), samples)))
    }
}

impl AudioFrameReader for LoasReader {
    fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn next_frame(&mut self) -> ParseStatus<AudioFrame> {
        loop {
            let search = 0..self.buffer.len().saturating_sub(1);
            let Some(pos) = search.into_iter().find(|&i| Self::is_sync(&self.buffer[i..])) else {
                let keep = usize::from(self.buffer.last() == Some(&0x56));
                let drop = self.buffer.len() - keep;
                self.buffer.advance(drop);
                return ParseStatus::NeedMoreData;
            };
            if pos > 0 {
                trace!("LOAS resync skipped {} bytes", pos);
                self.buffer.advance(pos);
            }
            if self.buffer.len() < LOAS_HEADER_LEN {
                return ParseStatus::NeedMoreData;
            }
            let length = ((self.buffer[1] as usize & 0x1F) << 8) | self.buffer[2] as usize;
            if self.buffer.len() < LOAS_HEADER_LEN + length {
                return ParseStatus::NeedMoreData;
            }
            let element = self.buffer.split_to(LOAS_HEADER_LEN + length).freeze();
            match self.read_element(&element[LOAS_HEADER_LEN..]) {
                Ok(Some((payload, samples))) => {
                    if let Some(config) = &self.config {
                        return ParseStatus::Ready(AudioFrame {
                            payload,
                            config: config.audio_config(),
                            samples,
                        });
                    }
                }
                Ok(None) => trace!("LOAS element before any StreamMuxConfig"),
                Err(e) => trace!("Skipping LOAS element: {}", e),
            }
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.config = None;
    }

    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
pub(crate) fn loas_element(
    with_config: bool,
    sampling_index: u8,
    channels: u8,
    payload: &[u8],
) -> Vec<u8> {
    use crate::bitstream::BitWriter;

    let mut w = BitWriter::new();
    w.write_flag(!with_config);
    if with_config {
        w.write_flag(false); // audioMuxVersion
        w.write_flag(true);
        w.write_bits(6, 0);
        w.write_bits(4, 0);
        w.write_bits(3, 0);
        w.write_bits(5, 2);
        w.write_bits(4, sampling_index as u32);
        w.write_bits(4, channels as u32);
        w.write_bits(3, 0); // GASpecificConfig
        w.write_bits(3, 0); // frameLengthType
        w.write_bits(8, 0xFF);
        w.write_flag(false);
        w.write_flag(false);
    }
    let mut remaining = payload.len();
    while remaining >= 255 {
        w.write_bits(8, 255);
        remaining -= 255;
    }
    w.write_bits(8, remaining as u32);
    for &byte in payload {
        w.write_bits(8, byte as u32);
    }
    let body = w.into_bytes();
    let mut out = vec![0x56, 0xE0 | (body.len() >> 8) as u8, body.len() as u8];
    out.extend(body);
    out
}
