//! ADTS header parsing and frame reader

use bytes::{Buf, BytesMut};
use tracing::trace;

use super::aac_config::{sample_rate_from_index, AudioSpecificConfig};
use super::{AudioFrame, AudioFrameReader, ParseStatus};
use crate::bitstream::BitReader;
use crate::error::{BitstreamError, CodecError, Result};
use crate::types::{AudioCodec, AudioConfig};

/// Fixed ADTS header length without CRC
pub const ADTS_HEADER_LEN: usize = 7;

/// Parsed ADTS fixed and variable header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// MPEG-2 (true) or MPEG-4 (false) identifier
    pub mpeg2: bool,
    /// No CRC follows the header
    pub protection_absent: bool,
    /// Audio object type (profile + 1)
    pub object_type: u8,
    /// samplingFrequencyIndex
    pub sampling_index: u8,
    /// Sampling frequency in Hz
    pub sample_rate: u32,
    /// channelConfiguration
    pub channel_config: u8,
    /// Frame length including the header
    pub frame_length: usize,
    /// number_of_raw_data_blocks_in_frame
    pub raw_data_blocks: u8,
}

impl AdtsHeader {
    /// Whether the buffer starts with the 12-bit ADTS syncword (layer 0)
    pub fn is_sync(data: &[u8]) -> bool {
        data.len() >= 2 && data[0] == 0xFF && data[1] & 0xF6 == 0xF0
    }

    /// Parse the first 7 bytes of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ADTS_HEADER_LEN {
            return Err(BitstreamError::Truncated {
                needed: ADTS_HEADER_LEN,
                available: data.len(),
            }
            .into());
        }
        if !Self::is_sync(data) {
            return Err(CodecError::invalid_syntax(
                "adts syncword",
                format!("{:02x}{:02x}", data[0], data[1]),
            ));
        }
        let mut r = BitReader::new(&data[..ADTS_HEADER_LEN]);
        r.skip_bits(12)?;
        let mpeg2 = r.read_flag()?;
        r.skip_bits(2)?; // layer
        let protection_absent = r.read_flag()?;
        let object_type = r.read_bits(2)? as u8 + 1;
        let sampling_index = r.read_bits(4)? as u8;
        let sample_rate = sample_rate_from_index(sampling_index).ok_or_else(|| {
            CodecError::invalid_syntax("adts sampling_frequency_index", sampling_index.to_string())
        })?;
        r.skip_bits(1)?; // private_bit
        let channel_config = r.read_bits(3)? as u8;
        r.skip_bits(4)?; // originality, home, copyright bits
        let frame_length = r.read_bits(13)? as usize;
        r.skip_bits(11)?; // buffer fullness
        let raw_data_blocks = r.read_bits(2)? as u8;

        let header = Self {
            mpeg2,
            protection_absent,
            object_type,
            sampling_index,
            sample_rate,
            channel_config,
            frame_length,
            raw_data_blocks,
        };
        if frame_length < header.header_len() {
            return Err(CodecError::invalid_syntax("adts frame_length", frame_length.to_string()));
        }
        Ok(header)
    }

    /// Header length, CRC included
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_LEN
        } else {
            ADTS_HEADER_LEN + 2
        }
    }

    /// Samples per channel carried by the frame
    pub fn samples(&self) -> u32 {
        1024 * (self.raw_data_blocks as u32 + 1)
    }

    /// The AudioSpecificConfig this header implies
    pub fn audio_specific_config(&self) -> AudioSpecificConfig {
        AudioSpecificConfig::new(self.object_type, self.sample_rate, self.channel_config)
    }

    /// Stream configuration carried by the header
    pub fn audio_config(&self) -> AudioConfig {
        let asc = self.audio_specific_config();
        AudioConfig {
            codec: AudioCodec::Aac,
            sample_rate: self.sample_rate,
            channels: asc.channels(),
            object_type: self.object_type,
            config: asc.to_bytes(),
        }
    }
}

/// Incremental ADTS frame reader
#[derive(Debug, Default)]
pub struct AdtsReader {
    buffer: BytesMut,
    skipped: u64,
}

impl AdtsReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes discarded while hunting for a syncword
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    fn discard(&mut self, n: usize) {
        self.buffer.advance(n);
        self.skipped += n as u64;
    }
}

impl AudioFrameReader for AdtsReader {
    fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn next_frame(&mut self) -> ParseStatus<AudioFrame> {
        loop {
            let search = 0..self.buffer.len().saturating_sub(1);
            let Some(pos) = search.into_iter().find(|&i| AdtsHeader::is_sync(&self.buffer[i..])) else {
                // Keep a trailing 0xFF, it may start the next syncword
                let keep = usize::from(self.buffer.last() == Some(&0xFF));
                let drop = self.buffer.len() - keep;
                self.discard(drop);
                return ParseStatus::NeedMoreData;
            };
            if pos > 0 {
                trace!("ADTS resync skipped {} bytes", pos);
                self.discard(pos);
            }
            if self.buffer.len() < ADTS_HEADER_LEN {
                return ParseStatus::NeedMoreData;
            }
            let header = match AdtsHeader::parse(&self.buffer) {
                Ok(header) => header,
                Err(e) => {
                    trace!("Skipping false ADTS sync: {}", e);
                    self.discard(1);
                    continue;
                }
            };
            if self.buffer.len() < header.frame_length {
                return ParseStatus::NeedMoreData;
            }
            let mut frame = self.buffer.split_to(header.frame_length).freeze();
            frame.advance(header.header_len());
            return ParseStatus::Ready(AudioFrame {
                payload: frame,
                config: header.audio_config(),
                samples: header.samples(),
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

#[cfg(test)]
pub(crate) fn adts_frame(sampling_index: u8, channels: u8, payload: &[u8]) -> Vec<u8> {
    let frame_length = payload.len() + ADTS_HEADER_LEN;
    let mut w = crate::bitstream::BitWriter::new();
    w.write_bits(12, 0xFFF);
    w.write_bits(1, 0); // MPEG-4
    w.write_bits(2, 0);
    w.write_bits(1, 1); // no CRC
    w.write_bits(2, 1); // AAC LC
    w.write_bits(4, sampling_index as u32);
    w.write_bits(1, 0);
    w.write_bits(3, channels as u32);
    w.write_bits(4, 0);
    w.write_bits(13, frame_length as u32);
    w.write_bits(11, 0x7FF);
    w.write_bits(2, 0);
    let mut out = w.into_bytes();
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_header() {
        // 44.1 kHz stereo LC, 371 byte frame
        let header = AdtsHeader::parse(&[0xFF, 0xF1, 0x50, 0x80, 0x2E, 0x7F, 0xFC]).unwrap();
        assert!(!header.mpeg2);
        assert!(header.protection_absent);
        assert_eq!(header.object_type, 2);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.channel_config, 2);
        assert_eq!(header.frame_length, 371);
        assert_eq!(header.samples(), 1024);
        assert_eq!(&header.audio_config().config[..], &[0x12, 0x10]);
    }

    #[test]
    fn test_rejects_bad_sampling_index() {
        let mut bytes = adts_frame(4, 2, &[0; 4]);
        bytes[2] = (bytes[2] & !0x3C) | (13 << 2);
        assert!(AdtsHeader::parse(&bytes).is_err());
    }

    #[test]
    fn test_reader_carries_partial_frames() {
        let first = adts_frame(3, 1, &[1, 2, 3, 4, 5]);
        let second = adts_frame(3, 1, &[6, 7]);
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        let mut reader = AdtsReader::new();
        reader.push(&stream[..first.len() + 3]);
        let frame = reader.next_frame().ready().unwrap();
        assert_eq!(&frame.payload[..], &[1, 2, 3, 4, 5]);
        assert_eq!(frame.config.sample_rate, 48000);
        assert_eq!(frame.config.channels, 1);
        assert_eq!(reader.next_frame(), ParseStatus::NeedMoreData);
        assert_eq!(reader.buffered(), 3);

        reader.push(&stream[first.len() + 3..]);
        let frame = reader.next_frame().ready().unwrap();
        assert_eq!(&frame.payload[..], &[6, 7]);
        assert!((frame.duration_ms() - 21.333).abs() < 0.01);
    }

    #[test]
    fn test_reader_resyncs_over_garbage() {
        let mut stream = vec![0x00, 0x12, 0xFF, 0x00];
        stream.extend(adts_frame(4, 2, &[9, 9]));
        let mut reader = AdtsReader::new();
        reader.push(&stream);
        let frame = reader.next_frame().ready().unwrap();
        assert_eq!(&frame.payload[..], &[9, 9]);
        assert_eq!(reader.skipped_bytes(), 4);
    }
}
