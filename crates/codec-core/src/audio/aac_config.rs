//! AAC AudioSpecificConfig parsing and building

use bytes::Bytes;

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{CodecError, Result};
use crate::types::{AudioCodec, AudioConfig};

/// Sampling frequencies addressed by `samplingFrequencyIndex`
pub const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Index value announcing an explicit 24-bit frequency
const EXPLICIT_FREQUENCY: u8 = 0x0F;

/// Object types that escape into a 6-bit extension
const ESCAPE_OBJECT_TYPE: u8 = 31;

/// Map a sampling frequency index to Hz
pub fn sample_rate_from_index(index: u8) -> Option<u32> {
    SAMPLE_RATES.get(index as usize).copied()
}

/// Map a frequency in Hz back to its table index
pub fn index_from_sample_rate(rate: u32) -> Option<u8> {
    SAMPLE_RATES.iter().position(|&r| r == rate).map(|i| i as u8)
}

/// Decoded AudioSpecificConfig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio object type (2 = AAC LC)
    pub object_type: u8,
    /// Core sampling frequency in Hz
    pub sample_rate: u32,
    /// channelConfiguration
    pub channel_config: u8,
    /// SBR output frequency when signalled explicitly (HE-AAC)
    pub extension_sample_rate: Option<u32>,
    /// 960-sample frames instead of 1024
    pub frame_length_flag: bool,
}

impl AudioSpecificConfig {
    /// AAC LC configuration for the given rate and channel count
    pub fn new(object_type: u8, sample_rate: u32, channel_config: u8) -> Self {
        Self {
            object_type,
            sample_rate,
            channel_config,
            extension_sample_rate: None,
            frame_length_flag: false,
        }
    }

    /// Parse a standalone AudioSpecificConfig blob
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = BitReader::new(data);
        Self::read(&mut r)
    }

    /// Read an AudioSpecificConfig from the middle of a bitstream (LATM StreamMuxConfig)
    pub fn read(r: &mut BitReader<'_>) -> Result<Self> {
        let mut object_type = read_object_type(r)?;
        let sample_rate = read_frequency(r)?;
        let channel_config = r.read_bits(4)? as u8;
        let mut extension_sample_rate = None;
        if object_type == 5 || object_type == 29 {
            // Explicit SBR/PS signalling: the core object type follows
            extension_sample_rate = Some(read_frequency(r)?);
            object_type = read_object_type(r)?;
        }

        let frame_length_flag = match object_type {
            1 | 2 | 3 | 4 | 6 | 7 | 17 | 19 | 20 | 21 | 22 | 23 => {
                read_ga_specific_config(r, object_type, channel_config)?
            }
            other => {
                return Err(CodecError::unsupported_codec(format!("AAC object type {other}")));
            }
        };

        Ok(Self {
            object_type,
            sample_rate,
            channel_config,
            extension_sample_rate,
            frame_length_flag,
        })
    }

    /// Channel count implied by channelConfiguration
    pub fn channels(&self) -> u8 {
        match self.channel_config {
            7 => 8,
            c => c,
        }
    }

    /// Samples per channel in one access unit
    pub fn frame_samples(&self) -> u32 {
        if self.frame_length_flag {
            960
        } else {
            1024
        }
    }

    /// Stream configuration for this AudioSpecificConfig; SBR output rate wins
    pub fn audio_config(&self) -> AudioConfig {
        AudioConfig {
            codec: AudioCodec::Aac,
            sample_rate: self.extension_sample_rate.unwrap_or(self.sample_rate),
            channels: self.channels(),
            object_type: self.object_type,
            config: self.to_bytes(),
        }
    }

    /// Serialize to the two (or more) byte blob a decoder expects
    pub fn to_bytes(&self) -> Bytes {
        let mut w = BitWriter::new();
        if self.object_type >= ESCAPE_OBJECT_TYPE {
            w.write_bits(5, ESCAPE_OBJECT_TYPE as u32);
            w.write_bits(6, (self.object_type - 32) as u32);
        } else {
            w.write_bits(5, self.object_type as u32);
        }
        match index_from_sample_rate(self.sample_rate) {
            Some(index) => w.write_bits(4, index as u32),
            None => {
                w.write_bits(4, EXPLICIT_FREQUENCY as u32);
                w.write_bits(24, self.sample_rate);
            }
        }
        w.write_bits(4, self.channel_config as u32);
        w.write_flag(self.frame_length_flag);
        w.write_flag(false); // dependsOnCoreCoder
        w.write_flag(false); // extensionFlag
        Bytes::from(w.into_bytes())
    }
}

fn read_object_type(r: &mut BitReader<'_>) -> Result<u8> {
    let object_type = r.read_bits(5)? as u8;
    if object_type == ESCAPE_OBJECT_TYPE {
        return Ok(32 + r.read_bits(6)? as u8);
    }
    Ok(object_type)
}

fn read_frequency(r: &mut BitReader<'_>) -> Result<u32> {
    let index = r.read_bits(4)? as u8;
    if index == EXPLICIT_FREQUENCY {
        return Ok(r.read_bits(24)?);
    }
    sample_rate_from_index(index)
        .ok_or_else(|| CodecError::invalid_syntax("samplingFrequencyIndex", index.to_string()))
}

/// Returns frameLengthFlag
fn read_ga_specific_config(r: &mut BitReader<'_>, object_type: u8, channel_config: u8) -> Result<bool> {
    let frame_length_flag = r.read_flag()?;
    if r.read_flag()? {
        r.skip_bits(14)?; // coreCoderDelay
    }
    let extension_flag = r.read_flag()?;
    if channel_config == 0 {
        return Err(CodecError::unsupported_codec("AAC program_config_element"));
    }
    if object_type == 6 || object_type == 20 {
        r.skip_bits(3)?; // layerNr
    }
    if extension_flag {
        if object_type == 22 {
            r.skip_bits(16)?; // numOfSubFrame, layer_length
        }
        if matches!(object_type, 17 | 19 | 20 | 23) {
            r.skip_bits(3)?; // resilience flags
        }
        r.skip_bits(1)?; // extensionFlag3
    }
    Ok(frame_length_flag)
}
