//! MPEG-4 Part 2 visual start codes and VOL header parsing

use bytes::Bytes;

use crate::bitstream::BitReader;
use crate::error::{CodecError, Result};
use crate::types::{ParameterSets, VideoCodec, VideoConfig};

/// visual_object_sequence_start_code suffix
pub const VOS_START: u8 = 0xB0;
/// group_of_vop_start_code suffix
pub const GOV_START: u8 = 0xB3;
/// vop_start_code suffix
pub const VOP_START: u8 = 0xB6;

/// Whether a start code suffix opens a video object layer
pub fn is_vol_start(code: u8) -> bool {
    (0x20..=0x2F).contains(&code)
}

/// VOP coding type from the two bits after the VOP start code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VopType {
    /// Intra coded
    I,
    /// Predicted
    P,
    /// Bidirectionally predicted
    B,
    /// Sprite
    S,
}

impl VopType {
    /// Decode from the byte that follows `00 00 01 B6`
    pub fn from_byte(byte: u8) -> Self {
        match byte >> 6 {
            0 => Self::I,
            1 => Self::P,
            2 => Self::B,
            _ => Self::S,
        }
    }
}

/// Fields of a video object layer header
#[derive(Debug, Clone, PartialEq)]
pub struct VolHeader {
    /// video_object_type_indication
    pub object_type: u8,
    /// Pixel aspect ratio
    pub pixel_aspect_ratio: Option<(u8, u8)>,
    /// chroma_format (1 = 4:2:0) when signalled
    pub chroma_format: u8,
    /// vop_time_increment_resolution
    pub time_increment_resolution: u16,
    /// Frame rate when the VOP rate is fixed
    pub frame_rate: Option<f64>,
    /// Width in pixels (rectangular shape only)
    pub width: u32,
    /// Height in pixels (rectangular shape only)
    pub height: u32,
}

const SHAPE_RECTANGULAR: u32 = 0;
const SHAPE_GRAYSCALE: u32 = 3;

impl VolHeader {
    /// Parse the VOL header body that follows `00 00 01 2x`
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = BitReader::new(data);
        r.skip_bits(1)?; // random_accessible_vol
        let object_type = r.read_u8()?;
        let mut verid = 1;
        if r.read_flag()? {
            verid = r.read_bits(4)?;
            r.skip_bits(3)?; // video_object_layer_priority
        }
        let pixel_aspect_ratio = match r.read_bits(4)? {
            15 => Some((r.read_u8()?, r.read_u8()?)),
            1 => Some((1, 1)),
            2 => Some((12, 11)),
            3 => Some((10, 11)),
            4 => Some((16, 11)),
            5 => Some((40, 33)),
            _ => None,
        };
        let mut chroma_format = 1;
        if r.read_flag()? {
            chroma_format = r.read_bits(2)? as u8;
            r.skip_bits(1)?; // low_delay
            if r.read_flag()? {
                r.skip_bits(79)?; // vbv_parameters
            }
        }
        let shape = r.read_bits(2)?;
        if shape == SHAPE_GRAYSCALE && verid != 1 {
            r.skip_bits(4)?;
        }
        marker(&mut r)?;
        let time_increment_resolution = r.read_bits(16)? as u16;
        if time_increment_resolution == 0 {
            return Err(CodecError::invalid_syntax("vop_time_increment_resolution", "0"));
        }
        marker(&mut r)?;
        let mut frame_rate = None;
        if r.read_flag()? {
            let bits = (16 - (time_increment_resolution - 1).leading_zeros()).max(1);
            let increment = r.read_bits(bits)?;
            if increment > 0 {
                frame_rate = Some(time_increment_resolution as f64 / increment as f64);
            }
        }
        let (mut width, mut height) = (0, 0);
        if shape == SHAPE_RECTANGULAR {
            marker(&mut r)?;
            width = r.read_bits(13)?;
            marker(&mut r)?;
            height = r.read_bits(13)?;
            marker(&mut r)?;
        }
        Ok(Self {
            object_type,
            pixel_aspect_ratio,
            chroma_format,
            time_increment_resolution,
            frame_rate,
            width,
            height,
        })
    }

    /// Describe the layer as a [`VideoConfig`]; `config` holds the raw VOS/VOL bytes
    pub fn video_config(&self, profile_level: u8, config: Bytes) -> VideoConfig {
        VideoConfig {
            codec: VideoCodec::Mpeg4,
            width: self.width,
            height: self.height,
            profile: profile_level,
            level: 0,
            chroma_format: self.chroma_format,
            bit_depth: 8,
            frame_rate: self.frame_rate,
            parameter_sets: ParameterSets::default(),
            record: config,
        }
    }
}

fn marker(r: &mut BitReader<'_>) -> Result<()> {
    if !r.read_flag()? {
        return Err(CodecError::invalid_syntax("marker_bit", "0"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn vol_body(width: u32, height: u32, resolution: u32, increment: u32) -> Vec<u8> {
    use crate::bitstream::BitWriter;

    let mut w = BitWriter::new();
    w.write_flag(false);
    w.write_bits(8, 1); // simple object
    w.write_flag(true);
    w.write_bits(4, 2);
    w.write_bits(3, 1);
    w.write_bits(4, 1); // square pixels
    w.write_flag(false);
    w.write_bits(2, 0); // rectangular
    w.write_flag(true);
    w.write_bits(16, resolution);
    w.write_flag(true);
    w.write_flag(true); // fixed_vop_rate
    let bits = (32 - (resolution - 1).leading_zeros()).max(1);
    w.write_bits(bits, increment);
    w.write_flag(true);
    w.write_bits(13, width);
    w.write_flag(true);
    w.write_bits(13, height);
    w.write_flag(true);
    w.write_bits(4, 0b0100); // interlaced, obmc_disable, sprite_enable
    w.into_bytes()
}
