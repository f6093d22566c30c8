//! HEVCDecoderConfigurationRecord (ISO/IEC 14496-15 8.3.3)

use bytes::{BufMut, Bytes, BytesMut};

use super::avcc::{read_units, write_units};
use crate::bitstream::ByteReader;
use crate::error::{CodecError, Result};
use crate::h26x::h265::{self, nal_type, Pps, Sps};

/// Decoded HEVC configuration record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcDecoderConfigurationRecord {
    /// general_profile_space
    pub profile_space: u8,
    /// general_tier_flag
    pub tier_flag: bool,
    /// general_profile_idc
    pub profile_idc: u8,
    /// general_profile_compatibility_flags
    pub compatibility_flags: u32,
    /// general_constraint_indicator_flags (48 bits)
    pub constraint_flags: u64,
    /// general_level_idc
    pub level_idc: u8,
    /// min_spatial_segmentation_idc
    pub min_spatial_segmentation_idc: u16,
    /// parallelismType
    pub parallelism_type: u8,
    /// chroma_format_idc
    pub chroma_format_idc: u8,
    /// Luma bit depth
    pub bit_depth_luma: u8,
    /// Chroma bit depth
    pub bit_depth_chroma: u8,
    /// numTemporalLayers
    pub temporal_layers: u8,
    /// temporalIdNested
    pub temporal_id_nested: bool,
    /// Bytes per NAL length prefix
    pub length_size: u8,
    /// Video parameter sets
    pub vps: Vec<Bytes>,
    /// Sequence parameter sets
    pub sps: Vec<Bytes>,
    /// Picture parameter sets
    pub pps: Vec<Bytes>,
}

impl HevcDecoderConfigurationRecord {
    /// Parse a serialized record
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let version = r.read_u8()?;
        if version != 1 {
            return Err(CodecError::invalid_record(format!("hvcC version {version}")));
        }
        let ptl = r.read_u8()?;
        let compatibility_flags = r.read_u32()?;
        let constraint_flags = ((r.read_u16()? as u64) << 32) | r.read_u32()? as u64;
        let level_idc = r.read_u8()?;
        let min_spatial_segmentation_idc = r.read_u16()? & 0x0FFF;
        let parallelism_type = r.read_u8()? & 0x03;
        let chroma_format_idc = r.read_u8()? & 0x03;
        let bit_depth_luma = (r.read_u8()? & 0x07) + 8;
        let bit_depth_chroma = (r.read_u8()? & 0x07) + 8;
        r.skip(2)?; // avgFrameRate
        let flags = r.read_u8()?;
        let length_size = (flags & 0x03) + 1;
        if length_size == 3 {
            return Err(CodecError::UnsupportedNalLengthSize { size: 3 });
        }

        let mut vps = Vec::new();
        let mut sps = Vec::new();
        let mut pps = Vec::new();
        let arrays = r.read_u8()?;
        for _ in 0..arrays {
            let kind = r.read_u8()? & 0x3F;
            let count = r.read_u16()? as usize;
            let units = read_units(&mut r, count)?;
            match kind {
                nal_type::VPS => vps.extend(units),
                nal_type::SPS => sps.extend(units),
                nal_type::PPS => pps.extend(units),
                // SEI arrays are legal and carry nothing we need
                _ => {}
            }
        }
        if sps.is_empty() {
            return Err(CodecError::invalid_record("hvcC without SPS"));
        }

        Ok(Self {
            profile_space: ptl >> 6,
            tier_flag: ptl & 0x20 != 0,
            profile_idc: ptl & 0x1F,
            compatibility_flags,
            constraint_flags,
            level_idc,
            min_spatial_segmentation_idc,
            parallelism_type,
            chroma_format_idc,
            bit_depth_luma,
            bit_depth_chroma,
            temporal_layers: (flags >> 3) & 0x07,
            temporal_id_nested: flags & 0x04 != 0,
            length_size,
            vps,
            sps,
            pps,
        })
    }

    /// Build a record with 4-byte NAL lengths from raw parameter sets
    pub fn from_parameter_sets(vps: &[Bytes], sps: &[Bytes], pps: &[Bytes]) -> Result<Self> {
        let first_sps = sps
            .first()
            .ok_or_else(|| CodecError::invalid_record("no SPS to build hvcC from"))?;
        let parsed = Sps::parse(first_sps)?;
        let parallelism_type = match pps.first() {
            Some(unit) => Pps::parse(unit)?.parallelism_type(),
            None => 0,
        };
        let ptl = &parsed.profile_tier_level;
        Ok(Self {
            profile_space: ptl.profile_space,
            tier_flag: ptl.tier_flag,
            profile_idc: ptl.profile_idc,
            compatibility_flags: ptl.compatibility_flags,
            constraint_flags: ptl.constraint_flags,
            level_idc: ptl.level_idc,
            min_spatial_segmentation_idc: parsed.min_spatial_segmentation_idc,
            parallelism_type,
            chroma_format_idc: parsed.chroma_format_idc,
            bit_depth_luma: parsed.bit_depth_luma,
            bit_depth_chroma: parsed.bit_depth_chroma,
            temporal_layers: parsed.max_sub_layers,
            temporal_id_nested: parsed.temporal_id_nesting,
            length_size: 4,
            vps: vps.to_vec(),
            sps: sps.to_vec(),
            pps: pps.to_vec(),
        })
    }

    /// Serialize the record
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        out.put_u8(1);
        out.put_u8((self.profile_space << 6) | ((self.tier_flag as u8) << 5) | self.profile_idc);
        out.put_u32(self.compatibility_flags);
        out.put_u16((self.constraint_flags >> 32) as u16);
        out.put_u32(self.constraint_flags as u32);
        out.put_u8(self.level_idc);
        out.put_u16(0xF000 | self.min_spatial_segmentation_idc);
        out.put_u8(0xFC | self.parallelism_type);
        out.put_u8(0xFC | self.chroma_format_idc);
        out.put_u8(0xF8 | (self.bit_depth_luma - 8));
        out.put_u8(0xF8 | (self.bit_depth_chroma - 8));
        out.put_u16(0); // avgFrameRate
        out.put_u8(
            (self.temporal_layers << 3)
                | ((self.temporal_id_nested as u8) << 2)
                | (self.length_size - 1),
        );

        let arrays = [
            (h265::nal_type::VPS, &self.vps),
            (h265::nal_type::SPS, &self.sps),
            (h265::nal_type::PPS, &self.pps),
        ];
        out.put_u8(arrays.iter().filter(|(_, units)| !units.is_empty()).count() as u8);
        for (kind, units) in arrays {
            if units.is_empty() {
                continue;
            }
            out.put_u8(0x80 | kind);
            out.put_u16(units.len() as u16);
            write_units(&mut out, units)?;
        }
        Ok(out.freeze())
    }
}
