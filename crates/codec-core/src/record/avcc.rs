//! AVCDecoderConfigurationRecord (ISO/IEC 14496-15 5.3.3)

use bytes::{BufMut, Bytes, BytesMut};

use crate::bitstream::ByteReader;
use crate::error::{CodecError, Result};
use crate::h26x::h264::Sps;

/// Decoded AVC configuration record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfigurationRecord {
    /// AVCProfileIndication
    pub profile: u8,
    /// profile_compatibility
    pub compatibility: u8,
    /// AVCLevelIndication
    pub level: u8,
    /// Bytes per NAL length prefix (1, 2 or 4)
    pub length_size: u8,
    /// Sequence parameter sets
    pub sps: Vec<Bytes>,
    /// Picture parameter sets
    pub pps: Vec<Bytes>,
}

impl AvcDecoderConfigurationRecord {
    /// Parse a serialized record
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let version = r.read_u8()?;
        if version != 1 {
            return Err(CodecError::invalid_record(format!("avcC version {version}")));
        }
        let profile = r.read_u8()?;
        let compatibility = r.read_u8()?;
        let level = r.read_u8()?;
        let length_size = (r.read_u8()? & 0x03) + 1;
        if length_size == 3 {
            return Err(CodecError::UnsupportedNalLengthSize { size: 3 });
        }
        let sps_count = r.read_u8()? & 0x1F;
        let sps = read_units(&mut r, sps_count as usize)?;
        let pps_count = r.read_u8()?;
        let pps = read_units(&mut r, pps_count as usize)?;
        if sps.is_empty() {
            return Err(CodecError::invalid_record("avcC without SPS"));
        }
        // Trailing high-profile extension is not needed
        Ok(Self {
            profile,
            compatibility,
            level,
            length_size,
            sps,
            pps,
        })
    }

    /// Build a record with 4-byte NAL lengths from raw parameter sets
    pub fn from_parameter_sets(sps: &[Bytes], pps: &[Bytes]) -> Result<Self> {
        let first = sps
            .first()
            .ok_or_else(|| CodecError::invalid_record("no SPS to build avcC from"))?;
        if first.len() < 4 {
            return Err(CodecError::invalid_record("SPS shorter than its profile fields"));
        }
        Ok(Self {
            profile: first[1],
            compatibility: first[2],
            level: first[3],
            length_size: 4,
            sps: sps.to_vec(),
            pps: pps.to_vec(),
        })
    }

    /// Serialize the record
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        out.put_u8(1);
        out.put_u8(self.profile);
        out.put_u8(self.compatibility);
        out.put_u8(self.level);
        out.put_u8(0xFC | (self.length_size - 1));
        if self.sps.len() > 31 {
            return Err(CodecError::invalid_record(format!("{} SPS units", self.sps.len())));
        }
        out.put_u8(0xE0 | self.sps.len() as u8);
        write_units(&mut out, &self.sps)?;
        if self.pps.len() > 255 {
            return Err(CodecError::invalid_record(format!("{} PPS units", self.pps.len())));
        }
        out.put_u8(self.pps.len() as u8);
        write_units(&mut out, &self.pps)?;

        if matches!(self.profile, 100 | 110 | 122 | 144) {
            let sps = Sps::parse(&self.sps[0])?;
            out.put_u8(0xFC | sps.chroma_format_idc);
            out.put_u8(0xF8 | (sps.bit_depth_luma - 8));
            out.put_u8(0xF8 | (sps.bit_depth_chroma - 8));
            out.put_u8(0);
        }
        Ok(out.freeze())
    }
}

pub(crate) fn read_units(r: &mut ByteReader<'_>, count: usize) -> Result<Vec<Bytes>> {
    let mut units = Vec::with_capacity(count);
    for _ in 0..count {
        let len = r.read_u16()? as usize;
        units.push(Bytes::copy_from_slice(r.read_bytes(len)?));
    }
    Ok(units)
}

pub(crate) fn write_units(out: &mut BytesMut, units: &[Bytes]) -> Result<()> {
    for unit in units {
        let len = u16::try_from(unit.len())
            .map_err(|_| CodecError::invalid_record(format!("{} byte parameter set", unit.len())))?;
        out.put_u16(len);
        out.put_slice(unit);
    }
    Ok(())
}
