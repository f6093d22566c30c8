//! Decoder configuration records
//!
//! Containers carry parameter sets either in a configuration record (FLV
//! sequence headers, `avcC`/`hvcC` boxes) or in-band (transport streams, raw
//! Annex-B). Both paths end in a [`VideoConfig`] whose record always declares
//! 4-byte NAL lengths, matching the framing of emitted payloads.

pub mod avcc;
pub mod hvcc;

pub use avcc::AvcDecoderConfigurationRecord;
pub use hvcc::HevcDecoderConfigurationRecord;

use crate::error::{CodecError, Result};
use crate::h26x::{h264, h265};
use crate::types::{ParameterSets, VideoCodec, VideoConfig};

/// A configuration record as carried by a container
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    /// Normalized stream configuration
    pub config: VideoConfig,
    /// NAL length size the container's samples use
    pub length_size: u8,
}

/// Build a [`VideoConfig`] from a complete set of raw parameter sets
pub fn video_config(codec: VideoCodec, sets: ParameterSets) -> Result<VideoConfig> {
    if !sets.is_complete(codec) {
        return Err(CodecError::invalid_record(format!(
            "incomplete {} parameter sets",
            codec.name()
        )));
    }
    match codec {
        VideoCodec::H264 => {
            let sps = h264::Sps::parse(&sets.sps[0])?;
            let record = AvcDecoderConfigurationRecord::from_parameter_sets(&sets.sps, &sets.pps)?;
            Ok(VideoConfig {
                codec,
                width: sps.width,
                height: sps.height,
                profile: sps.profile_idc,
                level: sps.level_idc,
                chroma_format: sps.chroma_format_idc,
                bit_depth: sps.bit_depth_luma,
                frame_rate: sps.frame_rate,
                record: record.to_bytes()?,
                parameter_sets: sets,
            })
        }
        VideoCodec::H265 => {
            let sps = h265::Sps::parse(&sets.sps[0])?;
            let record =
                HevcDecoderConfigurationRecord::from_parameter_sets(&sets.vps, &sets.sps, &sets.pps)?;
            Ok(VideoConfig {
                codec,
                width: sps.width,
                height: sps.height,
                profile: sps.profile_tier_level.profile_idc,
                level: sps.profile_tier_level.level_idc,
                chroma_format: sps.chroma_format_idc,
                bit_depth: sps.bit_depth_luma,
                frame_rate: sps.frame_rate,
                record: record.to_bytes()?,
                parameter_sets: sets,
            })
        }
        VideoCodec::Mpeg4 => Err(CodecError::unsupported_codec(
            "MPEG-4 visual has no parameter set record",
        )),
    }
}

/// Read an `avcC`/`hvcC` style record and normalize it
pub fn video_config_from_record(codec: VideoCodec, record: &[u8]) -> Result<ContainerRecord> {
    let (sets, length_size) = match codec {
        VideoCodec::H264 => {
            let avcc = AvcDecoderConfigurationRecord::parse(record)?;
            let sets = ParameterSets {
                vps: Vec::new(),
                sps: avcc.sps,
                pps: avcc.pps,
            };
            (sets, avcc.length_size)
        }
        VideoCodec::H265 => {
            let hvcc = HevcDecoderConfigurationRecord::parse(record)?;
            let sets = ParameterSets {
                vps: hvcc.vps,
                sps: hvcc.sps,
                pps: hvcc.pps,
            };
            (sets, hvcc.length_size)
        }
        VideoCodec::Mpeg4 => {
            return Err(CodecError::unsupported_codec("MPEG-4 visual configuration record"));
        }
    };
    Ok(ContainerRecord {
        config: video_config(codec, sets)?,
        length_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h26x::fixtures::*;
    use bytes::Bytes;

    #[test]
    fn test_h264_config_from_sets() {
        let sets = ParameterSets {
            vps: Vec::new(),
            sps: vec![Bytes::from_static(&AVC_SPS_640X480)],
            pps: vec![Bytes::from_static(&AVC_PPS)],
        };
        let config = video_config(VideoCodec::H264, sets).unwrap();
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.profile, 77);
        assert_eq!(config.level, 30);
        assert_eq!(config.record[4], 0xFF);
        assert_eq!(config.describe(), "H264 640x480");
    }

    #[test]
    fn test_record_keeps_container_length_size() {
        let mut record = vec![0x01, 0x4d, 0x40, 0x1e, 0xFD, 0xE1];
        record.extend_from_slice(&(AVC_SPS_640X480.len() as u16).to_be_bytes());
        record.extend_from_slice(&AVC_SPS_640X480);
        record.push(1);
        record.extend_from_slice(&(AVC_PPS.len() as u16).to_be_bytes());
        record.extend_from_slice(&AVC_PPS);

        let parsed = video_config_from_record(VideoCodec::H264, &record).unwrap();
        assert_eq!(parsed.length_size, 2);
        // The rebuilt record always announces 4-byte lengths
        assert_eq!(parsed.config.record[4], 0xFF);
    }

    #[test]
    fn test_h265_config_from_sets() {
        let sets = ParameterSets {
            vps: vec![Bytes::from_static(&HEVC_VPS_1080P)],
            sps: vec![Bytes::from_static(&HEVC_SPS_1080P)],
            pps: vec![Bytes::from_static(&HEVC_PPS_WAVEFRONT)],
        };
        let config = video_config(VideoCodec::H265, sets).unwrap();
        assert_eq!((config.width, config.height), (1920, 1080));
        assert_eq!(config.frame_rate, Some(30.0));
        let hvcc = HevcDecoderConfigurationRecord::parse(&config.record).unwrap();
        assert_eq!(hvcc.length_size, 4);
        assert_eq!(hvcc.vps.len(), 1);
    }

    #[test]
    fn test_incomplete_sets_are_rejected() {
        let sets = ParameterSets {
            vps: Vec::new(),
            sps: vec![Bytes::from_static(&HEVC_SPS_1080P)],
            pps: vec![Bytes::from_static(&HEVC_PPS_WAVEFRONT)],
        };
        assert!(video_config(VideoCodec::H265, sets).is_err());
    }
}
