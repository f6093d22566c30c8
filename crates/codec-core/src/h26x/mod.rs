//! H.264 and H.265 bitstream support
//!
//! Parameter set parsing and NAL unit framing. Slice data is never parsed
//! beyond the first bits needed to find picture boundaries.

pub mod h264;
pub mod h265;
pub mod nal;

pub use nal::NalFormat;

use crate::types::VideoCodec;

/// Codec-neutral view of a NAL unit header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalKind {
    /// Slice data; `first` marks the first slice of a picture
    Slice { keyframe: bool, first: bool },
    /// Video parameter set (H.265)
    Vps,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Access unit delimiter
    Aud,
    /// Prefix SEI
    Sei,
    /// End of sequence or stream
    EndOfSequence,
    /// Anything else (suffix SEI, filler, reserved)
    Other,
}

impl NalKind {
    /// Classify a NAL unit (header included) for the given codec
    pub fn classify(codec: VideoCodec, nal: &[u8]) -> Self {
        let Some(&header) = nal.first() else {
            return Self::Other;
        };
        match codec {
            VideoCodec::H264 => match h264::nal_type(header) {
                t if h264::is_slice(t) => Self::Slice {
                    keyframe: h264::is_keyframe(t),
                    first: h264::is_first_slice(nal),
                },
                h264::nal_type::SPS => Self::Sps,
                h264::nal_type::PPS => Self::Pps,
                h264::nal_type::AUD => Self::Aud,
                h264::nal_type::SEI => Self::Sei,
                h264::nal_type::END_OF_SEQUENCE | h264::nal_type::END_OF_STREAM => {
                    Self::EndOfSequence
                }
                _ => Self::Other,
            },
            VideoCodec::H265 => match h265::nal_type(header) {
                t if h265::is_vcl(t) => Self::Slice {
                    keyframe: h265::is_keyframe(t),
                    first: h265::is_first_slice(nal),
                },
                h265::nal_type::VPS => Self::Vps,
                h265::nal_type::SPS => Self::Sps,
                h265::nal_type::PPS => Self::Pps,
                h265::nal_type::AUD => Self::Aud,
                h265::nal_type::PREFIX_SEI => Self::Sei,
                h265::nal_type::EOS | h265::nal_type::EOB => Self::EndOfSequence,
                _ => Self::Other,
            },
            VideoCodec::Mpeg4 => Self::Other,
        }
    }

    /// Whether the NAL is a parameter set
    pub fn is_parameter_set(self) -> bool {
        matches!(self, Self::Vps | Self::Sps | Self::Pps)
    }

    /// Whether the NAL carries slice data
    pub fn is_slice(self) -> bool {
        matches!(self, Self::Slice { .. })
    }
}

/// Guess the codec from a parameter set NAL header byte.
///
/// H.264 SPS/PPS headers (`0x67`/`0x68` with any nal_ref_idc) and H.265
/// VPS/SPS/PPS headers (`0x40`/`0x42`/`0x44`) do not overlap.
pub fn detect_codec(header: u8) -> Option<VideoCodec> {
    if header & 0x80 != 0 {
        return None;
    }
    match h265::nal_type(header) {
        h265::nal_type::VPS | h265::nal_type::SPS | h265::nal_type::PPS if header & 0x01 == 0 => {
            return Some(VideoCodec::H265)
        }
        _ => {}
    }
    match h264::nal_type(header) {
        h264::nal_type::SPS | h264::nal_type::PPS if header & 0x60 != 0 => Some(VideoCodec::H264),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn parameter_set_parsers_reject_garbage_without_panicking(
            body in proptest::collection::vec(any::<u8>(), 0..96)
        ) {
            let mut avc = vec![0x67];
            avc.extend_from_slice(&body);
            let _ = h264::Sps::parse(&avc);

            for header in [0x40u8, 0x42, 0x44] {
                let mut hevc = vec![header, 0x01];
                hevc.extend_from_slice(&body);
                let _ = h265::Vps::parse(&hevc);
                let _ = h265::Sps::parse(&hevc);
                let _ = h265::Pps::parse(&hevc);
            }
        }

        #[test]
        fn annex_b_conversion_preserves_nal_units(
            nals in proptest::collection::vec(
                (1u8..=0x7F, proptest::collection::vec(1u8..=0xFF, 0..32)),
                1..8,
            )
        ) {
            let units: Vec<Vec<u8>> = nals
                .into_iter()
                .map(|(header, mut body)| {
                    body.insert(0, header);
                    body
                })
                .collect();
            let framed = nal::to_length_prefixed(units.iter().map(Vec::as_slice));
            let annex_b = nal::length_prefixed_to_annex_b(&framed).unwrap();
            let split: Vec<&[u8]> = nal::split_annex_b(&annex_b);
            prop_assert_eq!(split.len(), units.len());
            for (got, want) in split.iter().zip(&units) {
                prop_assert_eq!(*got, want.as_slice());
            }
        }
    }

    #[test]
    fn test_detect_codec_from_parameter_sets() {
        assert_eq!(detect_codec(0x67), Some(VideoCodec::H264));
        assert_eq!(detect_codec(0x27), Some(VideoCodec::H264));
        assert_eq!(detect_codec(0x68), Some(VideoCodec::H264));
        assert_eq!(detect_codec(0x40), Some(VideoCodec::H265));
        assert_eq!(detect_codec(0x42), Some(VideoCodec::H265));
        assert_eq!(detect_codec(0x44), Some(VideoCodec::H265));
        assert_eq!(detect_codec(0x65), None);
        assert_eq!(detect_codec(0x26), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            NalKind::classify(VideoCodec::H264, &[0x65, 0x88]),
            NalKind::Slice {
                keyframe: true,
                first: true
            }
        );
        assert_eq!(NalKind::classify(VideoCodec::H264, &[0x09, 0xf0]), NalKind::Aud);
        assert_eq!(NalKind::classify(VideoCodec::H265, &[0x46, 0x01, 0x50]), NalKind::Aud);
        assert!(NalKind::classify(VideoCodec::H265, &[0x40, 0x01]).is_parameter_set());
        assert_eq!(NalKind::classify(VideoCodec::H265, &[]), NalKind::Other);
    }
}
