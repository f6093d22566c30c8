//! FLV header, tag header and tag body layouts

use rplay_codec_core::{AudioCodec, ByteReader, VideoCodec};

use crate::error::{DemuxError, Result};

/// File header length
pub const FLV_HEADER_LEN: usize = 9;
/// Tag header length
pub const TAG_HEADER_LEN: usize = 11;
/// PreviousTagSize field length
pub const PREVIOUS_TAG_SIZE_LEN: usize = 4;

/// Tag type codes
pub mod tag_type {
    /// Audio tag
    pub const AUDIO: u8 = 8;
    /// Video tag
    pub const VIDEO: u8 = 9;
    /// Script data tag
    pub const SCRIPT: u8 = 18;
}

/// Frame type values shared by the legacy and enhanced video headers
mod frame_type {
    pub const KEY: u8 = 1;
    pub const GENERATED_KEY: u8 = 4;
    pub const COMMAND: u8 = 5;
}

/// The 9-byte file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvHeader {
    /// Format version (1)
    pub version: u8,
    /// Audio tags present
    pub has_audio: bool,
    /// Video tags present
    pub has_video: bool,
    /// Offset of the first PreviousTagSize field
    pub data_offset: u32,
}

impl FlvHeader {
    /// Parse the header at the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let signature = r.read_bytes(3)?;
        if signature != b"FLV" {
            return Err(DemuxError::invalid_header(
                "flv",
                format!("signature {:02x?}", signature),
            ));
        }
        let version = r.read_u8()?;
        let flags = r.read_u8()?;
        let data_offset = r.read_u32()?;
        if (data_offset as usize) < FLV_HEADER_LEN {
            return Err(DemuxError::invalid_header(
                "flv",
                format!("data offset {data_offset}"),
            ));
        }
        Ok(Self {
            version,
            has_audio: flags & 0x04 != 0,
            has_video: flags & 0x01 != 0,
            data_offset,
        })
    }
}

/// The 11-byte tag header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    /// Tag type (audio, video, script)
    pub tag_type: u8,
    /// Filter bit (pre-processing required)
    pub filtered: bool,
    /// Body size in bytes
    pub data_size: u32,
    /// Timestamp in milliseconds including the extension byte
    pub timestamp: u32,
}

impl TagHeader {
    /// Parse a tag header
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let first = r.read_u8()?;
        let data_size = r.read_u24()?;
        let low = r.read_u24()?;
        let extension = r.read_u8()?;
        r.skip(3)?; // stream id, always zero
        Ok(Self {
            tag_type: first & 0x1F,
            filtered: first & 0x20 != 0,
            data_size,
            timestamp: (extension as u32) << 24 | low,
        })
    }
}

/// A decoded video tag body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoPacket<'a> {
    /// AVCDecoderConfigurationRecord / HEVCDecoderConfigurationRecord
    SequenceHeader {
        /// Codec announced by the tag
        codec: VideoCodec,
        /// Record bytes
        record: &'a [u8],
    },
    /// Length-prefixed NAL units of one picture
    Frames {
        /// Codec announced by the tag
        codec: VideoCodec,
        /// Key or generated-key frame
        keyframe: bool,
        /// Composition time offset in ms
        composition_time: i32,
        /// NAL units with the record's length prefixes
        data: &'a [u8],
    },
    /// End of sequence marker
    EndOfSequence,
    /// A valid tag with nothing to emit
    Ignored(&'static str),
    /// Codec this demuxer does not handle
    UnsupportedCodec(String),
}

/// Decode a video tag body, legacy or enhanced
pub fn parse_video(body: &[u8]) -> Result<VideoPacket<'_>> {
    let mut r = ByteReader::new(body);
    let first = r.read_u8()?;
    if first & 0x80 != 0 {
        return parse_enhanced_video(first, &mut r);
    }
    let frame = first >> 4;
    if frame == frame_type::COMMAND {
        return Ok(VideoPacket::Ignored("video info/command frame"));
    }
    let codec = match first & 0x0F {
        7 => VideoCodec::H264,
        12 => VideoCodec::H265,
        other => return Ok(VideoPacket::UnsupportedCodec(format!("flv video codec id {other}"))),
    };
    let packet_type = r.read_u8()?;
    let composition_time = r.read_i24()?;
    match packet_type {
        0 => Ok(VideoPacket::SequenceHeader {
            codec,
            record: r.rest(),
        }),
        1 => Ok(VideoPacket::Frames {
            codec,
            keyframe: is_key(frame),
            composition_time,
            data: r.rest(),
        }),
        2 => Ok(VideoPacket::EndOfSequence),
        other => Err(DemuxError::malformed(
            "flv",
            format!("video packet type {other}"),
        )),
    }
}

fn parse_enhanced_video<'a>(first: u8, r: &mut ByteReader<'a>) -> Result<VideoPacket<'a>> {
    let frame = (first >> 4) & 0x07;
    let packet_type = first & 0x0F;
    let fourcc = r.read_fourcc()?;
    if frame == frame_type::COMMAND && packet_type != 4 {
        return Ok(VideoPacket::Ignored("video command frame"));
    }
    let codec = match &fourcc {
        b"avc1" => VideoCodec::H264,
        b"hvc1" | b"hev1" => VideoCodec::H265,
        other => {
            return Ok(VideoPacket::UnsupportedCodec(format!(
                "enhanced flv fourcc {}",
                String::from_utf8_lossy(other)
            )))
        }
    };
    match packet_type {
        0 => Ok(VideoPacket::SequenceHeader {
            codec,
            record: r.rest(),
        }),
        1 => {
            let composition_time = r.read_i24()?;
            Ok(VideoPacket::Frames {
                codec,
                keyframe: is_key(frame),
                composition_time,
                data: r.rest(),
            })
        }
        2 => Ok(VideoPacket::EndOfSequence),
        3 => Ok(VideoPacket::Frames {
            codec,
            keyframe: is_key(frame),
            composition_time: 0,
            data: r.rest(),
        }),
        4 => Ok(VideoPacket::Ignored("enhanced video metadata")),
        other => Err(DemuxError::unsupported(
            "flv",
            format!("enhanced video packet type {other}"),
        )),
    }
}

fn is_key(frame: u8) -> bool {
    frame == frame_type::KEY || frame == frame_type::GENERATED_KEY
}

/// A decoded audio tag body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPacket<'a> {
    /// AudioSpecificConfig
    AacConfig(&'a [u8]),
    /// Raw AAC access unit
    AacFrame(&'a [u8]),
    /// MPEG audio frame
    Mp3(&'a [u8]),
    /// G.711 samples
    G711 {
        /// A-law or µ-law
        codec: AudioCodec,
        /// Channel count from the sound type bit
        channels: u8,
        /// Sample bytes
        data: &'a [u8],
    },
    /// Sound format this demuxer does not handle
    Unsupported(u8),
}

/// Decode an audio tag body
pub fn parse_audio(body: &[u8]) -> Result<AudioPacket<'_>> {
    let mut r = ByteReader::new(body);
    let flags = r.read_u8()?;
    let format = flags >> 4;
    let channels = if flags & 0x01 != 0 { 2 } else { 1 };
    match format {
        10 => match r.read_u8()? {
            0 => Ok(AudioPacket::AacConfig(r.rest())),
            1 => Ok(AudioPacket::AacFrame(r.rest())),
            other => Err(DemuxError::malformed(
                "flv",
                format!("aac packet type {other}"),
            )),
        },
        // 14 is MP3 at 8 kHz
        2 | 14 => Ok(AudioPacket::Mp3(r.rest())),
        7 => Ok(AudioPacket::G711 {
            codec: AudioCodec::Alaw,
            channels,
            data: r.rest(),
        }),
        8 => Ok(AudioPacket::G711 {
            codec: AudioCodec::Mulaw,
            channels,
            data: r.rest(),
        }),
        other => Ok(AudioPacket::Unsupported(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let header = FlvHeader::parse(&[b'F', b'L', b'V', 1, 0x05, 0, 0, 0, 9]).unwrap();
        assert!(header.has_audio && header.has_video);
        assert_eq!(header.data_offset, 9);

        assert!(FlvHeader::parse(b"FLX\x01\x05\x00\x00\x00\x09").is_err());
        assert!(FlvHeader::parse(&[b'F', b'L', b'V', 1, 0x05, 0, 0, 0, 4]).is_err());
    }

    #[test]
    fn test_tag_header_timestamp_extension() {
        let header =
            TagHeader::parse(&[0x09, 0x00, 0x00, 0x10, 0x34, 0x56, 0x78, 0x01, 0, 0, 0]).unwrap();
        assert_eq!(header.tag_type, tag_type::VIDEO);
        assert_eq!(header.data_size, 16);
        assert_eq!(header.timestamp, 0x0134_5678);
        assert!(!header.filtered);
    }

    #[test]
    fn test_legacy_and_enhanced_frames_converge() {
        let legacy = [0x17, 0x01, 0x00, 0x00, 0x28, 0xAA];
        let enhanced = [0x91, b'a', b'v', b'c', b'1', 0x00, 0x00, 0x28, 0xAA];
        let expected = VideoPacket::Frames {
            codec: VideoCodec::H264,
            keyframe: true,
            composition_time: 40,
            data: &[0xAA],
        };
        assert_eq!(parse_video(&legacy).unwrap(), expected);
        assert_eq!(parse_video(&enhanced).unwrap(), expected);
    }

    #[test]
    fn test_enhanced_frames_without_composition_time() {
        let body = [0xA3, b'h', b'v', b'c', b'1', 0xBB];
        assert_eq!(
            parse_video(&body).unwrap(),
            VideoPacket::Frames {
                codec: VideoCodec::H265,
                keyframe: false,
                composition_time: 0,
                data: &[0xBB],
            }
        );
    }

    #[test]
    fn test_unsupported_legacy_codec_is_named() {
        let packet = parse_video(&[0x12, 0x00]).unwrap();
        assert_eq!(packet.clone(), VideoPacket::UnsupportedCodec("flv video codec id 2".to_string()));
        assert!(matches!(packet, VideoPacket::UnsupportedCodec(what) if what.ends_with('2')));
    }

    #[test]
    fn test_negative_composition_time() {
        let body = [0x27, 0x01, 0xFF, 0xFF, 0xD8];
        match parse_video(&body).unwrap() {
            VideoPacket::Frames {
                composition_time, ..
            } => assert_eq!(composition_time, -40),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_audio_formats() {
        assert_eq!(parse_audio(&[0xAF, 0x00, 0x12, 0x10]).unwrap(), AudioPacket::AacConfig(&[0x12, 0x10]));
        assert_eq!(
            parse_audio(&[0x72, 0xD5]).unwrap(),
            AudioPacket::G711 {
                codec: AudioCodec::Alaw,
                channels: 1,
                data: &[0xD5],
            }
        );
        assert_eq!(parse_audio(&[0x2F, 0xFF]).unwrap(), AudioPacket::Mp3(&[0xFF]));
        assert_eq!(parse_audio(&[0xB2]).unwrap(), AudioPacket::Unsupported(11));
    }
}
