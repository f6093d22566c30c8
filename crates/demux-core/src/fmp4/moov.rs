//! Movie box: track setup and fragment defaults

use std::sync::Arc;

use bytes::Bytes;
use rplay_codec_core::audio::AudioSpecificConfig;
use rplay_codec_core::record::video_config_from_record;
use rplay_codec_core::{AudioCodec, AudioConfig, ByteReader, VideoCodec, VideoConfig};
use tracing::{debug, trace};

use super::boxes::{children, find_child, fourcc_name, full_box};
use crate::error::{DemuxError, Result};

/// Sample flag bit marking a sample that is not a sync sample
pub const SAMPLE_IS_NON_SYNC: u32 = 0x0001_0000;

/// Per-track sample defaults from `trex`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackDefaults {
    /// default_sample_description_index
    pub sample_description_index: u32,
    /// default_sample_duration
    pub sample_duration: u32,
    /// default_sample_size
    pub sample_size: u32,
    /// default_sample_flags
    pub sample_flags: u32,
}

/// What a track carries
#[derive(Debug, Clone, PartialEq)]
pub enum TrackMedia {
    /// H.264/H.265 video with the container's NAL length size
    Video {
        /// Stream configuration
        config: Arc<VideoConfig>,
        /// NAL length size of the samples
        length_size: u8,
    },
    /// Audio
    Audio {
        /// Stream configuration
        config: Arc<AudioConfig>,
    },
    /// A track the player does not decode (hint, text, unknown codecs)
    Ignored,
}

/// One `trak` of the movie
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// track_ID from `tkhd`
    pub id: u32,
    /// Media timescale from `mdhd`
    pub timescale: u32,
    /// Decoded sample entry
    pub media: TrackMedia,
    /// Fragment defaults from `trex`
    pub defaults: TrackDefaults,
}

impl Track {
    /// Convert media ticks to milliseconds
    pub fn ticks_to_ms(&self, ticks: u64) -> u64 {
        if self.timescale == 0 {
            return 0;
        }
        (ticks as u128 * 1000 / self.timescale as u128) as u64
    }
}

/// Tracks declared by a `moov`, plus the problems met while reading them
#[derive(Debug, Clone, Default)]
pub struct Movie {
    /// Tracks in declaration order
    pub tracks: Vec<Track>,
    /// Non-fatal problems (unsupported sample entries, bad records)
    pub warnings: Vec<String>,
}

/// Parse the body of a `moov` box
pub fn parse_moov(body: &[u8]) -> Result<Movie> {
    let mut movie = Movie::default();
    let mut defaults = Vec::new();
    for child in children(body) {
        let (kind, child_body) = child?;
        match &kind {
            b"trak" => match parse_trak(child_body, &mut movie.warnings)? {
                Some(track) => movie.tracks.push(track),
                None => trace!("Skipping trak without media"),
            },
            b"mvex" => {
                for entry in children(child_body) {
                    let (kind, trex) = entry?;
                    if &kind == b"trex" {
                        defaults.push(parse_trex(trex)?);
                    }
                }
            }
            _ => {}
        }
    }
    for (track_id, trex) in defaults {
        if let Some(track) = movie.tracks.iter_mut().find(|t| t.id == track_id) {
            track.defaults = trex;
        }
    }
    Ok(movie)
}

fn parse_trex(body: &[u8]) -> Result<(u32, TrackDefaults)> {
    let (_, _, mut r) = full_box(body)?;
    let track_id = r.read_u32()?;
    Ok((
        track_id,
        TrackDefaults {
            sample_description_index: r.read_u32()?,
            sample_duration: r.read_u32()?,
            sample_size: r.read_u32()?,
            sample_flags: r.read_u32()?,
        },
    ))
}

fn parse_trak(body: &[u8], warnings: &mut Vec<String>) -> Result<Option<Track>> {
    let tkhd = find_child(body, b"tkhd")?.ok_or_else(|| missing("tkhd"))?;
    let (version, _, mut r) = full_box(tkhd)?;
    r.skip(if version == 1 { 16 } else { 8 })?;
    let id = r.read_u32()?;

    let Some(mdia) = find_child(body, b"mdia")? else {
        return Ok(None);
    };
    let mdhd = find_child(mdia, b"mdhd")?.ok_or_else(|| missing("mdhd"))?;
    let (version, _, mut r) = full_box(mdhd)?;
    r.skip(if version == 1 { 16 } else { 8 })?;
    let timescale = r.read_u32()?;

    let hdlr = find_child(mdia, b"hdlr")?.ok_or_else(|| missing("hdlr"))?;
    let (_, _, mut r) = full_box(hdlr)?;
    r.skip(4)?;
    let handler = r.read_fourcc()?;

    let stsd = find_child(mdia, b"minf")?
        .map(|minf| find_child(minf, b"stbl"))
        .transpose()?
        .flatten()
        .map(|stbl| find_child(stbl, b"stsd"))
        .transpose()?
        .flatten()
        .ok_or_else(|| missing("stsd"))?;
    let (_, _, mut r) = full_box(stsd)?;
    let entry_count = r.read_u32()?;
    let first_entry = children(r.rest()).next().transpose()?;

    let media = match (&handler, first_entry) {
        (_, None) if entry_count == 0 => TrackMedia::Ignored,
        (b"vide", Some((kind, entry))) => match parse_visual_entry(&kind, entry) {
            Ok(media) => media,
            Err(e) => {
                warnings.push(format!("track {id}: {e}"));
                TrackMedia::Ignored
            }
        },
        (b"soun", Some((kind, entry))) => match parse_audio_entry(&kind, entry) {
            Ok(media) => media,
            Err(e) => {
                warnings.push(format!("track {id}: {e}"));
                TrackMedia::Ignored
            }
        },
        _ => {
            trace!("Ignoring '{}' track {}", fourcc_name(&handler), id);
            TrackMedia::Ignored
        }
    };
    debug!("fMP4 track {} timescale {}: {:?}", id, timescale, media);
    Ok(Some(Track {
        id,
        timescale,
        media,
        defaults: TrackDefaults::default(),
    }))
}

fn missing(kind: &str) -> DemuxError {
    DemuxError::malformed("fmp4", format!("trak without {kind}"))
}

/// VisualSampleEntry fields before the child boxes
const VISUAL_ENTRY_LEN: usize = 78;
/// AudioSampleEntry fields before the child boxes (version 0)
const AUDIO_ENTRY_LEN: usize = 28;

fn parse_visual_entry(kind: &[u8; 4], entry: &[u8]) -> Result<TrackMedia> {
    let (codec, record_box) = match kind {
        b"avc1" | b"avc3" => (VideoCodec::H264, b"avcC"),
        b"hvc1" | b"hev1" => (VideoCodec::H265, b"hvcC"),
        other => {
            return Err(DemuxError::unsupported(
                "fmp4",
                format!("video sample entry '{}'", fourcc_name(other)),
            ))
        }
    };
    let children_data = entry
        .get(VISUAL_ENTRY_LEN..)
        .ok_or_else(|| DemuxError::malformed("fmp4", "visual sample entry too short"))?;
    let record = find_child(children_data, record_box)?.ok_or_else(|| {
        DemuxError::malformed("fmp4", format!("'{}' without '{}'", fourcc_name(kind), fourcc_name(record_box)))
    })?;
    let parsed = video_config_from_record(codec, record)?;
    Ok(TrackMedia::Video {
        config: Arc::new(parsed.config),
        length_size: parsed.length_size,
    })
}

fn parse_audio_entry(kind: &[u8; 4], entry: &[u8]) -> Result<TrackMedia> {
    let mut r = ByteReader::new(entry);
    r.skip(8)?;
    let version = r.read_u16()?;
    r.skip(6)?;
    let channels = r.read_u16()? as u8;
    r.skip(6)?;
    let sample_rate = r.read_u32()? >> 16;
    // QuickTime sound description extensions
    let extra = match version {
        1 => 16,
        2 => 36,
        _ => 0,
    };
    let children_data = entry.get(AUDIO_ENTRY_LEN + extra..).unwrap_or_default();

    let config = match kind {
        b"mp4a" => {
            let esds = find_child(children_data, b"esds")?
                .ok_or_else(|| DemuxError::malformed("fmp4", "'mp4a' without 'esds'"))?;
            let descriptor = parse_esds(esds)?;
            match descriptor.object_type {
                0x69 | 0x6B => mp3_config(sample_rate, channels),
                _ => {
                    let asc = descriptor.specific_info.ok_or_else(|| {
                        DemuxError::malformed("fmp4", "AAC 'esds' without DecoderSpecificInfo")
                    })?;
                    let mut config = AudioSpecificConfig::parse(&asc)?.audio_config();
                    config.config = asc;
                    config
                }
            }
        }
        b".mp3" => mp3_config(sample_rate, channels),
        b"alaw" => AudioConfig::g711(AudioCodec::Alaw, channels.max(1)),
        b"ulaw" => AudioConfig::g711(AudioCodec::Mulaw, channels.max(1)),
        other => {
            return Err(DemuxError::unsupported(
                "fmp4",
                format!("audio sample entry '{}'", fourcc_name(other)),
            ))
        }
    };
    Ok(TrackMedia::Audio {
        config: Arc::new(config),
    })
}

fn mp3_config(sample_rate: u32, channels: u8) -> AudioConfig {
    AudioConfig {
        codec: AudioCodec::Mp3,
        sample_rate,
        channels,
        object_type: 3,
        config: Bytes::new(),
    }
}

/// The parts of an ES_Descriptor the player needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsDescriptor {
    /// objectTypeIndication
    pub object_type: u8,
    /// DecoderSpecificInfo payload
    pub specific_info: Option<Bytes>,
}

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_TAG: u8 = 0x04;
const DECODER_SPECIFIC_TAG: u8 = 0x05;

fn read_descriptor_header(r: &mut ByteReader<'_>) -> Result<(u8, usize)> {
    let tag = r.read_u8()?;
    let mut len = 0usize;
    for _ in 0..4 {
        let b = r.read_u8()?;
        len = (len << 7) | (b & 0x7F) as usize;
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok((tag, len))
}

/// Parse an `esds` body down to the decoder configuration
pub fn parse_esds(body: &[u8]) -> Result<EsDescriptor> {
    let (_, _, mut r) = full_box(body)?;
    let (tag, len) = read_descriptor_header(&mut r)?;
    if tag != ES_DESCRIPTOR_TAG {
        return Err(DemuxError::malformed("fmp4", format!("esds starts with tag {tag}")));
    }
    let mut es = r.sub_reader(len.min(r.remaining()))?;
    es.skip(2)?;
    let flags = es.read_u8()?;
    if flags & 0x80 != 0 {
        es.skip(2)?;
    }
    if flags & 0x40 != 0 {
        let url_len = es.read_u8()? as usize;
        es.skip(url_len)?;
    }
    if flags & 0x20 != 0 {
        es.skip(2)?;
    }
    while es.remaining() > 0 {
        let (tag, len) = read_descriptor_header(&mut es)?;
        let mut descriptor = es.sub_reader(len.min(es.remaining()))?;
        if tag != DECODER_CONFIG_TAG {
            continue;
        }
        let object_type = descriptor.read_u8()?;
        descriptor.skip(12)?;
        let mut specific_info = None;
        while descriptor.remaining() > 0 {
            let (tag, len) = read_descriptor_header(&mut descriptor)?;
            let data = descriptor.read_bytes(len.min(descriptor.remaining()))?;
            if tag == DECODER_SPECIFIC_TAG {
                specific_info = Some(Bytes::copy_from_slice(data));
                break;
            }
        }
        return Ok(EsDescriptor {
            object_type,
            specific_info,
        });
    }
    Err(DemuxError::malformed("fmp4", "esds without DecoderConfigDescriptor"))
}
