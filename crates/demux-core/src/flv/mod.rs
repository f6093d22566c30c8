//! Flash video (FLV) demultiplexer
//!
//! Handles the legacy AVC/HEVC video tags, the enhanced-RTMP fourcc video
//! header, AAC, MP3 and G.711 audio tags, and `onMetaData` script tags.
//! Video payloads are re-framed to 4-byte NAL length prefixes; frames that
//! arrive before a sequence header are withheld.

pub mod amf;
pub mod tag;

use std::sync::Arc;

use bytes::Bytes;
use rplay_codec_core::audio::{AudioSpecificConfig, Mp3Header};
use rplay_codec_core::h26x::nal;
use rplay_codec_core::record::video_config_from_record;
use rplay_codec_core::{AudioCodec, AudioConfig, EncodedFrame, VideoCodec, VideoConfig};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::factory::ContainerKind;
use crate::pending::PendingBytes;
use crate::traits::{DemuxEvent, Demuxer, FrameSink, TrackInfo};
use tag::{
    tag_type, AudioPacket, FlvHeader, TagHeader, VideoPacket, FLV_HEADER_LEN,
    PREVIOUS_TAG_SIZE_LEN, TAG_HEADER_LEN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for the 9-byte file header
    Header,
    /// Skipping to `data_offset`
    Skip(usize),
    /// PreviousTagSize followed by a tag
    Tags,
}

#[derive(Debug, Clone)]
struct VideoTrack {
    config: Arc<VideoConfig>,
    length_size: u8,
}

/// Incremental FLV parser
pub struct FlvDemuxer {
    pending: PendingBytes,
    state: State,
    video: Option<VideoTrack>,
    audio: Option<Arc<AudioConfig>>,
    withheld_frames: u64,
    unsupported_warned: bool,
}

impl FlvDemuxer {
    /// Create a demuxer expecting a file header
    pub fn new() -> Self {
        Self {
            pending: PendingBytes::new(),
            state: State::Header,
            video: None,
            audio: None,
            withheld_frames: 0,
            unsupported_warned: false,
        }
    }

    /// Video frames dropped because no sequence header had been seen
    pub fn withheld_frames(&self) -> u64 {
        self.withheld_frames
    }

    fn parse(&mut self, sink: &mut dyn FrameSink) -> Result<()> {
        loop {
            match self.state {
                State::Header => {
                    if self.pending.len() < FLV_HEADER_LEN {
                        return Ok(());
                    }
                    let header = match FlvHeader::parse(self.pending.as_slice()) {
                        Ok(header) => header,
                        Err(e) => {
                            self.pending.clear();
                            return Err(e);
                        }
                    };
                    debug!(
                        "FLV header v{}: audio={} video={}",
                        header.version, header.has_audio, header.has_video
                    );
                    sink.on_event(DemuxEvent::TrackInfo(TrackInfo {
                        has_audio: header.has_audio,
                        has_video: header.has_video,
                    }));
                    self.pending.consume(FLV_HEADER_LEN);
                    self.state = State::Skip(header.data_offset as usize - FLV_HEADER_LEN);
                }
                State::Skip(remaining) => {
                    let n = remaining.min(self.pending.len());
                    self.pending.consume(n);
                    if n < remaining {
                        self.state = State::Skip(remaining - n);
                        return Ok(());
                    }
                    self.state = State::Tags;
                }
                State::Tags => {
                    let prefix = PREVIOUS_TAG_SIZE_LEN + TAG_HEADER_LEN;
                    if self.pending.len() < prefix {
                        return Ok(());
                    }
                    let header = TagHeader::parse(&self.pending.as_slice()[PREVIOUS_TAG_SIZE_LEN..prefix])?;
                    let total = prefix + header.data_size as usize;
                    if self.pending.len() < total {
                        return Ok(());
                    }
                    let unit = self.pending.take(total).freeze();
                    let body = unit.slice(prefix..);
                    self.handle_tag(&header, body, sink);
                }
            }
        }
    }

    fn handle_tag(&mut self, header: &TagHeader, body: Bytes, sink: &mut dyn FrameSink) {
        if header.filtered {
            trace!("FLV tag with filter bit set, treating body as clear");
        }
        match header.tag_type {
            tag_type::VIDEO => self.handle_video(header.timestamp, &body, sink),
            tag_type::AUDIO => self.handle_audio(header.timestamp, &body, sink),
            tag_type::SCRIPT => match amf::parse_metadata(&body) {
                Ok(Some(metadata)) => {
                    debug!("FLV onMetaData: {:?}", metadata);
                    sink.on_event(DemuxEvent::Metadata(metadata));
                }
                Ok(None) => trace!("Ignoring FLV script tag"),
                Err(e) => warn_skip(sink, format!("script tag at {} ms: {}", header.timestamp, e)),
            },
            other => warn_skip(
                sink,
                format!("unknown tag type {} ({} bytes)", other, header.data_size),
            ),
        }
    }

    fn handle_video(&mut self, timestamp: u32, body: &[u8], sink: &mut dyn FrameSink) {
        let packet = match tag::parse_video(body) {
            Ok(packet) => packet,
            Err(e) => return warn_skip(sink, format!("video tag at {timestamp} ms: {e}")),
        };
        match packet {
            VideoPacket::SequenceHeader { codec, record } => {
                match video_config_from_record(codec, record) {
                    Ok(parsed) => {
                        let changed = self
                            .video
                            .as_ref()
                            .map_or(true, |v| *v.config != parsed.config);
                        if changed {
                            debug!("FLV video configured: {}", parsed.config.describe());
                            let config = Arc::new(parsed.config);
                            sink.on_event(DemuxEvent::VideoConfig(config.clone()));
                            self.video = Some(VideoTrack {
                                config,
                                length_size: parsed.length_size,
                            });
                        } else if let Some(video) = &mut self.video {
                            video.length_size = parsed.length_size;
                        }
                    }
                    Err(e) => warn_skip(sink, format!("{} sequence header: {}", codec.name(), e)),
                }
            }
            VideoPacket::Frames {
                codec,
                keyframe,
                composition_time,
                data,
            } => {
                let Some(video) = &self.video else {
                    self.withheld_frames += 1;
                    trace!("Withholding {} frame before sequence header", codec.name());
                    return;
                };
                if video.config.codec != codec {
                    return warn_skip(
                        sink,
                        format!(
                            "{} frame on a {} stream",
                            codec.name(),
                            video.config.codec.name()
                        ),
                    );
                }
                let payload = match nal::normalize_length_size(data, video.length_size) {
                    Ok(payload) => payload,
                    Err(e) => return warn_skip(sink, format!("video frame at {timestamp} ms: {e}")),
                };
                if payload.is_empty() {
                    trace!("Skipping empty video frame at {} ms", timestamp);
                    return;
                }
                let dts = timestamp as u64;
                let pts = (dts as i64 + composition_time as i64).max(0) as u64;
                sink.on_frame(EncodedFrame::video(codec, payload, dts, pts, keyframe));
            }
            VideoPacket::EndOfSequence => debug!("FLV video end of sequence at {} ms", timestamp),
            VideoPacket::Ignored(what) => trace!("Ignoring FLV {}", what),
            VideoPacket::UnsupportedCodec(what) => self.warn_unsupported(sink, what),
        }
    }

    fn handle_audio(&mut self, timestamp: u32, body: &[u8], sink: &mut dyn FrameSink) {
        let packet = match tag::parse_audio(body) {
            Ok(packet) => packet,
            Err(e) => return warn_skip(sink, format!("audio tag at {timestamp} ms: {e}")),
        };
        let dts = timestamp as u64;
        match packet {
            AudioPacket::AacConfig(data) => match AudioSpecificConfig::parse(data) {
                Ok(asc) => {
                    let mut config = asc.audio_config();
                    // Keep the signalled bytes, they may carry extensions we do not rebuild
                    config.config = Bytes::copy_from_slice(data);
                    self.set_audio_config(config, sink);
                }
                Err(e) => warn_skip(sink, format!("AudioSpecificConfig: {e}")),
            },
            AudioPacket::AacFrame(data) => {
                if !matches!(&self.audio, Some(c) if c.codec == AudioCodec::Aac) {
                    trace!("Withholding AAC frame before AudioSpecificConfig");
                    return;
                }
                if !data.is_empty() {
                    let payload = Bytes::copy_from_slice(data);
                    sink.on_frame(EncodedFrame::audio(AudioCodec::Aac, payload, dts));
                }
            }
            AudioPacket::Mp3(data) => {
                if !matches!(&self.audio, Some(c) if c.codec == AudioCodec::Mp3) {
                    match Mp3Header::parse(data) {
                        Ok(header) => self.set_audio_config(header.audio_config(), sink),
                        Err(e) => return warn_skip(sink, format!("mp3 frame at {dts} ms: {e}")),
                    }
                }
                let payload = Bytes::copy_from_slice(data);
                sink.on_frame(EncodedFrame::audio(AudioCodec::Mp3, payload, dts));
            }
            AudioPacket::G711 {
                codec,
                channels,
                data,
            } => {
                self.set_audio_config(AudioConfig::g711(codec, channels), sink);
                if !data.is_empty() {
                    let payload = Bytes::copy_from_slice(data);
                    sink.on_frame(EncodedFrame::audio(codec, payload, dts));
                }
            }
            AudioPacket::Unsupported(format) => {
                self.warn_unsupported(sink, format!("flv sound format {format}"))
            }
        }
    }

    fn set_audio_config(&mut self, config: AudioConfig, sink: &mut dyn FrameSink) {
        if self.audio.as_deref() == Some(&config) {
            return;
        }
        debug!(
            "FLV audio configured: {} {} Hz x{}",
            config.codec.name(),
            config.sample_rate,
            config.channels
        );
        let config = Arc::new(config);
        sink.on_event(DemuxEvent::AudioConfig(config.clone()));
        self.audio = Some(config);
    }

    fn warn_unsupported(&mut self, sink: &mut dyn FrameSink, what: String) {
        if !self.unsupported_warned {
            self.unsupported_warned = true;
            warn_skip(sink, format!("unsupported {what}"));
        }
    }
}

fn warn_skip(sink: &mut dyn FrameSink, message: String) {
    warn!("Skipping FLV unit: {}", message);
    sink.on_event(DemuxEvent::Warning(message));
}

impl Default for FlvDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer for FlvDemuxer {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Flv
    }

    fn feed(&mut self, chunk: &[u8], sink: &mut dyn FrameSink) -> Result<()> {
        self.pending.append(chunk);
        self.parse(sink)?;
        self.pending.enforce_bound("flv", sink);
        Ok(())
    }

    fn flush(&mut self, _sink: &mut dyn FrameSink) -> Result<()> {
        if !self.pending.is_empty() {
            trace!("FLV flush leaves {} trailing bytes", self.pending.len());
        }
        Ok(())
    }

    fn reset(&mut self, full: bool) {
        self.pending.clear();
        self.state = State::Header;
        if full {
            self.video = None;
            self.audio = None;
            self.unsupported_warned = false;
        }
    }

    fn buffered_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FlvWriter};
    use crate::traits::CollectingSink;

    fn demux(stream: &[u8]) -> CollectingSink {
        let mut sink = CollectingSink::new();
        let mut demuxer = FlvDemuxer::new();
        demuxer.feed(stream, &mut sink).unwrap();
        demuxer.flush(&mut sink).unwrap();
        sink
    }

    #[test]
    fn test_chunk_larger_than_bound_of_complete_tags() {
        let filler = vec![0x41u8; 12 * 1024 * 1024];
        let mut w = FlvWriter::new(false, true);
        w.avc_sequence_header(0, &testing::avc_record(4));
        for i in 0..3 {
            w.avc_frame(i * 40, 0, false, &[&filler], 4);
        }
        let stream = w.finish();
        assert!(stream.len() > crate::pending::MAX_PENDING_BYTES);

        let sink = demux(&stream);
        assert!(sink.warnings().is_empty(), "{:?}", sink.warnings());
        assert_eq!(sink.video_frames().count(), 3);
    }

    #[test]
    fn test_avc_stream() {
        let mut w = FlvWriter::new(true, true);
        w.avc_sequence_header(0, &testing::avc_record(4));
        w.avc_frame(0, 0, true, &[testing::AVC_IDR_SLICE], 4);
        w.avc_frame(40, 80, false, &[testing::AVC_P_SLICE], 4);
        let sink = demux(&w.finish());

        assert_eq!(
            sink.events[0],
            DemuxEvent::TrackInfo(TrackInfo {
                has_audio: true,
                has_video: true
            })
        );
        let config = sink.video_config().unwrap();
        assert_eq!((config.width, config.height), (640, 480));

        let frames: Vec<_> = sink.video_frames().collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_keyframe);
        assert_eq!(&frames[0].payload[..4], &[0, 0, 0, testing::AVC_IDR_SLICE.len() as u8]);
        assert_eq!((frames[1].dts, frames[1].pts), (40, 120));
        assert!(!frames[1].is_keyframe);
    }

    #[test]
    fn test_short_length_prefixes_are_normalized() {
        let mut w = FlvWriter::new(false, true);
        w.avc_sequence_header(0, &testing::avc_record(2));
        w.avc_frame(0, 0, true, &[testing::AVC_IDR_SLICE, testing::AVC_IDR_SLICE], 2);
        let sink = demux(&w.finish());
        let frame = sink.video_frames().next().unwrap();
        let nals: Vec<_> = nal::iter_length_prefixed(&frame.payload, 4)
            .unwrap()
            .map(|n| n.unwrap().to_vec())
            .collect();
        assert_eq!(nals, vec![testing::AVC_IDR_SLICE.to_vec(); 2]);
    }

    #[test]
    fn test_frames_before_sequence_header_are_withheld() {
        let mut w = FlvWriter::new(false, true);
        w.avc_frame(0, 0, true, &[testing::AVC_IDR_SLICE], 4);
        w.avc_sequence_header(40, &testing::avc_record(4));
        w.avc_frame(40, 0, true, &[testing::AVC_IDR_SLICE], 4);
        let mut sink = CollectingSink::new();
        let mut demuxer = FlvDemuxer::new();
        demuxer.feed(&w.finish(), &mut sink).unwrap();
        assert_eq!(demuxer.withheld_frames(), 1);
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].dts, 40);
    }

    #[test]
    fn test_enhanced_hevc_stream() {
        let mut w = FlvWriter::new(false, true);
        w.enhanced_sequence_start(0, b"hvc1", &testing::hevc_record());
        w.enhanced_frames(0, b"hvc1", true, Some(0), &[testing::HEVC_IDR_SLICE]);
        w.enhanced_frames(33, b"hvc1", false, None, &[testing::HEVC_TRAIL_SLICE]);
        let sink = demux(&w.finish());
        let config = sink.video_config().unwrap();
        assert_eq!(config.codec, VideoCodec::H265);
        assert_eq!((config.width, config.height), (1920, 1080));
        let frames: Vec<_> = sink.video_frames().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].pts, 33);
    }

    #[test]
    fn test_audio_formats() {
        let mut w = FlvWriter::new(true, false);
        w.aac_config(0, &[0x12, 0x10]);
        w.aac_frame(0, &[0x21, 0x10]);
        w.aac_frame(23, &[0x21, 0x11]);
        let sink = demux(&w.finish());
        let config = sink.audio_config().unwrap();
        assert_eq!((config.sample_rate, config.channels), (44100, 2));
        let frames: Vec<_> = sink.audio_frames().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].dts, 23);

        let mut w = FlvWriter::new(true, false);
        w.g711(0, 0x72, &[0xD5; 160]);
        w.g711(20, 0x72, &[0xD5; 160]);
        let sink = demux(&w.finish());
        let config = sink.audio_config().unwrap();
        assert_eq!(config.codec, AudioCodec::Alaw);
        assert_eq!(config.sample_rate, 8000);
        // Repeated identical configs are announced once
        let announced = sink
            .events
            .iter()
            .filter(|e| matches!(e, DemuxEvent::AudioConfig(_)))
            .count();
        assert_eq!(announced, 1);
        assert_eq!(sink.audio_frames().count(), 2);
    }

    #[test]
    fn test_metadata_and_unknown_tags() {
        let mut w = FlvWriter::new(true, true);
        w.metadata(&[("width", testing::amf::number(640.0))]);
        w.raw_tag(0x0F, 0, &[1, 2, 3]);
        w.aac_config(0, &[0x12, 0x10]);
        let sink = demux(&w.finish());
        assert!(sink
            .events
            .iter()
            .any(|e| matches!(e, DemuxEvent::Metadata(m) if m.width == Some(640.0))));
        assert_eq!(sink.warnings().len(), 1);
        assert!(sink.audio_config().is_some());
    }

    #[test]
    fn test_invalid_signature() {
        let mut sink = CollectingSink::new();
        let mut demuxer = FlvDemuxer::new();
        assert!(demuxer.feed(b"GIF89a\x00\x00\x00\x00", &mut sink).is_err());
        assert_eq!(demuxer.buffered_len(), 0);
    }

    #[test]
    fn test_reset_keeps_configuration_unless_full() {
        let mut w = FlvWriter::new(false, true);
        w.avc_sequence_header(0, &testing::avc_record(4));
        let init = w.finish();

        let mut w = FlvWriter::new(false, true);
        w.avc_frame(80, 0, true, &[testing::AVC_IDR_SLICE], 4);
        let frames_only = w.finish();

        let mut sink = CollectingSink::new();
        let mut demuxer = FlvDemuxer::new();
        demuxer.feed(&init, &mut sink).unwrap();
        demuxer.reset(false);
        demuxer.feed(&frames_only, &mut sink).unwrap();
        assert_eq!(sink.frames.len(), 1);

        demuxer.reset(true);
        demuxer.feed(&frames_only, &mut sink).unwrap();
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(demuxer.withheld_frames(), 1);
    }
}
