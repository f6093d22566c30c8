//! MPEG-4 Part 2 visual elementary stream demultiplexer
//!
//! Splits the stream at `00 00 01 xx` start codes. Header segments (VOS, VO,
//! VOL, GOV, user data) travel with the VOP that follows them, so every
//! emitted frame is decodable on its own once a VOL has been seen.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use rplay_codec_core::h26x::nal;
use rplay_codec_core::mpeg4::{self, VolHeader, VopType};
use rplay_codec_core::{EncodedFrame, VideoCodec, VideoConfig};
use tracing::{debug, trace, warn};

use crate::error::{DemuxError, Result};
use crate::factory::ContainerKind;
use crate::pending::PendingBytes;
use crate::traits::{DemuxEvent, Demuxer, FrameSink};

const PREFIX_LEN: usize = 3;
/// visual_object_start_code suffix
const VO_START: u8 = 0xB5;

/// Incremental MPEG-4 visual parser with synthetic timestamps
#[derive(Debug)]
pub struct Mpeg4Demuxer {
    pending: PendingBytes,
    in_segment: bool,
    scan_from: usize,
    fps: f64,
    profile_level: u8,
    /// Segments waiting to be prepended to the next VOP
    headers: BytesMut,
    /// VOS/VO/VOL bytes of the current configuration
    config_bytes: BytesMut,
    config: Option<Arc<VideoConfig>>,
    frame_count: u64,
    dropped_before_config: u64,
}

/// Locate the next `00 00 01` prefix at or after `from`
fn find_prefix(data: &[u8], from: usize) -> Option<usize> {
    nal::find_start_code(data, from).map(|(pos, len)| pos + len - PREFIX_LEN)
}

impl Mpeg4Demuxer {
    /// Create a demuxer stamping frames at `fps`
    pub fn new(fps: f64) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(DemuxError::invalid_config(format!("frame rate {fps}")));
        }
        Ok(Self {
            pending: PendingBytes::new(),
            in_segment: false,
            scan_from: 0,
            fps,
            profile_level: 0,
            headers: BytesMut::new(),
            config_bytes: BytesMut::new(),
            config: None,
            frame_count: 0,
            dropped_before_config: 0,
        })
    }

    /// VOPs dropped because no VOL header had been seen
    pub fn dropped_before_config(&self) -> u64 {
        self.dropped_before_config
    }

    fn parse(&mut self, sink: &mut dyn FrameSink) {
        loop {
            let data = self.pending.as_slice();
            if !self.in_segment {
                match find_prefix(data, 0) {
                    Some(pos) => {
                        self.pending.consume(pos);
                        self.in_segment = true;
                        continue;
                    }
                    None => {
                        let garbage = data.len().saturating_sub(PREFIX_LEN - 1);
                        self.pending.consume(garbage);
                        return;
                    }
                }
            }
            let from = PREFIX_LEN.max(self.scan_from);
            match find_prefix(data, from) {
                Some(pos) => {
                    let segment = self.pending.take(pos).freeze();
                    self.scan_from = 0;
                    self.handle_segment(segment, sink);
                }
                None => {
                    self.scan_from = data.len().saturating_sub(PREFIX_LEN - 1).max(PREFIX_LEN);
                    return;
                }
            }
        }
    }

    fn handle_segment(&mut self, segment: Bytes, sink: &mut dyn FrameSink) {
        let Some(&code) = segment.get(PREFIX_LEN) else {
            return;
        };
        match code {
            mpeg4::VOP_START => self.handle_vop(segment, sink),
            mpeg4::VOS_START => {
                self.profile_level = segment.get(PREFIX_LEN + 1).copied().unwrap_or(0);
                self.config_bytes.clear();
                self.config_bytes.extend_from_slice(&segment);
                self.headers.extend_from_slice(&segment);
            }
            code if code == VO_START || code < 0x20 => {
                self.config_bytes.extend_from_slice(&segment);
                self.headers.extend_from_slice(&segment);
            }
            code if mpeg4::is_vol_start(code) => {
                self.config_bytes.extend_from_slice(&segment);
                self.headers.extend_from_slice(&segment);
                match VolHeader::parse(&segment[PREFIX_LEN + 1..]) {
                    Ok(vol) => self.configure(&vol, sink),
                    Err(e) => {
                        warn!("Unusable MPEG-4 VOL header: {}", e);
                        sink.on_event(DemuxEvent::Warning(format!("VOL header: {e}")));
                    }
                }
            }
            _ => {
                trace!("MPEG-4 header segment 0x{:02x} ({} bytes)", code, segment.len());
                self.headers.extend_from_slice(&segment);
            }
        }
    }

    fn configure(&mut self, vol: &VolHeader, sink: &mut dyn FrameSink) {
        let config = vol.video_config(self.profile_level, Bytes::copy_from_slice(&self.config_bytes));
        if self.config.as_deref() == Some(&config) {
            return;
        }
        debug!(
            "MPEG-4 visual configured: {} (object type {})",
            config.describe(),
            vol.object_type
        );
        let config = Arc::new(config);
        sink.on_event(DemuxEvent::VideoConfig(config.clone()));
        self.config = Some(config);
    }

    fn handle_vop(&mut self, segment: Bytes, sink: &mut dyn FrameSink) {
        let headers = self.headers.split();
        self.config_bytes.clear();
        let Some(&coding) = segment.get(PREFIX_LEN + 1) else {
            warn!("Truncated MPEG-4 VOP");
            sink.on_event(DemuxEvent::Warning("truncated VOP".into()));
            return;
        };
        if self.config.is_none() {
            self.dropped_before_config += 1;
            trace!("Dropping VOP before VOL header");
            return;
        }
        let keyframe = VopType::from_byte(coding) == VopType::I;
        let mut payload = headers;
        payload.extend_from_slice(&segment);
        let ts = (self.frame_count as f64 * 1000.0 / self.fps).round() as u64;
        self.frame_count += 1;
        sink.on_frame(EncodedFrame::video(
            VideoCodec::Mpeg4,
            payload.freeze(),
            ts,
            ts,
            keyframe,
        ));
    }
}

impl Demuxer for Mpeg4Demuxer {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Mpeg4
    }

    fn feed(&mut self, chunk: &[u8], sink: &mut dyn FrameSink) -> Result<()> {
        self.pending.append(chunk);
        self.parse(sink);
        if self.pending.enforce_bound("mpeg4", sink) {
            self.in_segment = false;
            self.scan_from = 0;
        }
        Ok(())
    }

    fn flush(&mut self, sink: &mut dyn FrameSink) -> Result<()> {
        if self.in_segment {
            let len = self.pending.len();
            let segment = self.pending.take(len).freeze();
            self.handle_segment(segment, sink);
        }
        self.in_segment = false;
        self.scan_from = 0;
        Ok(())
    }

    fn reset(&mut self, full: bool) {
        self.pending.clear();
        self.in_segment = false;
        self.scan_from = 0;
        self.headers.clear();
        self.config_bytes.clear();
        if full {
            self.profile_level = 0;
            self.config = None;
            self.frame_count = 0;
        }
    }

    fn buffered_len(&self) -> usize {
        self.pending.len() + self.headers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mpeg4 as m4;
    use crate::traits::CollectingSink;

    fn stream() -> Vec<u8> {
        let mut data = vec![0x12, 0x34];
        data.extend(m4::vos(0x03));
        data.extend(m4::vo());
        data.extend(m4::vol(352, 288, 25, 1));
        data.extend(m4::vop(VopType::I, &[0x11; 40]));
        data.extend(m4::vop(VopType::P, &[0x22; 20]));
        data.extend(m4::gov());
        data.extend(m4::vop(VopType::I, &[0x33; 30]));
        data
    }

    #[test]
    fn test_vops_carry_headers_and_config() {
        let mut demuxer = Mpeg4Demuxer::new(25.0).unwrap();
        let mut sink = CollectingSink::new();
        demuxer.feed(&stream(), &mut sink).unwrap();
        demuxer.flush(&mut sink).unwrap();

        let config = sink.video_config().unwrap();
        assert_eq!(config.codec, VideoCodec::Mpeg4);
        assert_eq!((config.width, config.height), (352, 288));
        assert_eq!(config.profile, 0x03);
        assert_eq!(config.frame_rate, Some(25.0));
        let expected_record: Vec<u8> = [m4::vos(0x03), m4::vo(), m4::vol(352, 288, 25, 1)].concat();
        assert_eq!(&config.record[..], &expected_record[..]);

        let frames: Vec<_> = sink.video_frames().collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames.iter().map(|f| (f.dts, f.is_keyframe)).collect::<Vec<_>>(),
            vec![(0, true), (40, false), (80, true)]
        );
        assert!(frames[0].payload.starts_with(&m4::vos(0x03)));
        assert_eq!(&frames[1].payload[..], &m4::vop(VopType::P, &[0x22; 20])[..]);
        assert!(frames[2].payload.starts_with(&m4::gov()));
    }

    #[test]
    fn test_vops_before_vol_are_dropped() {
        let mut data = m4::vop(VopType::I, &[0x11; 8]);
        data.extend(m4::vol(176, 144, 30, 1));
        data.extend(m4::vop(VopType::I, &[0x11; 8]));
        let mut demuxer = Mpeg4Demuxer::new(30.0).unwrap();
        let mut sink = CollectingSink::new();
        demuxer.feed(&data, &mut sink).unwrap();
        demuxer.flush(&mut sink).unwrap();
        assert_eq!(demuxer.dropped_before_config(), 1);
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.video_config().unwrap().profile, 0);
    }

    #[test]
    fn test_byte_at_a_time_matches_whole_feed() {
        let data = stream();
        let mut whole = CollectingSink::new();
        let mut demuxer = Mpeg4Demuxer::new(25.0).unwrap();
        demuxer.feed(&data, &mut whole).unwrap();
        demuxer.flush(&mut whole).unwrap();

        let mut split = CollectingSink::new();
        let mut demuxer = Mpeg4Demuxer::new(25.0).unwrap();
        for b in &data {
            demuxer.feed(std::slice::from_ref(b), &mut split).unwrap();
        }
        demuxer.flush(&mut split).unwrap();
        assert_eq!(whole.frames, split.frames);
        assert_eq!(whole.events, split.events);
    }
}
