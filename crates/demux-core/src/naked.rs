//! Raw Annex-B elementary stream ("naked flow") demultiplexer
//!
//! The stream carries no container timing, so access units are stamped at
//! a nominal frame rate. The codec is either configured or recognized from
//! the first parameter set NAL.

use std::sync::Arc;

use bytes::Bytes;
use rplay_codec_core::h26x::{self, nal};
use rplay_codec_core::record::video_config;
use rplay_codec_core::{EncodedFrame, NalKind, ParameterSets, VideoCodec, VideoConfig};
use tracing::{debug, trace, warn};

use crate::error::{DemuxError, Result};
use crate::factory::ContainerKind;
use crate::pending::PendingBytes;
use crate::traits::{DemuxEvent, Demuxer, FrameSink};

/// Frame rate used when none is configured
pub const DEFAULT_FPS: f64 = 25.0;

/// NAL bytes needed to tell whether a slice starts a picture
const HEAD_LEN: usize = 3;

#[derive(Debug, Default)]
struct AccessUnit {
    nals: Vec<Bytes>,
    has_vcl: bool,
    keyframe: bool,
}

/// Incremental Annex-B parser with synthetic timestamps
#[derive(Debug)]
pub struct NakedFlowDemuxer {
    pending: PendingBytes,
    /// Offset of the current NAL body within `pending`, once a start code was seen
    body_start: Option<usize>,
    /// The current NAL's header already closed the previous access unit
    head_seen: bool,
    scan_from: usize,
    configured_codec: Option<VideoCodec>,
    codec: Option<VideoCodec>,
    fps: f64,
    sets: ParameterSets,
    config: Option<Arc<VideoConfig>>,
    au: AccessUnit,
    frame_count: u64,
    dropped_before_config: u64,
}

impl NakedFlowDemuxer {
    /// Create a demuxer. `codec` of `None` enables detection; `fps` must be positive
    pub fn new(codec: Option<VideoCodec>, fps: f64) -> Result<Self> {
        if let Some(VideoCodec::Mpeg4) = codec {
            return Err(DemuxError::invalid_config(
                "naked flow carries H.264 or H.265 only",
            ));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(DemuxError::invalid_config(format!("frame rate {fps}")));
        }
        Ok(Self {
            pending: PendingBytes::new(),
            body_start: None,
            head_seen: false,
            scan_from: 0,
            configured_codec: codec,
            codec,
            fps,
            sets: ParameterSets::default(),
            config: None,
            au: AccessUnit::default(),
            frame_count: 0,
            dropped_before_config: 0,
        })
    }

    /// Codec in use, once known
    pub fn codec(&self) -> Option<VideoCodec> {
        self.codec
    }

    /// Access units dropped because no complete parameter set was known
    pub fn dropped_before_config(&self) -> u64 {
        self.dropped_before_config
    }

    fn parse(&mut self, sink: &mut dyn FrameSink) {
        loop {
            let data = self.pending.as_slice();
            let body_start = match self.body_start {
                Some(start) => start,
                None => match nal::find_start_code(data, 0) {
                    Some((pos, len)) => {
                        if pos > 0 {
                            trace!("Discarding {} bytes before the first start code", pos);
                        }
                        self.pending.consume(pos);
                        self.body_start = Some(len);
                        self.head_seen = false;
                        continue;
                    }
                    None => {
                        // A start code may straddle the chunk boundary
                        let garbage = data.len().saturating_sub(3);
                        self.pending.consume(garbage);
                        return;
                    }
                },
            };
            if !self.head_seen && data.len() >= body_start + HEAD_LEN + 2 {
                self.head_seen = true;
                let window = &data[body_start..body_start + HEAD_LEN + 2];
                // Shorter NAL units are classified once complete
                if nal::find_start_code(window, 0).map_or(true, |(pos, _)| pos >= HEAD_LEN) {
                    let mut head = [0u8; HEAD_LEN];
                    head.copy_from_slice(&window[..HEAD_LEN]);
                    self.begin_nal(&head, sink);
                }
                continue;
            }
            let from = body_start.max(self.scan_from);
            match nal::find_start_code(data, from) {
                Some((pos, len)) => {
                    let unit = self.pending.take(pos).freeze().slice(body_start..);
                    self.body_start = Some(len);
                    self.head_seen = false;
                    self.scan_from = 0;
                    self.handle_nal(trim_trailing_zeros(unit), sink);
                }
                None => {
                    self.scan_from = data.len().saturating_sub(3).max(body_start);
                    return;
                }
            }
        }
    }

    /// Close the pending access unit as soon as the next one's first NAL header is buffered
    fn begin_nal(&mut self, head: &[u8], sink: &mut dyn FrameSink) {
        let Some(codec) = self.detect_codec(head[0]) else {
            return;
        };
        let kind = NalKind::classify(codec, head);
        if starts_picture(kind) && self.au.has_vcl {
            self.finish_access_unit(sink);
        }
    }

    fn detect_codec(&mut self, header: u8) -> Option<VideoCodec> {
        if self.codec.is_none() {
            let codec = h26x::detect_codec(header)?;
            debug!("Naked flow codec detected: {}", codec.name());
            self.codec = Some(codec);
        }
        self.codec
    }

    fn handle_nal(&mut self, unit: Bytes, sink: &mut dyn FrameSink) {
        let Some(&header) = unit.first() else {
            return;
        };
        let Some(codec) = self.detect_codec(header) else {
            trace!("Dropping NAL 0x{:02x} before codec detection", header);
            return;
        };

        let kind = NalKind::classify(codec, &unit);
        if starts_picture(kind) && self.au.has_vcl {
            self.finish_access_unit(sink);
        }

        match kind {
            NalKind::Aud => return,
            NalKind::Vps | NalKind::Sps | NalKind::Pps => {
                if self.update_parameter_set(kind, &unit) && self.sets.is_complete(codec) {
                    self.configure(codec, sink);
                }
            }
            NalKind::Slice { keyframe, .. } => {
                self.au.has_vcl = true;
                self.au.keyframe |= keyframe;
            }
            _ => {}
        }
        self.au.nals.push(unit);
    }

    fn update_parameter_set(&mut self, kind: NalKind, unit: &Bytes) -> bool {
        let list = match kind {
            NalKind::Vps => &mut self.sets.vps,
            NalKind::Sps => &mut self.sets.sps,
            _ => &mut self.sets.pps,
        };
        if list.len() == 1 && list[0] == *unit {
            return false;
        }
        *list = vec![unit.clone()];
        true
    }

    fn configure(&mut self, codec: VideoCodec, sink: &mut dyn FrameSink) {
        match video_config(codec, self.sets.clone()) {
            Ok(config) => {
                debug!("Naked flow configured: {}", config.describe());
                let config = Arc::new(config);
                sink.on_event(DemuxEvent::VideoConfig(config.clone()));
                self.config = Some(config);
            }
            Err(e) => {
                warn!("Unusable {} parameter sets: {}", codec.name(), e);
                sink.on_event(DemuxEvent::Warning(format!("{} parameter sets: {}", codec.name(), e)));
            }
        }
    }

    fn finish_access_unit(&mut self, sink: &mut dyn FrameSink) {
        let au = std::mem::take(&mut self.au);
        if !au.has_vcl {
            return;
        }
        let (Some(codec), Some(_)) = (self.codec, &self.config) else {
            self.dropped_before_config += 1;
            trace!("Dropping access unit before configuration");
            return;
        };
        let ts = (self.frame_count as f64 * 1000.0 / self.fps).round() as u64;
        self.frame_count += 1;
        let payload = nal::to_length_prefixed(au.nals.iter().map(|n| &n[..]));
        sink.on_frame(EncodedFrame::video(codec, payload, ts, ts, au.keyframe));
    }
}

fn starts_picture(kind: NalKind) -> bool {
    match kind {
        NalKind::Slice { first, .. } => first,
        NalKind::Aud | NalKind::Sei | NalKind::Vps | NalKind::Sps | NalKind::Pps => true,
        _ => false,
    }
}

fn trim_trailing_zeros(unit: Bytes) -> Bytes {
    let end = unit.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    unit.slice(..end)
}

impl Demuxer for NakedFlowDemuxer {
    fn kind(&self) -> ContainerKind {
        ContainerKind::NakedFlow
    }

    fn feed(&mut self, chunk: &[u8], sink: &mut dyn FrameSink) -> Result<()> {
        self.pending.append(chunk);
        self.parse(sink);
        if self.pending.enforce_bound("naked_flow", sink) {
            // The NAL in progress is gone
            self.body_start = None;
            self.head_seen = false;
            self.scan_from = 0;
        }
        Ok(())
    }

    fn flush(&mut self, sink: &mut dyn FrameSink) -> Result<()> {
        self.head_seen = false;
        if let Some(body_start) = self.body_start.take() {
            let len = self.pending.len();
            let unit = self.pending.take(len).freeze();
            if body_start < unit.len() {
                self.handle_nal(trim_trailing_zeros(unit.slice(body_start..)), sink);
            }
        }
        self.scan_from = 0;
        self.finish_access_unit(sink);
        Ok(())
    }

    fn reset(&mut self, full: bool) {
        self.pending.clear();
        self.body_start = None;
        self.head_seen = false;
        self.scan_from = 0;
        self.au = AccessUnit::default();
        if full {
            self.codec = self.configured_codec;
            self.sets.clear();
            self.config = None;
            self.frame_count = 0;
        }
    }

    fn buffered_len(&self) -> usize {
        self.pending.len()
    }
}
