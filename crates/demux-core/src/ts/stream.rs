//! Elementary stream handlers for transport stream PES payloads

use std::sync::Arc;

use bytes::Bytes;
use rplay_codec_core::audio::{AdtsReader, AudioFrameReader, LoasReader, Mp3Reader, ParseStatus};
use rplay_codec_core::h26x::nal;
use rplay_codec_core::record::video_config;
use rplay_codec_core::{
    AudioCodec, AudioConfig, EncodedFrame, NalKind, ParameterSets, VideoCodec, VideoConfig,
};
use tracing::{debug, trace, warn};

use crate::traits::{DemuxEvent, FrameSink};

/// How an audio elementary stream is framed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFraming {
    /// AAC in ADTS
    Adts,
    /// AAC in LOAS/LATM
    Latm,
    /// MPEG audio layers I-III
    Mpeg,
    /// G.711 A-law, one PES per frame
    Alaw,
    /// AC-3: recognized but not emitted
    Ac3,
}

/// In-band parameter set tracking and access unit emission for H.264/H.265
#[derive(Debug)]
pub struct VideoStream {
    codec: VideoCodec,
    sets: ParameterSets,
    config: Option<Arc<VideoConfig>>,
    dropped_before_config: u64,
}

impl VideoStream {
    /// Create a handler for the given codec
    pub fn new(codec: VideoCodec) -> Self {
        Self {
            codec,
            sets: ParameterSets::default(),
            config: None,
            dropped_before_config: 0,
        }
    }

    /// Codec of the stream
    pub fn codec(&self) -> VideoCodec {
        self.codec
    }

    /// Access units dropped while no configuration was known
    pub fn dropped_before_config(&self) -> u64 {
        self.dropped_before_config
    }

    /// Process one PES payload holding an Annex-B access unit
    pub fn handle(
        &mut self,
        payload: &[u8],
        dts: u64,
        pts: u64,
        random_access: bool,
        sink: &mut dyn FrameSink,
    ) {
        let mut nals = Vec::new();
        let mut has_slice = false;
        let mut keyframe = false;
        let mut sets_changed = false;
        for unit in nal::split_annex_b(payload) {
            let kind = NalKind::classify(self.codec, unit);
            match kind {
                NalKind::Aud => continue,
                NalKind::Vps | NalKind::Sps | NalKind::Pps => {
                    sets_changed |= self.update_parameter_set(kind, unit);
                }
                NalKind::Slice { keyframe: key, .. } => {
                    has_slice = true;
                    keyframe |= key;
                }
                _ => {}
            }
            nals.push(unit);
        }

        if sets_changed && self.sets.is_complete(self.codec) {
            match video_config(self.codec, self.sets.clone()) {
                Ok(config) => {
                    debug!("TS video configured: {}", config.describe());
                    let config = Arc::new(config);
                    sink.on_event(DemuxEvent::VideoConfig(config.clone()));
                    self.config = Some(config);
                }
                Err(e) => {
                    warn!("Unusable {} parameter sets: {}", self.codec.name(), e);
                    sink.on_event(DemuxEvent::Warning(format!(
                        "{} parameter sets: {}",
                        self.codec.name(),
                        e
                    )));
                }
            }
        }

        if !has_slice {
            trace!("TS video PES without slice data at {} ms", dts);
            return;
        }
        if self.config.is_none() {
            self.dropped_before_config += 1;
            trace!("Dropping {} access unit before configuration", self.codec.name());
            return;
        }
        let frame = EncodedFrame::video(
            self.codec,
            nal::to_length_prefixed(nals),
            dts,
            pts,
            keyframe || random_access,
        );
        sink.on_frame(frame);
    }

    fn update_parameter_set(&mut self, kind: NalKind, unit: &[u8]) -> bool {
        let list = match kind {
            NalKind::Vps => &mut self.sets.vps,
            NalKind::Sps => &mut self.sets.sps,
            _ => &mut self.sets.pps,
        };
        if list.len() == 1 && list[0][..] == *unit {
            return false;
        }
        *list = vec![Bytes::copy_from_slice(unit)];
        true
    }

    /// Forget cached parameter sets and configuration
    pub fn reset(&mut self) {
        self.sets.clear();
        self.config = None;
    }
}

/// Audio frame extraction with carry-over across PES packets
pub struct AudioStream {
    framing: AudioFraming,
    reader: Option<Box<dyn AudioFrameReader>>,
    config: Option<Arc<AudioConfig>>,
    next_ts: Option<f64>,
    ac3_warned: bool,
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("framing", &self.framing)
            .field("config", &self.config)
            .field("next_ts", &self.next_ts)
            .finish()
    }
}

impl AudioStream {
    /// Create a handler for the given framing
    pub fn new(framing: AudioFraming) -> Self {
        let reader: Option<Box<dyn AudioFrameReader>> = match framing {
            AudioFraming::Adts => Some(Box::new(AdtsReader::new())),
            AudioFraming::Latm => Some(Box::new(LoasReader::new())),
            AudioFraming::Mpeg => Some(Box::new(Mp3Reader::new())),
            AudioFraming::Alaw | AudioFraming::Ac3 => None,
        };
        Self {
            framing,
            reader,
            config: None,
            next_ts: None,
            ac3_warned: false,
        }
    }

    /// Framing of the stream
    pub fn framing(&self) -> AudioFraming {
        self.framing
    }

    /// Whether the stream produces frames at all
    pub fn is_emitting(&self) -> bool {
        self.framing != AudioFraming::Ac3
    }

    /// Process one PES payload
    pub fn handle(&mut self, payload: &[u8], pts: Option<u64>, sink: &mut dyn FrameSink) {
        match self.framing {
            AudioFraming::Ac3 => {
                if !self.ac3_warned {
                    self.ac3_warned = true;
                    warn!("AC-3 audio is not supported, its frames are dropped");
                    sink.on_event(DemuxEvent::Warning("AC-3 audio not supported".into()));
                }
            }
            AudioFraming::Alaw => {
                if payload.is_empty() {
                    return;
                }
                self.set_config(AudioConfig::g711(AudioCodec::Alaw, 1), sink);
                let ts = pts.or(self.next_ts.map(|t| t.round() as u64)).unwrap_or(0);
                // 8 kHz mono, one byte per sample
                self.next_ts = Some(ts as f64 + payload.len() as f64 / 8.0);
                let frame = EncodedFrame::audio(AudioCodec::Alaw, Bytes::copy_from_slice(payload), ts);
                sink.on_frame(frame);
            }
            AudioFraming::Adts | AudioFraming::Latm | AudioFraming::Mpeg => {
                self.read_frames(payload, pts, sink)
            }
        }
    }

    fn read_frames(&mut self, payload: &[u8], pts: Option<u64>, sink: &mut dyn FrameSink) {
        let Some(reader) = self.reader.as_mut() else {
            return;
        };
        let carried = reader.buffered() > 0;
        reader.push(payload);
        // A frame completed from carried bytes continues the previous timeline
        let mut ts = match (carried, self.next_ts, pts) {
            (true, Some(next), _) => next,
            (_, _, Some(pts)) => pts as f64,
            (_, Some(next), None) => next,
            (_, None, None) => 0.0,
        };
        let mut frames = Vec::new();
        while let ParseStatus::Ready(frame) = reader.next_frame() {
            let start = ts;
            ts += frame.duration_ms();
            frames.push((start, frame));
        }
        self.next_ts = Some(ts);
        for (start, frame) in frames {
            self.set_config(frame.config, sink);
            let codec = self.config.as_ref().map_or(AudioCodec::Aac, |c| c.codec);
            sink.on_frame(EncodedFrame::audio(codec, frame.payload, start.round() as u64));
        }
    }

    fn set_config(&mut self, config: AudioConfig, sink: &mut dyn FrameSink) {
        if self.config.as_deref() == Some(&config) {
            return;
        }
        debug!(
            "TS audio configured: {} {} Hz x{}",
            config.codec.name(),
            config.sample_rate,
            config.channels
        );
        let config = Arc::new(config);
        sink.on_event(DemuxEvent::AudioConfig(config.clone()));
        self.config = Some(config);
    }

    /// Drop buffered bytes; `full` also forgets the configuration
    pub fn reset(&mut self, full: bool) {
        if let Some(reader) = self.reader.as_mut() {
            reader.clear();
        }
        self.next_ts = None;
        if full {
            self.config = None;
        }
    }
}
