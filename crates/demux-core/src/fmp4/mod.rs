//! Fragmented ISO base media (fMP4) demultiplexer
//!
//! Top-level boxes are buffered until complete. The `moov` declares tracks
//! and their configurations; each `moof` resolves its track runs into sample
//! positions that the following `mdat` is sliced against. An optional
//! [`Descrambler`] reverses transport scrambling before any box is read.

pub mod boxes;
pub mod descramble;
pub mod moof;
pub mod moov;

use bytes::Bytes;
use rplay_codec_core::h26x::nal;
use rplay_codec_core::EncodedFrame;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::factory::ContainerKind;
use crate::pending::{PendingBytes, MAX_PENDING_BYTES};
use crate::traits::{DemuxEvent, Demuxer, FrameSink, TrackInfo};
use boxes::{fourcc_name, BoxHeader};
pub use descramble::{Descrambler, XorDescrambler};
use moof::TrackFragment;
use moov::{Track, TrackMedia, SAMPLE_IS_NON_SYNC};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Boxes,
    /// Streaming past an oversized box
    Skip(u64),
}

#[derive(Debug)]
struct TrackState {
    track: Track,
    next_decode_time: u64,
}

/// A sample located by a `moof`, waiting for its `mdat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SampleRef {
    offset: u64,
    size: u32,
    track: usize,
    dts: u64,
    pts: u64,
    keyframe: bool,
}

/// Incremental fragmented MP4 parser
pub struct Fmp4Demuxer {
    pending: PendingBytes,
    state: State,
    descrambler: Option<Box<dyn Descrambler>>,
    tracks: Vec<TrackState>,
    samples: Vec<SampleRef>,
    track_info: Option<TrackInfo>,
}

impl Fmp4Demuxer {
    /// Create a demuxer for a clear stream
    pub fn new() -> Self {
        Self {
            pending: PendingBytes::new(),
            state: State::Boxes,
            descrambler: None,
            tracks: Vec::new(),
            samples: Vec::new(),
            track_info: None,
        }
    }

    /// Create a demuxer that descrambles every byte before parsing
    pub fn with_descrambler(descrambler: Box<dyn Descrambler>) -> Self {
        Self {
            descrambler: Some(descrambler),
            ..Self::new()
        }
    }

    /// Number of tracks declared by the last `moov`
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn parse(&mut self, sink: &mut dyn FrameSink) -> Result<()> {
        loop {
            if let State::Skip(remaining) = self.state {
                let n = remaining.min(self.pending.len() as u64);
                self.pending.consume(n as usize);
                if n < remaining {
                    self.state = State::Skip(remaining - n);
                    return Ok(());
                }
                self.state = State::Boxes;
            }
            let start = self.pending.offset();
            let header = match BoxHeader::parse(self.pending.as_slice()) {
                Ok(Some(header)) => header,
                Ok(None) => return Ok(()),
                Err(e) => {
                    // Box boundaries are lost; keep offsets intact for what follows
                    self.pending.consume(self.pending.len());
                    return Err(e);
                }
            };
            if header.size > MAX_PENDING_BYTES as u64 {
                warn_skip(
                    sink,
                    format!(
                        "'{}' box of {} bytes at offset {} exceeds the carry-over bound",
                        fourcc_name(&header.kind),
                        header.size,
                        start
                    ),
                );
                self.state = State::Skip(header.size);
                continue;
            }
            let size = header.size as usize;
            if self.pending.len() < size {
                return Ok(());
            }
            let unit = self.pending.take(size).freeze();
            let body = unit.slice(header.header_len..);
            self.handle_box(&header, body, start, sink);
        }
    }

    fn handle_box(&mut self, header: &BoxHeader, body: Bytes, start: u64, sink: &mut dyn FrameSink) {
        match &header.kind {
            b"moov" => self.handle_moov(&body, sink),
            b"moof" => self.handle_moof(&body, start, sink),
            b"mdat" => self.handle_mdat(&body, start + header.header_len as u64, sink),
            b"ftyp" | b"styp" | b"sidx" | b"free" | b"skip" | b"mfra" => {
                trace!("Skipping '{}' box ({} bytes)", fourcc_name(&header.kind), header.size)
            }
            other => trace!("Ignoring top-level '{}' box", fourcc_name(other)),
        }
    }

    fn handle_moov(&mut self, body: &[u8], sink: &mut dyn FrameSink) {
        let movie = match moov::parse_moov(body) {
            Ok(movie) => movie,
            Err(e) => return warn_skip(sink, format!("moov: {e}")),
        };
        for message in movie.warnings {
            warn_skip(sink, message);
        }

        let info = TrackInfo {
            has_video: movie.tracks.iter().any(|t| matches!(t.media, TrackMedia::Video { .. })),
            has_audio: movie.tracks.iter().any(|t| matches!(t.media, TrackMedia::Audio { .. })),
        };
        if self.track_info != Some(info) {
            self.track_info = Some(info);
            sink.on_event(DemuxEvent::TrackInfo(info));
        }

        for track in &movie.tracks {
            let unchanged = self
                .tracks
                .iter()
                .any(|known| known.track.id == track.id && known.track.media == track.media);
            if unchanged {
                continue;
            }
            match &track.media {
                TrackMedia::Video { config, .. } => {
                    debug!("fMP4 video configured: {}", config.describe());
                    sink.on_event(DemuxEvent::VideoConfig(config.clone()));
                }
                TrackMedia::Audio { config } => {
                    debug!(
                        "fMP4 audio configured: {} {} Hz x{}",
                        config.codec.name(),
                        config.sample_rate,
                        config.channels
                    );
                    sink.on_event(DemuxEvent::AudioConfig(config.clone()));
                }
                TrackMedia::Ignored => {}
            }
        }
        self.tracks = movie
            .tracks
            .into_iter()
            .map(|track| TrackState {
                track,
                next_decode_time: 0,
            })
            .collect();
        self.samples.clear();
    }

    fn handle_moof(&mut self, body: &[u8], moof_start: u64, sink: &mut dyn FrameSink) {
        if !self.samples.is_empty() {
            warn_skip(sink, format!("{} samples never found in an mdat", self.samples.len()));
            self.samples.clear();
        }
        let fragments = match moof::parse_moof(body) {
            Ok(fragments) => fragments,
            Err(e) => return warn_skip(sink, format!("moof at offset {moof_start}: {e}")),
        };
        for fragment in fragments {
            let Some(index) = self
                .tracks
                .iter()
                .position(|t| t.track.id == fragment.header.track_id)
            else {
                warn_skip(sink, format!("fragment for unknown track {}", fragment.header.track_id));
                continue;
            };
            self.locate_samples(index, &fragment, moof_start, sink);
        }
        self.samples.sort_by_key(|s| s.offset);
    }

    fn locate_samples(
        &mut self,
        index: usize,
        fragment: &TrackFragment,
        moof_start: u64,
        sink: &mut dyn FrameSink,
    ) {
        let state = &mut self.tracks[index];
        let header = &fragment.header;
        let defaults = state.track.defaults;
        let emit = !matches!(state.track.media, TrackMedia::Ignored);
        let is_video = matches!(state.track.media, TrackMedia::Video { .. });

        let base = header.base_data_offset.unwrap_or(moof_start);
        let mut cursor = base;
        let mut decode_time = fragment.base_decode_time.unwrap_or(state.next_decode_time);
        'runs: for run in &fragment.runs {
            if let Some(data_offset) = run.data_offset {
                match base.checked_add_signed(data_offset as i64) {
                    Some(offset) => cursor = offset,
                    None => {
                        warn!("trun data offset {} before stream start", data_offset);
                        sink.on_event(DemuxEvent::Warning(format!(
                            "track {}: negative sample offset",
                            state.track.id
                        )));
                        continue;
                    }
                }
            }
            for (i, sample) in run.samples.iter().enumerate() {
                let duration = sample
                    .duration
                    .or(header.default_sample_duration)
                    .unwrap_or(defaults.sample_duration);
                let size = sample
                    .size
                    .or(header.default_sample_size)
                    .unwrap_or(defaults.sample_size);
                let first_flags = if i == 0 { run.first_sample_flags } else { None };
                let flags = first_flags
                    .or(sample.flags)
                    .or(header.default_sample_flags)
                    .unwrap_or(defaults.sample_flags);
                let Some(end) = cursor.checked_add(size as u64) else {
                    warn_skip(sink, format!("track {}: sample offset overflows", state.track.id));
                    break 'runs;
                };
                if emit {
                    let pts_ticks = decode_time.saturating_add_signed(sample.composition_offset);
                    self.samples.push(SampleRef {
                        offset: cursor,
                        size,
                        track: index,
                        dts: state.track.ticks_to_ms(decode_time),
                        pts: state.track.ticks_to_ms(pts_ticks),
                        keyframe: !is_video || flags & SAMPLE_IS_NON_SYNC == 0,
                    });
                }
                cursor = end;
                match decode_time.checked_add(duration as u64) {
                    Some(next) => decode_time = next,
                    None => {
                        warn_skip(sink, format!("track {}: decode time overflows", state.track.id));
                        break 'runs;
                    }
                }
            }
        }
        state.next_decode_time = decode_time;
    }

    fn handle_mdat(&mut self, body: &[u8], body_start: u64, sink: &mut dyn FrameSink) {
        let body_end = body_start + body.len() as u64;
        let mut remaining = Vec::new();
        for sample in std::mem::take(&mut self.samples) {
            let end = sample.offset.saturating_add(sample.size as u64);
            if sample.offset < body_start || end > body_end {
                remaining.push(sample);
                continue;
            }
            let start = (sample.offset - body_start) as usize;
            let data = &body[start..start + sample.size as usize];
            self.emit_sample(&sample, data, sink);
        }
        if !remaining.is_empty() {
            trace!("{} samples lie outside this mdat", remaining.len());
        }
        self.samples = remaining;
    }

    fn emit_sample(&self, sample: &SampleRef, data: &[u8], sink: &mut dyn FrameSink) {
        let track = &self.tracks[sample.track].track;
        match &track.media {
            TrackMedia::Video {
                config,
                length_size,
            } => {
                let payload = match nal::normalize_length_size(data, *length_size) {
                    Ok(payload) => payload,
                    Err(e) => {
                        return warn_skip(sink, format!("track {} sample at {} ms: {}", track.id, sample.dts, e))
                    }
                };
                sink.on_frame(EncodedFrame::video(
                    config.codec,
                    payload,
                    sample.dts,
                    sample.pts,
                    sample.keyframe,
                ));
            }
            TrackMedia::Audio { config } => {
                let payload = Bytes::copy_from_slice(data);
                sink.on_frame(EncodedFrame::audio(config.codec, payload, sample.dts));
            }
            TrackMedia::Ignored => {}
        }
    }
}

fn warn_skip(sink: &mut dyn FrameSink, message: String) {
    warn!("Skipping fMP4 unit: {}", message);
    sink.on_event(DemuxEvent::Warning(message));
}

impl Default for Fmp4Demuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer for Fmp4Demuxer {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Fmp4
    }

    fn feed(&mut self, chunk: &[u8], sink: &mut dyn FrameSink) -> Result<()> {
        match self.descrambler.as_mut() {
            Some(descrambler) => {
                let mut data = chunk.to_vec();
                let offset = self.pending.offset() + self.pending.len() as u64;
                descrambler.descramble(offset, &mut data);
                self.pending.append(&data);
            }
            None => self.pending.append(chunk),
        }
        self.parse(sink)?;
        self.pending.enforce_bound("fmp4", sink);
        Ok(())
    }

    fn flush(&mut self, sink: &mut dyn FrameSink) -> Result<()> {
        if !self.samples.is_empty() {
            warn_skip(sink, format!("{} samples never found in an mdat", self.samples.len()));
            self.samples.clear();
        }
        if !self.pending.is_empty() {
            trace!("fMP4 flush leaves {} trailing bytes", self.pending.len());
        }
        Ok(())
    }

    fn reset(&mut self, full: bool) {
        self.pending.clear();
        self.state = State::Boxes;
        self.samples.clear();
        for state in &mut self.tracks {
            state.next_decode_time = 0;
        }
        if full {
            self.tracks.clear();
            self.track_info = None;
        }
    }

    fn buffered_len(&self) -> usize {
        self.pending.len()
    }
}
