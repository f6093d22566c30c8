//! MPEG transport stream demultiplexer
//!
//! Detects the packet size (188, 192 or 204 bytes), follows the PAT to the
//! first program's PMT and extracts one video and one audio elementary
//! stream from it. PSI sections are CRC checked; PES timestamps are unwrapped
//! into a monotonic timeline before conversion to milliseconds.

pub mod packet;
pub mod pes;
pub mod psi;
pub mod stream;

use rplay_codec_core::VideoCodec;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::factory::ContainerKind;
use crate::pending::PendingBytes;
use crate::traits::{DemuxEvent, Demuxer, FrameSink, TrackInfo};
use packet::{probe_packet_size, PacketHeader, SizeProbe, NULL_PID, PACKET_SIZES, PAT_PID, SYNC_BYTE, TS_PACKET_LEN};
use pes::{ticks_to_ms, PesAssembler, PesHeader, PesPacket, TimestampUnwrapper};
use psi::{stream_type, Pmt, SectionAssembler};
use stream::{AudioFraming, AudioStream, VideoStream};

#[derive(Debug)]
enum Handler {
    Video(VideoStream),
    Audio(AudioStream),
}

impl Handler {
    fn same_kind(&self, other: &Handler) -> bool {
        match (self, other) {
            (Self::Video(a), Self::Video(b)) => a.codec() == b.codec(),
            (Self::Audio(a), Self::Audio(b)) => a.framing() == b.framing(),
            _ => false,
        }
    }
}

#[derive(Debug)]
struct ElementaryPid {
    pid: u16,
    pes: PesAssembler,
    continuity: Option<u8>,
    last_ts: Option<(u64, u64)>,
    handler: Handler,
}

impl ElementaryPid {
    fn new(pid: u16, handler: Handler) -> Self {
        Self {
            pid,
            pes: PesAssembler::new(),
            continuity: None,
            last_ts: None,
            handler,
        }
    }

    fn handle_pes(&mut self, packet: PesPacket, unwrapper: &mut TimestampUnwrapper, sink: &mut dyn FrameSink) {
        let header = match PesHeader::parse(&packet.data) {
            Ok(header) => header,
            Err(e) => return warn_skip(sink, format!("pid {}: {}", self.pid, e)),
        };
        let payload = &packet.data[header.payload_offset..];
        let dts = header.dts.or(header.pts).map(|t| ticks_to_ms(unwrapper.unwrap(t)));
        let pts = header.pts.map(|t| ticks_to_ms(unwrapper.unwrap(t)));
        let ts = match (dts, pts) {
            (Some(dts), Some(pts)) => Some((dts, pts)),
            (Some(dts), None) => Some((dts, dts)),
            _ => None,
        };
        if ts.is_some() {
            self.last_ts = ts;
        }
        match &mut self.handler {
            Handler::Video(video) => {
                let Some((dts, pts)) = ts.or(self.last_ts) else {
                    return warn_skip(sink, format!("video PES on pid {} without timestamps", self.pid));
                };
                video.handle(payload, dts, pts, packet.random_access, sink);
            }
            Handler::Audio(audio) => audio.handle(payload, ts.map(|(_, pts)| pts), sink),
        }
    }

    fn finish_pes(&mut self, unwrapper: &mut TimestampUnwrapper, sink: &mut dyn FrameSink) {
        match self.pes.take_unbounded() {
            Ok(Some(packet)) => self.handle_pes(packet, unwrapper, sink),
            Ok(None) => {}
            Err(e) => warn_skip(sink, format!("pid {}: {}", self.pid, e)),
        }
    }

    fn reset(&mut self, full: bool) {
        self.pes.reset();
        self.continuity = None;
        self.last_ts = None;
        match &mut self.handler {
            Handler::Video(video) if full => video.reset(),
            Handler::Video(_) => {}
            Handler::Audio(audio) => audio.reset(full),
        }
    }
}

/// Incremental transport stream parser
#[derive(Debug)]
pub struct TsDemuxer {
    pending: PendingBytes,
    packet_size: Option<usize>,
    pat: SectionAssembler,
    pmt_pid: Option<u16>,
    pmt: SectionAssembler,
    pmt_version: Option<u8>,
    streams: Vec<ElementaryPid>,
    tracks: Option<TrackInfo>,
    unwrapper: TimestampUnwrapper,
    last_pcr: Option<u64>,
}

impl TsDemuxer {
    /// Create a demuxer that detects the packet size from the data
    pub fn new() -> Self {
        Self {
            pending: PendingBytes::new(),
            packet_size: None,
            pat: SectionAssembler::new(),
            pmt_pid: None,
            pmt: SectionAssembler::new(),
            pmt_version: None,
            streams: Vec::new(),
            tracks: None,
            unwrapper: TimestampUnwrapper::new(),
            last_pcr: None,
        }
    }

    /// Detected on-wire packet size
    pub fn packet_size(&self) -> Option<usize> {
        self.packet_size
    }

    /// Most recent program clock reference in milliseconds
    pub fn last_pcr_ms(&self) -> Option<u64> {
        self.last_pcr.map(|pcr| pcr / 27_000)
    }

    fn parse(&mut self, sink: &mut dyn FrameSink) {
        loop {
            let Some(size) = self.packet_size else {
                match probe_packet_size(self.pending.as_slice()) {
                    SizeProbe::Found { offset, size } => self.lock_packet_size(offset, size),
                    SizeProbe::NeedMoreData { discard } => {
                        self.pending.consume(discard);
                        return;
                    }
                }
                continue;
            };
            if self.pending.len() < size {
                return;
            }
            if self.pending.as_slice()[0] != SYNC_BYTE {
                warn_skip(sink, format!("sync lost at offset {}", self.pending.offset()));
                self.packet_size = None;
                self.pat.reset();
                self.pmt.reset();
                // Packets in flight end at the last aligned packet
                for stream in &mut self.streams {
                    stream.continuity = None;
                    stream.finish_pes(&mut self.unwrapper, sink);
                }
                continue;
            }
            let packet = self.pending.take(size);
            self.handle_packet(&packet[..TS_PACKET_LEN], sink);
        }
    }

    fn lock_packet_size(&mut self, offset: usize, size: usize) {
        if offset > 0 {
            debug!("Skipped {} bytes before first TS packet", offset);
        }
        debug!("TS packet size {}", size);
        self.pending.consume(offset);
        self.packet_size = Some(size);
    }

    fn handle_packet(&mut self, packet: &[u8], sink: &mut dyn FrameSink) {
        let header = match PacketHeader::parse(packet) {
            Ok(header) => header,
            Err(e) => return warn_skip(sink, e.to_string()),
        };
        if header.transport_error {
            return warn_skip(sink, format!("transport error on pid {}", header.pid));
        }
        if let Some(pcr) = header.adaptation.and_then(|a| a.pcr) {
            trace!("PCR {} on pid {}", pcr, header.pid);
            self.last_pcr = Some(pcr);
        }
        if header.pid == NULL_PID || !header.has_payload {
            return;
        }
        if header.scrambling != 0 {
            trace!("Skipping scrambled packet on pid {}", header.pid);
            return;
        }
        let payload = &packet[header.payload_offset..];
        if header.pid == PAT_PID {
            for section in self.pat.push(header.payload_unit_start, payload) {
                self.handle_pat(&section, sink);
            }
        } else if Some(header.pid) == self.pmt_pid {
            for section in self.pmt.push(header.payload_unit_start, payload) {
                self.handle_pmt(&section, sink);
            }
        } else if let Some(stream) = self.streams.iter_mut().find(|s| s.pid == header.pid) {
            Self::handle_es_packet(stream, &header, payload, &mut self.unwrapper, sink);
        }
    }

    fn handle_pat(&mut self, section: &[u8], sink: &mut dyn FrameSink) {
        match psi::parse_pat(section) {
            Ok(Some(pid)) if self.pmt_pid != Some(pid) => {
                debug!("PAT: PMT on pid {}", pid);
                self.pmt_pid = Some(pid);
                self.pmt.reset();
                self.pmt_version = None;
            }
            Ok(Some(_)) => {}
            Ok(None) => trace!("PAT without programs"),
            Err(e) => warn_skip(sink, e.to_string()),
        }
    }

    fn handle_pmt(&mut self, section: &[u8], sink: &mut dyn FrameSink) {
        let pmt = match psi::parse_pmt(section) {
            Ok(pmt) => pmt,
            Err(e) => return warn_skip(sink, e.to_string()),
        };
        if self.pmt_version == Some(pmt.version) {
            return;
        }
        self.pmt_version = Some(pmt.version);
        let selected = select_streams(&pmt);

        let mut previous = std::mem::take(&mut self.streams);
        for (pid, handler) in selected {
            let kept = previous
                .iter()
                .position(|s| s.pid == pid && s.handler.same_kind(&handler));
            let stream = match kept {
                Some(i) => previous.swap_remove(i),
                None => ElementaryPid::new(pid, handler),
            };
            self.streams.push(stream);
        }
        for stream in &self.streams {
            debug!("PMT v{}: pid {} -> {:?}", pmt.version, stream.pid, stream.handler);
        }

        let tracks = TrackInfo {
            has_video: self.streams.iter().any(|s| matches!(s.handler, Handler::Video(_))),
            has_audio: self
                .streams
                .iter()
                .any(|s| matches!(&s.handler, Handler::Audio(a) if a.is_emitting())),
        };
        if self.tracks != Some(tracks) {
            self.tracks = Some(tracks);
            sink.on_event(DemuxEvent::TrackInfo(tracks));
        }
    }

    fn handle_es_packet(
        stream: &mut ElementaryPid,
        header: &PacketHeader,
        payload: &[u8],
        unwrapper: &mut TimestampUnwrapper,
        sink: &mut dyn FrameSink,
    ) {
        let cc = header.continuity_counter;
        if let Some(last) = stream.continuity {
            if !header.discontinuity() {
                if cc == last {
                    trace!("Duplicate packet on pid {}", stream.pid);
                    return;
                }
                if cc != (last + 1) & 0x0F {
                    warn_skip(
                        sink,
                        format!("continuity gap on pid {} ({} -> {})", stream.pid, last, cc),
                    );
                    stream.pes.reset();
                }
            }
        }
        stream.continuity = Some(cc);

        let mut completed = Vec::new();
        if header.payload_unit_start {
            match stream.pes.start(payload, header.random_access()) {
                Ok(Some(packet)) => completed.push(packet),
                Ok(None) => {}
                Err(e) => warn_skip(sink, format!("pid {}: {}", stream.pid, e)),
            }
        } else {
            stream.pes.push(payload);
        }
        completed.extend(stream.pes.take_complete());
        for packet in completed {
            stream.handle_pes(packet, unwrapper, sink);
        }
    }

    /// Packet size for a stream too short to probe: every packet in it must sync
    fn probe_short(data: &[u8]) -> Option<(usize, usize)> {
        let offset = data.iter().position(|&b| b == SYNC_BYTE)?;
        PACKET_SIZES
            .into_iter()
            .find(|&size| {
                offset + TS_PACKET_LEN <= data.len()
                    && (offset..data.len())
                        .step_by(size)
                        .all(|pos| data[pos] == SYNC_BYTE)
            })
            .map(|size| (offset, size))
    }
}

fn select_streams(pmt: &Pmt) -> Vec<(u16, Handler)> {
    let mut video = None;
    let mut audio = None;
    for entry in &pmt.streams {
        let codec = match entry.stream_type {
            stream_type::H264 => Some(VideoCodec::H264),
            stream_type::H265 => Some(VideoCodec::H265),
            _ => None,
        };
        if let Some(codec) = codec {
            if video.is_none() {
                video = Some((entry.pid, Handler::Video(VideoStream::new(codec))));
            }
            continue;
        }
        let framing = match entry.stream_type {
            stream_type::AAC_ADTS => AudioFraming::Adts,
            stream_type::AAC_LATM => AudioFraming::Latm,
            stream_type::MPEG1_AUDIO | stream_type::MPEG2_AUDIO => AudioFraming::Mpeg,
            stream_type::AC3 => AudioFraming::Ac3,
            stream_type::PRIVATE_PES if entry.ac3_descriptor => AudioFraming::Ac3,
            stream_type::ALAW => AudioFraming::Alaw,
            other => {
                trace!("Ignoring stream type 0x{:02x} on pid {}", other, entry.pid);
                continue;
            }
        };
        if audio.is_none() {
            audio = Some((entry.pid, Handler::Audio(AudioStream::new(framing))));
        }
    }
    video.into_iter().chain(audio).collect()
}

fn warn_skip(sink: &mut dyn FrameSink, message: String) {
    warn!("Skipping TS unit: {}", message);
    sink.on_event(DemuxEvent::Warning(message));
}

impl Default for TsDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer for TsDemuxer {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Ts
    }

    fn feed(&mut self, chunk: &[u8], sink: &mut dyn FrameSink) -> Result<()> {
        self.pending.append(chunk);
        self.parse(sink);
        self.pending.enforce_bound("ts", sink);
        Ok(())
    }

    fn flush(&mut self, sink: &mut dyn FrameSink) -> Result<()> {
        if self.packet_size.is_none() {
            if let Some((offset, size)) = Self::probe_short(self.pending.as_slice()) {
                self.lock_packet_size(offset, size);
                self.parse(sink);
            }
        }
        // A final packet may lack the trailing bytes of a 192/204-byte unit
        if self.pending.len() >= TS_PACKET_LEN && self.pending.as_slice()[0] == SYNC_BYTE {
            let packet = self.pending.take(TS_PACKET_LEN);
            self.handle_packet(&packet, sink);
        }
        self.pending.clear();
        for stream in &mut self.streams {
            stream.finish_pes(&mut self.unwrapper, sink);
        }
        Ok(())
    }

    fn reset(&mut self, full: bool) {
        self.pending.clear();
        self.packet_size = None;
        self.pat.reset();
        self.pmt.reset();
        self.pmt_pid = None;
        self.pmt_version = None;
        self.unwrapper.reset();
        self.last_pcr = None;
        if full {
            self.streams.clear();
            self.tracks = None;
        } else {
            for stream in &mut self.streams {
                stream.reset(false);
            }
        }
    }

    fn buffered_len(&self) -> usize {
        self.pending.len() + self.streams.iter().map(|s| s.pes.buffered()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, ts::TsWriter};
    use crate::traits::CollectingSink;
    use rplay_codec_core::AudioCodec;

    fn demux(stream: &[u8]) -> (TsDemuxer, CollectingSink) {
        let mut sink = CollectingSink::new();
        let mut demuxer = TsDemuxer::new();
        demuxer.feed(stream, &mut sink).unwrap();
        demuxer.flush(&mut sink).unwrap();
        (demuxer, sink)
    }

    fn avc_access_unit(keyframe: bool) -> Vec<u8> {
        if keyframe {
            testing::annex_b(&[
                &[0x09, 0xF0],
                &testing::AVC_SPS,
                &testing::AVC_PPS,
                testing::AVC_IDR_SLICE,
            ])
        } else {
            testing::annex_b(&[&[0x09, 0xF0], testing::AVC_P_SLICE])
        }
    }

    #[test]
    fn test_video_and_adts_audio() {
        let mut w = TsWriter::new(188);
        w.program(Some(stream_type::H264), Some(stream_type::AAC_ADTS));
        w.video_pes(90_000, Some(86_400), &avc_access_unit(true), true);
        w.video_pes(93_600, Some(90_000), &avc_access_unit(false), false);
        let mut adts = testing::adts_frame(4, 2, &[0x21; 50]);
        adts.extend(testing::adts_frame(4, 2, &[0x22; 60]));
        w.audio_pes(90_000, &adts);
        let (demuxer, sink) = demux(&w.finish());

        assert_eq!(demuxer.packet_size(), Some(188));
        assert!(sink.events.contains(&DemuxEvent::TrackInfo(TrackInfo {
            has_audio: true,
            has_video: true
        })));
        let config = sink.video_config().unwrap();
        assert_eq!((config.width, config.height), (640, 480));

        let video: Vec<_> = sink.video_frames().collect();
        assert_eq!(video.len(), 2);
        assert_eq!((video[0].dts, video[0].pts), (960, 1000));
        assert!(video[0].is_keyframe);
        assert!(!video[1].is_keyframe);
        // AUD stripped, SPS/PPS/IDR kept as length-prefixed units
        let nals: Vec<_> = rplay_codec_core::h26x::nal::iter_length_prefixed(&video[0].payload, 4)
            .unwrap()
            .map(|n| n.unwrap()[0])
            .collect();
        assert_eq!(nals, vec![0x67, 0x68, 0x65]);

        let audio: Vec<_> = sink.audio_frames().collect();
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[0].dts, 1000);
        assert_eq!(audio[1].dts, 1023);
        assert_eq!(audio[1].payload.len(), 60);
        assert_eq!(sink.audio_config().unwrap().codec, AudioCodec::Aac);
    }

    #[test]
    fn test_timestamped_and_fec_packet_sizes() {
        for size in [192, 204] {
            let mut w = TsWriter::new(size);
            w.program(Some(stream_type::H264), None);
            w.video_pes(9000, None, &avc_access_unit(true), true);
            w.video_pes(12_600, None, &avc_access_unit(false), false);
            let (demuxer, sink) = demux(&w.finish());
            assert_eq!(demuxer.packet_size(), Some(size));
            assert_eq!(sink.video_frames().count(), 2);
        }
    }

    #[test]
    fn test_frames_before_parameter_sets_are_dropped() {
        let mut w = TsWriter::new(188);
        w.program(Some(stream_type::H264), None);
        w.video_pes(0, None, &avc_access_unit(false), false);
        w.video_pes(3600, None, &avc_access_unit(true), true);
        let (_, sink) = demux(&w.finish());
        let video: Vec<_> = sink.video_frames().collect();
        assert_eq!(video.len(), 1);
        assert_eq!(video[0].dts, 40);
    }

    #[test]
    fn test_timestamps_unwrap_across_33_bits() {
        let wrap = pes::TIMESTAMP_WRAP;
        let mut w = TsWriter::new(188);
        w.program(Some(stream_type::H264), None);
        w.video_pes(wrap - 3600, None, &avc_access_unit(true), true);
        w.video_pes(0, None, &avc_access_unit(false), false);
        let (_, sink) = demux(&w.finish());
        let video: Vec<_> = sink.video_frames().collect();
        assert_eq!(video[1].dts - video[0].dts, 40);
    }

    #[test]
    fn test_alaw_and_ac3_streams() {
        let mut w = TsWriter::new(188);
        w.program(None, Some(stream_type::ALAW));
        w.audio_pes(0, &[0xD5; 320]);
        w.audio_pes(3600, &[0xD5; 320]);
        let (_, sink) = demux(&w.finish());
        let audio: Vec<_> = sink.audio_frames().collect();
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[1].dts, 40);
        assert_eq!(sink.audio_config().unwrap().codec, AudioCodec::Alaw);

        let mut w = TsWriter::new(188);
        w.program(None, Some(stream_type::AC3));
        w.audio_pes(0, &[0x0B, 0x77, 0x00, 0x00]);
        w.audio_pes(2880, &[0x0B, 0x77, 0x00, 0x00]);
        let (_, sink) = demux(&w.finish());
        assert_eq!(sink.frames.len(), 0);
        assert_eq!(sink.warnings().len(), 1);
        assert!(sink.events.contains(&DemuxEvent::TrackInfo(TrackInfo {
            has_audio: false,
            has_video: false
        })));
    }

    #[test]
    fn test_sync_loss_triggers_redetection() {
        let mut w = TsWriter::new(188);
        w.program(Some(stream_type::H264), None);
        w.video_pes(0, None, &avc_access_unit(true), true);
        let mut stream = w.finish();
        stream.extend_from_slice(&[0x00; 50]);
        let mut w2 = TsWriter::new(188);
        w2.program(Some(stream_type::H264), None);
        w2.video_pes(3600, None, &avc_access_unit(false), false);
        w2.video_pes(7200, None, &avc_access_unit(false), false);
        stream.extend(w2.finish());

        let (_, sink) = demux(&stream);
        assert!(sink.warnings().iter().any(|w| w.contains("sync lost")));
        assert_eq!(sink.video_frames().count(), 3);
    }

    #[test]
    fn test_continuity_gap_drops_partial_pes() {
        let mut w = TsWriter::new(188);
        w.program(Some(stream_type::H264), None);
        w.video_pes(0, None, &avc_access_unit(true), true);
        let big = testing::annex_b(&[&[0x41, 0x9A, 0x02], &[0x11; 600]]);
        w.video_pes(3600, None, &big, false);
        w.video_pes(7200, None, &avc_access_unit(false), false);
        let mut stream = w.finish();
        // Remove the second packet of the 3600 PES
        let packets: Vec<Vec<u8>> = stream.chunks(188).map(<[u8]>::to_vec).collect();
        let pes_start = packets
            .iter()
            .position(|p| p[1] & 0x40 != 0 && p[1] & 0x1F == 0x01 && p.windows(3).any(|w| w == [0x41, 0x9A, 0x02]))
            .unwrap();
        stream = packets
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != pes_start + 1)
            .flat_map(|(_, p)| p.clone())
            .collect();

        let (_, sink) = demux(&stream);
        assert!(sink.warnings().iter().any(|w| w.contains("continuity gap")));
        let dts: Vec<_> = sink.video_frames().map(|f| f.dts).collect();
        assert_eq!(dts, vec![0, 80]);
    }

    #[test]
    fn test_short_stream_is_detected_on_flush() {
        let mut w = TsWriter::new(188);
        w.program(Some(stream_type::H264), None);
        let stream = w.finish();
        assert_eq!(stream.len(), 2 * 188);
        let (demuxer, sink) = demux(&stream);
        assert_eq!(demuxer.packet_size(), Some(188));
        assert_eq!(sink.events.len(), 1);
    }
}
